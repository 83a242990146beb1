//! Token-bucket rate limiter shared by every call of one session
//!
//! Refill is computed lazily from elapsed monotonic time whenever the bucket
//! is touched; no background timer runs. All state lives behind one mutex so
//! concurrent callers can never spend the same token twice.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Slowest refill a session accepts; anything lower is a misconfiguration.
pub const MIN_REFILL_PER_SEC: f64 = 1e-6;

/// Longest single sleep before the bucket is checked again.
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// Bucket parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum burst (C)
    pub capacity: u32,
    /// Tokens added per second (R)
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    /// 30-token burst at 3 tokens/s stays under 1000 requests per 300 s.
    fn default() -> Self {
        Self {
            capacity: 30,
            refill_per_sec: 3.0,
        }
    }
}

struct RateLimitState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimitState {
    fn refill(&mut self, now: Instant, capacity: f64, rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    /// Create a full bucket. `config` must have non-zero capacity and a
    /// positive refill rate (checked by `Session::new`).
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = f64::from(config.capacity);
        Self {
            capacity,
            refill_rate: config.refill_per_sec,
            state: Mutex::new(RateLimitState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available and take it.
    ///
    /// Only the calling task is suspended. The lock is released while waiting
    /// so other callers can check the bucket in the meantime.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.refill(Instant::now(), self.capacity, self.refill_rate);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::try_from_secs_f64((1.0 - state.tokens) / self.refill_rate)
                    .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT))
            };
            trace!(wait_ms = wait.as_millis() as u64, "rate limiter waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token if one is available right now.
    ///
    /// Never waits, not even for the lock: while another caller holds the
    /// bucket this returns `false` even if tokens remain.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut state) = self.state.try_lock() else {
            return false;
        };
        state.refill(Instant::now(), self.capacity, self.refill_rate);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently in the bucket.
    pub async fn available(&self) -> u32 {
        let mut state = self.state.lock().await;
        state.refill(Instant::now(), self.capacity, self.refill_rate);
        state.tokens.floor() as u32
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}
