//! Retry budgets and backoff schedule

use std::time::Duration;

use crate::error::{ApiError, ErrorKind};

/// How the dispatcher retries transient failures within one send.
///
/// Budgets count retries after the first attempt and are tracked per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries allowed for `RateLimited`
    pub rate_limit_retries: u32,
    /// Retries allowed for each of `ServerError` (5xx) and `Network`
    pub transient_retries: u32,
    /// Forced rule refreshes (each followed by one re-signed retry) allowed
    /// for `SignatureRejected`
    pub signature_refresh_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            rate_limit_retries: 5,
            transient_retries: 3,
            signature_refresh_retries: 1,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base doubled per retry,
    /// capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before retrying `error`. A server-supplied `Retry-After` wins over
    /// the schedule for rate limits, still bounded by `max_delay`.
    pub fn delay_for(&self, error: &ApiError, retry: u32) -> Duration {
        match (error.kind, error.retry_after) {
            (ErrorKind::RateLimited, Some(hint)) => hint.min(self.max_delay),
            _ => self.backoff(retry),
        }
    }

    /// Retry budget for a transient kind.
    pub fn budget(&self, kind: ErrorKind) -> u32 {
        match kind {
            ErrorKind::RateLimited => self.rate_limit_retries,
            ErrorKind::ServerError | ErrorKind::Network => self.transient_retries,
            ErrorKind::SignatureRejected => self.signature_refresh_retries,
            _ => 0,
        }
    }
}

/// Retries spent so far in one send, per kind.
#[derive(Debug, Default)]
pub(crate) struct RetryLedger {
    rate_limited: u32,
    server: u32,
    network: u32,
    signature: u32,
}

impl RetryLedger {
    /// Record one more retry of `kind` and return its 1-based number, or
    /// `None` when the budget is exhausted.
    pub(crate) fn spend(&mut self, policy: &RetryPolicy, kind: ErrorKind) -> Option<u32> {
        let used = match kind {
            ErrorKind::RateLimited => &mut self.rate_limited,
            ErrorKind::ServerError => &mut self.server,
            ErrorKind::Network => &mut self.network,
            ErrorKind::SignatureRejected => &mut self.signature,
            _ => return None,
        };
        if *used >= policy.budget(kind) {
            return None;
        }
        *used += 1;
        Some(*used)
    }
}
