//! Authenticated session
//!
//! One `Session` per platform account: it owns the credentials and the rate
//! limiter and shares the rule store. Every call the account makes goes
//! through the session so the limiter sees all of them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use onlyfans_auth::{BASE_URL, Credentials, RuleStore};
use serde_json::Value;
use tracing::info;
use transport::Transport;

use crate::dispatch::Dispatcher;
use crate::error::{ApiError, Result, SessionError};
use crate::paginate::{Paginator, ResourceTemplate};
use crate::ratelimit::{MIN_REFILL_PER_SEC, RateLimitConfig, RateLimiter};
use crate::request::RequestSpec;
use crate::resources;
use crate::retry::RetryPolicy;

/// Engine settings for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub base_url: String,
    /// Wall-clock bound for each attempt
    pub request_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    /// Page ceiling for one pagination run
    pub max_pages: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            request_timeout: Duration::from_secs(20),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            max_pages: 500,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> std::result::Result<(), SessionError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SessionError::Config(format!(
                "base_url must be http(s), got {:?}",
                self.base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(SessionError::Config("request_timeout must be non-zero".into()));
        }
        if self.rate_limit.capacity == 0 {
            return Err(SessionError::Config("rate limit capacity must be non-zero".into()));
        }
        let refill = self.rate_limit.refill_per_sec;
        if !(refill.is_finite() && refill >= MIN_REFILL_PER_SEC) {
            return Err(SessionError::Config(format!(
                "rate limit refill_per_sec must be at least {MIN_REFILL_PER_SEC}, got {refill}"
            )));
        }
        if self.max_pages == 0 {
            return Err(SessionError::Config("max_pages must be non-zero".into()));
        }
        Ok(())
    }
}

pub struct Session {
    dispatcher: Dispatcher,
    max_pages: u32,
}

impl Session {
    /// Build a session. The rule store already holds a validated rule set,
    /// so a session can sign from its first call.
    pub fn new(
        credentials: Credentials,
        rules: Arc<RuleStore>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> std::result::Result<Self, SessionError> {
        config.validate()?;
        info!(
            account_id = credentials.account_id(),
            transport = transport.id(),
            rules_version = %rules.current().version,
            capacity = config.rate_limit.capacity,
            refill_per_sec = config.rate_limit.refill_per_sec,
            "session ready"
        );
        let limiter = RateLimiter::new(&config.rate_limit);
        let dispatcher = Dispatcher::new(
            transport,
            rules,
            credentials,
            limiter,
            config.retry,
            &config.base_url,
            config.request_timeout,
        );
        Ok(Self {
            dispatcher,
            max_pages: config.max_pages,
        })
    }

    pub fn account_id(&self) -> u64 {
        self.dispatcher.credentials().account_id()
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        self.dispatcher.rules()
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.dispatcher.limiter()
    }

    /// Send one request through the limiter, signer and retry policy.
    pub async fn dispatch(&self, spec: &RequestSpec) -> Result<Value> {
        self.dispatcher.send(spec).await
    }

    /// Like `dispatch`, abandoned as soon as `cancel` completes. Cancelling
    /// drops any in-flight call or backoff and returns a Network-kind error
    /// with `is_cancelled()` set.
    pub async fn dispatch_until<F>(&self, spec: &RequestSpec, cancel: F) -> Result<Value>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => Err(ApiError::cancelled()),
            result = self.dispatcher.send(spec) => result,
        }
    }

    /// Numeric id of the account behind `username`, read from its profile.
    pub async fn resolve_user_id(&self, username: &str) -> Result<u64> {
        let reply = self.dispatcher.send_reply(&resources::user(username)).await?;
        let id = match reply.value.get("id") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        id.ok_or_else(|| reply.malformed(format!("profile of `{username}` has no numeric id")))
    }

    /// Start a pagination run over `template`.
    pub fn paginate(&self, template: ResourceTemplate) -> Paginator<'_> {
        Paginator::new(&self.dispatcher, template, self.max_pages)
    }
}
