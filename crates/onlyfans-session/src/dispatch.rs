//! Signed, rate-limited, retrying dispatch
//!
//! Each attempt takes a limiter token, captures the current rule snapshot,
//! signs with a fresh timestamp and sends with a bounded timeout. The
//! response is classified and the retry decision is made here and nowhere
//! else:
//!
//! - `RateLimited`: wait `Retry-After` (or backoff), up to 5 retries
//! - `ServerError` (5xx) and `Network`: backoff, up to 3 retries each
//! - `SignatureRejected`: force one rule refresh, re-sign and retry once; if
//!   the refresh fails the retry is signed with the last good rules
//! - everything else: returned to the caller immediately

use std::sync::Arc;
use std::time::Duration;

use onlyfans_auth::{Credentials, RuleStore, signed_headers};
use serde_json::Value;
use tracing::{debug, info, warn};
use transport::{OutboundRequest, RawResponse, Transport};

use crate::classify::classify_response;
use crate::error::{ApiError, ErrorKind, Result};
use crate::ratelimit::RateLimiter;
use crate::request::RequestSpec;
use crate::retry::{RetryLedger, RetryPolicy};

/// A successful exchange: the decoded body and the response it came from.
#[derive(Debug, Clone)]
pub struct Reply {
    pub value: Value,
    pub response: RawResponse,
    /// Sends it took, including retries
    pub attempts: u32,
}

impl Reply {
    /// A `Malformed` error carrying this reply's status, body and attempts.
    pub fn malformed(&self, message: impl Into<String>) -> ApiError {
        ApiError::from_response(ErrorKind::Malformed, &self.response, message)
            .with_attempts(self.attempts)
    }
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    rules: Arc<RuleStore>,
    credentials: Credentials,
    limiter: RateLimiter,
    policy: RetryPolicy,
    base_url: String,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        rules: Arc<RuleStore>,
        credentials: Credentials,
        limiter: RateLimiter,
        policy: RetryPolicy,
        base_url: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            rules,
            credentials,
            limiter,
            policy,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Send `spec` until it succeeds or a final error is reached.
    pub async fn send(&self, spec: &RequestSpec) -> Result<Value> {
        self.send_reply(spec).await.map(|reply| reply.value)
    }

    /// Like `send`, keeping the response the body was decoded from.
    pub async fn send_reply(&self, spec: &RequestSpec) -> Result<Reply> {
        let mut ledger = RetryLedger::default();
        let mut attempts = 0u32;
        let mut refresh_failure: Option<String> = None;

        loop {
            attempts += 1;
            let error = match self.attempt(spec).await {
                Ok((value, response)) => {
                    metrics::counter!("onlyfans_requests_total", "outcome" => "success")
                        .increment(1);
                    debug!(path = spec.path(), attempts, "request succeeded");
                    return Ok(Reply {
                        value,
                        response,
                        attempts,
                    });
                }
                Err(e) => e.with_attempts(attempts),
            };

            let retryable = error.kind == ErrorKind::SignatureRejected || error.is_transient();
            let Some(retry) = retryable
                .then(|| ledger.spend(&self.policy, error.kind))
                .flatten()
            else {
                let mut error = error;
                if error.kind == ErrorKind::SignatureRejected {
                    if let Some(refresh_error) = &refresh_failure {
                        error.message =
                            format!("{}; rule refresh failed: {refresh_error}", error.message);
                    }
                }
                return Err(self.give_up(spec, error));
            };
            metrics::counter!("onlyfans_retries_total", "kind" => error.kind.label()).increment(1);

            if error.kind == ErrorKind::SignatureRejected {
                let rejected_version = self.rules.current().version.clone();
                warn!(
                    path = spec.path(),
                    attempt = attempts,
                    version = %rejected_version,
                    stale = self.rules.is_stale(),
                    "signature rejected, forcing rule refresh"
                );
                match self.rules.refresh().await {
                    Ok(rules) => {
                        metrics::counter!("onlyfans_rule_refresh_total", "result" => "ok")
                            .increment(1);
                        info!(from = %rejected_version, to = %rules.version, "re-signing with refreshed rules");
                    }
                    Err(refresh_error) => {
                        metrics::counter!("onlyfans_rule_refresh_total", "result" => "error")
                            .increment(1);
                        warn!(
                            error = %refresh_error,
                            stale = self.rules.is_stale(),
                            version = %rejected_version,
                            "forced rule refresh failed, re-signing with last good rules"
                        );
                        refresh_failure = Some(refresh_error.to_string());
                    }
                }
                continue;
            }

            let delay = self.policy.delay_for(&error, retry);
            warn!(
                path = spec.path(),
                attempt = attempts,
                kind = %error.kind,
                status = ?error.http_status,
                delay_ms = delay.as_millis() as u64,
                "transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One signed exchange.
    async fn attempt(&self, spec: &RequestSpec) -> Result<(Value, RawResponse)> {
        self.limiter.acquire().await;

        let rules = self.rules.current();
        let headers = signed_headers(
            &rules,
            &self.credentials,
            spec.method(),
            spec.path(),
            unix_seconds(),
        )
        .map_err(|e| {
            ApiError::new(
                ErrorKind::Unauthorized,
                format!("credentials cannot be sent: {e}"),
            )
        })?;

        let request = OutboundRequest {
            method: spec.method().clone(),
            url: format!("{}{}", self.base_url, spec.path()),
            query: spec.query().to_vec(),
            headers,
            body: spec.body().cloned(),
            timeout: self.timeout,
        };

        let response = match tokio::time::timeout(self.timeout, self.transport.execute(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ApiError::network(&e)),
            Err(_) => {
                return Err(ApiError::new(
                    ErrorKind::Network,
                    format!("no response within {:?}", self.timeout),
                ));
            }
        };
        classify_response(&response).map(|value| (value, response))
    }

    fn give_up(&self, spec: &RequestSpec, error: ApiError) -> ApiError {
        metrics::counter!("onlyfans_requests_total", "outcome" => error.kind.label()).increment(1);
        warn!(
            path = spec.path(),
            kind = %error.kind,
            status = ?error.http_status,
            attempts = error.attempts,
            error = %error.message,
            "request failed"
        );
        error
    }
}

fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
