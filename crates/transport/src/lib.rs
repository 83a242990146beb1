//! HTTP transport seam for the platform engine
//!
//! The dispatcher never talks to `reqwest` directly: it hands a fully signed
//! `OutboundRequest` to a `Transport` and gets back the raw status, the
//! `Retry-After` hint and the undecoded body. Classification and retry policy
//! live above this crate; the transport only reports what happened on the wire.
//!
//! `ReqwestTransport` is the production implementation (TLS, connection reuse,
//! per-request timeout). Tests substitute scripted implementations.

pub mod reqwest_transport;

pub use reqwest::Method;
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest_transport::ReqwestTransport;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A signed request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Absolute URL without the query string
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    /// Upper bound for the whole exchange, including reading the body
    pub timeout: Duration,
}

/// What came back, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network-level failures. No HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Abstraction over the HTTP client.
///
/// Uses `Pin<Box<dyn Future>>` return types so the dispatcher can hold an
/// `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "reqwest", "scripted")
    fn id(&self) -> &str;

    /// Send one request and return the raw response.
    ///
    /// Implementations must honor `request.timeout` and report an expired
    /// deadline as `TransportError::Timeout`.
    fn execute<'a>(
        &'a self,
        request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>>;
}

/// Parse a `Retry-After` header value given in (possibly fractional) seconds.
///
/// HTTP-date values are not used by the platform and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
