//! Error types for dispatch and session operations

use std::fmt;
use std::time::Duration;

use transport::{RawResponse, TransportError};

/// Failure categories reported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    RateLimited,
    ServerError,
    SignatureRejected,
    Network,
    Malformed,
}

impl ErrorKind {
    /// Label for logs, metrics and façade bodies.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::SignatureRejected => "signature_rejected",
            ErrorKind::Network => "network",
            ErrorKind::Malformed => "malformed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A failed platform call, surfaced with enough of the exchange to diagnose it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    pub retry_after: Option<Duration>,
    pub raw_body: String,
    pub message: String,
    /// Sends made before giving up (0 when the call never reached the wire)
    pub attempts: u32,
    cancelled: bool,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            retry_after: None,
            raw_body: String::new(),
            message: message.into(),
            attempts: 0,
            cancelled: false,
        }
    }

    /// Error carrying the status, body and `Retry-After` of a response.
    pub fn from_response(
        kind: ErrorKind,
        response: &RawResponse,
        message: impl Into<String>,
    ) -> Self {
        Self {
            http_status: Some(response.status),
            retry_after: response.retry_after,
            raw_body: response.body.clone(),
            ..Self::new(kind, message)
        }
    }

    pub fn network(error: &TransportError) -> Self {
        Self::new(ErrorKind::Network, error.to_string())
    }

    /// The caller abandoned the call before it completed.
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::new(ErrorKind::Network, "request cancelled by caller")
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether the dispatcher may retry this failure after a backoff.
    ///
    /// `ServerError` is transient only for 5xx; other 4xx responses share the
    /// kind but are final.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ErrorKind::RateLimited => true,
            ErrorKind::Network => !self.cancelled,
            ErrorKind::ServerError => self.http_status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }
}

/// Errors constructing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] onlyfans_auth::Error),
}

/// Result alias for dispatcher calls.
pub type Result<T> = std::result::Result<T, ApiError>;
