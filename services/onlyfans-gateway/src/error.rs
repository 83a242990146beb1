//! HTTP error responses
//!
//! Platform failures reach the client as
//! `{"error":{"type":...,"message":...,"upstream_status":...,"attempts":...,"request_id":...}}`.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use onlyfans_session::{ApiError, ErrorKind};

/// Status the gateway answers with for each failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Malformed => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::ServerError | ErrorKind::SignatureRejected | ErrorKind::Network => {
            StatusCode::BAD_GATEWAY
        }
    }
}

/// JSON error body shared by every failing route.
pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// A platform call that failed after the dispatcher gave up.
#[derive(Debug)]
pub struct ApiFailure {
    pub error: ApiError,
    pub request_id: String,
}

impl ApiFailure {
    pub fn new(error: ApiError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.error.kind)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "type": self.error.kind.label(),
                "message": self.error.message,
                "upstream_status": self.error.http_status,
                "attempts": self.error.attempts,
                "request_id": self.request_id,
            }
        });
        let mut response = (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response();

        if self.error.kind == ErrorKind::RateLimited {
            if let Some(retry_after) = self.error.retry_after {
                let secs = retry_after.as_secs_f64().ceil() as u64;
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
        }
        response
    }
}
