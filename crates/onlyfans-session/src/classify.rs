//! Response classification
//!
//! Maps one raw response to either a decoded JSON body or a typed `ApiError`.
//! The platform answers a stale or wrong signature with a 400 or 403 whose
//! body asks the client to reload; any other 400/403 is an ordinary rejection.

use serde_json::Value;
use transport::RawResponse;

use crate::error::{ApiError, ErrorKind, Result};

/// Body fragments the platform uses when it rejects a request signature.
const SIGNATURE_REJECTION_PATTERNS: &[&str] = &[
    "please refresh the page",
    "wrong signature",
    "invalid signature",
    "signature is invalid",
    "sign is invalid",
];

/// Whether a 400/403 body is the platform's signature-rejection shape.
pub fn is_signature_rejection(body: &str) -> bool {
    let lower = body.to_lowercase();
    SIGNATURE_REJECTION_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Error kind for a non-2xx status.
pub fn classify_status(status: u16, body: &str) -> ErrorKind {
    match status {
        401 => ErrorKind::Unauthorized,
        400 | 403 if is_signature_rejection(body) => ErrorKind::SignatureRejected,
        404 => ErrorKind::NotFound,
        429 => ErrorKind::RateLimited,
        _ => ErrorKind::ServerError,
    }
}

/// Decode a successful body or classify the failure.
pub fn classify_response(response: &RawResponse) -> Result<Value> {
    if response.is_success() {
        if response.status == 204 {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&response.body).map_err(|e| {
            ApiError::from_response(
                ErrorKind::Malformed,
                response,
                format!("undecodable {} body: {e}", response.status),
            )
        });
    }

    let kind = classify_status(response.status, &response.body);
    let message = platform_message(&response.body)
        .unwrap_or_else(|| format!("platform returned {}", response.status));
    Err(ApiError::from_response(kind, response, message))
}

/// The platform wraps failures as `{"error": {"code": .., "message": ".."}}`.
fn platform_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REJECTED: &str = r#"{"error":{"code":0,"message":"Please refresh the page"}}"#;

    #[test]
    fn success_decodes_json() {
        let value = classify_response(&RawResponse::new(200, r#"{"id": 5}"#)).unwrap();
        assert_eq!(value["id"], 5);
    }

    #[test]
    fn no_content_is_null() {
        assert_eq!(
            classify_response(&RawResponse::new(204, "")).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn undecodable_success_is_malformed() {
        let err = classify_response(&RawResponse::new(200, "<html>")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Malformed);
        assert_eq!(err.http_status, Some(200));
        assert_eq!(err.raw_body, "<html>");
    }

    #[test]
    fn status_table() {
        assert_eq!(classify_status(401, ""), ErrorKind::Unauthorized);
        assert_eq!(classify_status(404, ""), ErrorKind::NotFound);
        assert_eq!(classify_status(429, ""), ErrorKind::RateLimited);
        assert_eq!(classify_status(500, ""), ErrorKind::ServerError);
        assert_eq!(classify_status(503, ""), ErrorKind::ServerError);
        assert_eq!(classify_status(418, ""), ErrorKind::ServerError);
    }

    #[test]
    fn signature_rejection_needs_matching_body() {
        assert_eq!(classify_status(400, REJECTED), ErrorKind::SignatureRejected);
        assert_eq!(classify_status(403, REJECTED), ErrorKind::SignatureRejected);
        assert_eq!(
            classify_status(403, r#"{"error":{"message":"Access denied"}}"#),
            ErrorKind::ServerError
        );
        // Only 400/403 carry the rejection
        assert_eq!(classify_status(500, REJECTED), ErrorKind::ServerError);
    }

    #[test]
    fn rejection_match_is_case_insensitive() {
        assert!(is_signature_rejection("WRONG SIGNATURE"));
        assert!(!is_signature_rejection(""));
    }

    #[test]
    fn failure_message_comes_from_platform_body() {
        let err = classify_response(&RawResponse::new(403, REJECTED)).unwrap_err();
        assert_eq!(err.message, "Please refresh the page");

        let err = classify_response(&RawResponse::new(502, "bad gateway")).unwrap_err();
        assert_eq!(err.message, "platform returned 502");
    }

    #[test]
    fn plain_string_error_field() {
        let err = classify_response(&RawResponse::new(404, r#"{"error":"Not found"}"#)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "Not found");
    }
}
