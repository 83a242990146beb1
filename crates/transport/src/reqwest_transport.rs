//! `reqwest`-backed transport.
//!
//! One `reqwest::Client` is shared by every request of a session so TLS
//! sessions and pooled connections are reused across calls.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::{OutboundRequest, RawResponse, Result, Transport, TransportError, parse_retry_after};

/// Idle pooled connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Production transport over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client tuned for many small JSON calls to a single host.
    pub fn with_defaults(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Other(format!("building http client: {e}")))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Transport for ReqwestTransport {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn execute<'a>(
        &'a self,
        request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), request.url.as_str())
                .headers(request.headers)
                .timeout(request.timeout);
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(map_error)?;
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.map_err(map_error)?;

            debug!(
                method = %request.method,
                url = %request.url,
                status,
                bytes = body.len(),
                "transport exchange complete"
            );
            Ok(RawResponse {
                status,
                retry_after,
                body,
            })
        })
    }
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
