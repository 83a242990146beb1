//! Scripted collaborators for dispatcher, paginator and session tests

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use onlyfans_auth::{Credentials, RuleSource, RuleStore, SigningRuleSet};
use transport::{OutboundRequest, RawResponse, Transport, TransportError};

use crate::ratelimit::RateLimitConfig;
use crate::retry::RetryPolicy;
use crate::session::SessionConfig;

type Handler = Box<dyn Fn(&OutboundRequest) -> transport::Result<RawResponse> + Send + Sync>;

/// Transport that answers from a queue or a handler and records every request.
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<transport::Result<RawResponse>>>,
    handler: Option<Handler>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    /// Answer requests in order; an exhausted script answers 500.
    pub fn new(script: Vec<transport::Result<RawResponse>>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(script.into()),
            handler: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn statuses(statuses: &[u16]) -> Arc<Self> {
        Self::new(
            statuses
                .iter()
                .map(|s| Ok(RawResponse::new(*s, if *s < 300 { "{}" } else { "" })))
                .collect(),
        )
    }

    pub fn with_handler(
        handler: impl Fn(&OutboundRequest) -> transport::Result<RawResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            handler: Some(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn id(&self) -> &str {
        "scripted"
    }

    fn execute<'a>(
        &'a self,
        request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<RawResponse>> + Send + 'a>> {
        Box::pin(async move {
            let result = match &self.handler {
                Some(handler) => handler(&request),
                None => self
                    .queue
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(RawResponse::new(500, "script exhausted"))),
            };
            self.requests.lock().unwrap().push(request);
            result
        })
    }
}

/// Transport that never answers.
pub struct HangingTransport;

impl Transport for HangingTransport {
    fn id(&self) -> &str {
        "hanging"
    }

    fn execute<'a>(
        &'a self,
        _request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<RawResponse>> + Send + 'a>> {
        Box::pin(async {
            std::future::pending::<()>().await;
            Err(TransportError::Other("unreachable".into()))
        })
    }
}

pub fn rules(version: &str) -> SigningRuleSet {
    SigningRuleSet {
        version: version.into(),
        static_param: format!("salt-{version}"),
        checksum_indexes: vec![0, 5, 10],
        checksum_constant: -100,
        prefix: "1".into(),
        suffix: "f".into(),
        app_token: "app".into(),
        fetched_at: 0,
    }
}

/// Rule source that hands out `v1`, `v2`, ... and can be told to fail.
pub struct VersionedSource {
    pub fetches: AtomicUsize,
    failing: std::sync::atomic::AtomicBool,
}

impl VersionedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fetches: AtomicUsize::new(0),
            failing: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl RuleSource for VersionedSource {
    fn describe(&self) -> String {
        "versioned".into()
    }

    fn fetch<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = onlyfans_auth::Result<SigningRuleSet>> + Send + 'a>> {
        Box::pin(async move {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.load(Ordering::SeqCst) {
                Err(onlyfans_auth::Error::Http("rule source down".into()))
            } else {
                Ok(rules(&format!("v{n}")))
            }
        })
    }
}

pub async fn store(source: Arc<VersionedSource>) -> Arc<RuleStore> {
    Arc::new(RuleStore::bootstrap(source).await.unwrap())
}

pub fn credentials() -> Credentials {
    Credentials::new(12345, "sess=abc; auth_id=12345", "bc-token", "Mozilla/5.0").unwrap()
}

/// Config with a generous limiter and short delays so retries finish fast.
pub fn config() -> SessionConfig {
    SessionConfig {
        base_url: "https://platform.test".into(),
        request_timeout: Duration::from_secs(5),
        rate_limit: RateLimitConfig {
            capacity: 1000,
            refill_per_sec: 1000.0,
        },
        retry: RetryPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        },
        max_pages: 500,
    }
}
