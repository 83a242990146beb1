//! Signing rule store
//!
//! Owns the current `SigningRuleSet` and the source it is refreshed from.
//! Callers take an `Arc` snapshot per request; a refresh swaps the snapshot
//! atomically, so requests already in flight keep the revision they signed
//! with.
//!
//! Refresh is single-flight: concurrent callers queue on one gate, the first
//! performs the fetch and the rest receive its outcome without fetching again.
//! A failed refresh after a successful one keeps the previous snapshot and
//! marks the store stale.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::rules::{SigningRuleSet, fetch_rules, unix_now};

/// Where rule documents come from.
///
/// Boxed-future return so the store can hold an `Arc<dyn RuleSource>`.
pub trait RuleSource: Send + Sync {
    /// Human-readable origin for logs (usually a URL)
    fn describe(&self) -> String;

    fn fetch<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<SigningRuleSet>> + Send + 'a>>;
}

/// Fetches the rule document over HTTP.
pub struct HttpRuleSource {
    client: reqwest::Client,
    url: String,
}

impl HttpRuleSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl RuleSource for HttpRuleSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<SigningRuleSet>> + Send + 'a>> {
        Box::pin(fetch_rules(&self.client, &self.url))
    }
}

/// Serves a fixed rule document, for pinned deployments and tests.
pub struct StaticRuleSource {
    document: String,
}

impl StaticRuleSource {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

impl RuleSource for StaticRuleSource {
    fn describe(&self) -> String {
        "static".into()
    }

    fn fetch<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<SigningRuleSet>> + Send + 'a>> {
        Box::pin(async move { SigningRuleSet::from_document(&self.document, unix_now()) })
    }
}

/// Most recent refresh outcome, shared with callers that queued behind it.
struct RefreshState {
    generation: u64,
    last: Result<Arc<SigningRuleSet>>,
}

pub struct RuleStore {
    source: Arc<dyn RuleSource>,
    current: RwLock<Arc<SigningRuleSet>>,
    stale: AtomicBool,
    completed: AtomicU64,
    gate: Mutex<RefreshState>,
}

impl RuleStore {
    /// Fetch the first rule set. Fails if the source cannot produce a valid
    /// one; there is no store without rules.
    pub async fn bootstrap(source: Arc<dyn RuleSource>) -> Result<Self> {
        let rules = source.fetch().await?;
        info!(
            source = %source.describe(),
            version = %rules.version,
            "signing rules loaded"
        );
        Self::with_initial(source, rules)
    }

    /// Build a store around rules the caller already holds. The rules are
    /// validated like a fetched document.
    pub fn with_initial(source: Arc<dyn RuleSource>, rules: SigningRuleSet) -> Result<Self> {
        rules.validate()?;
        let rules = Arc::new(rules);
        Ok(Self {
            source,
            current: RwLock::new(rules.clone()),
            stale: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            gate: Mutex::new(RefreshState {
                generation: 0,
                last: Ok(rules),
            }),
        })
    }

    /// Snapshot of the current rule set.
    pub fn current(&self) -> Arc<SigningRuleSet> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether the most recent refresh failed.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Number of refresh fetches performed (successful or not).
    pub fn refresh_count(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Where refreshes fetch from, for health output.
    pub fn describe_source(&self) -> String {
        self.source.describe()
    }

    /// Fetch a new rule set and swap it in.
    ///
    /// Callers that arrive while a fetch is running wait for it and share its
    /// result. On failure the previous snapshot stays current.
    pub async fn refresh(&self) -> Result<Arc<SigningRuleSet>> {
        let seen = self.completed.load(Ordering::Acquire);
        let mut state = self.gate.lock().await;

        if state.generation != seen {
            // Another caller finished a fetch while we waited on the gate
            return state.last.clone();
        }

        let outcome = self.source.fetch().await;
        let result = match outcome {
            Ok(rules) => {
                let rules = Arc::new(rules);
                let previous = {
                    let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
                    std::mem::replace(&mut *current, rules.clone())
                };
                self.stale.store(false, Ordering::Release);
                if previous.version != rules.version {
                    info!(
                        from = %previous.version,
                        to = %rules.version,
                        "signing rules rotated"
                    );
                }
                Ok(rules)
            }
            Err(e) => {
                self.stale.store(true, Ordering::Release);
                warn!(
                    source = %self.source.describe(),
                    error = %e,
                    serving = %self.current().version,
                    "rule refresh failed, keeping previous rules"
                );
                Err(e)
            }
        };

        state.generation = seen + 1;
        state.last = result.clone();
        self.completed.store(seen + 1, Ordering::Release);
        result
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("source", &self.source.describe())
            .field("version", &self.current().version)
            .field("stale", &self.is_stale())
            .finish()
    }
}
