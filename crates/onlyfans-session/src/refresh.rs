//! Periodic background rule refresh
//!
//! Keeps the rule store current without waiting for a signature rejection.
//! Failures are logged and leave the last good rules in place; the next tick
//! tries again.

use std::sync::Arc;
use std::time::Duration;

use onlyfans_auth::RuleStore;
use tracing::{debug, warn};

/// Spawn a task refreshing `store` every `interval`.
///
/// Returns the task's `JoinHandle`; abort it to stop refreshing.
pub fn spawn_rule_refresh(store: Arc<RuleStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, the store was just bootstrapped
        ticker.tick().await;

        loop {
            ticker.tick().await;
            refresh_cycle(&store).await;
        }
    })
}

async fn refresh_cycle(store: &RuleStore) {
    match store.refresh().await {
        Ok(rules) => {
            metrics::counter!("onlyfans_rule_refresh_total", "result" => "ok").increment(1);
            debug!(version = %rules.version, "scheduled rule refresh succeeded");
        }
        Err(e) => {
            metrics::counter!("onlyfans_rule_refresh_total", "result" => "error").increment(1);
            warn!(
                error = %e,
                stale = store.is_stale(),
                "scheduled rule refresh failed, will retry next cycle"
            );
        }
    }
}
