//! OnlyFans API gateway
//!
//! Single-binary service that:
//! 1. Loads one account's session credentials and the current signing rules
//! 2. Keeps the rules fresh in the background
//! 3. Exposes the account's platform resources as plain JSON routes, with
//!    signing, rate limiting, retries and pagination handled by the session

mod config;
mod error;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{FromRef, State};
use axum::response::IntoResponse;
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;
use onlyfans_auth::{Credentials, HttpRuleSource, RuleSource, RuleStore, StaticRuleSource};
use onlyfans_session::{Session, spawn_rule_refresh};
use transport::ReqwestTransport;

use crate::config::Config;
use crate::routes::PlatformState;

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect timeout for the shared platform client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    platform: PlatformState,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

impl FromRef<AppState> for PlatformState {
    fn from_ref(state: &AppState) -> Self {
        state.platform.clone()
    }
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` caps concurrent requests; each one may hold a
/// rate-limiter slot for its whole pagination run.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/me", get(routes::me))
        .route("/v1/users/{user}", get(routes::user))
        .route("/v1/users/{user}/posts", get(routes::user_posts))
        .route("/v1/chats", get(routes::chats))
        .route("/v1/chats/{chat_id}/messages", get(routes::chat_messages))
        .route("/v1/subscriptions", get(routes::subscriptions))
        .route("/v1/mass-messages/stats", get(routes::mass_message_stats))
        .route("/v1/vault/media", get(routes::vault_media))
        .route("/v1/stories/archive", get(routes::archived_stories))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting onlyfans-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install metrics recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        base_url = %config.platform.base_url,
        rules = %config
            .platform
            .rules_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| config.platform.rules_url.clone()),
        "configuration loaded"
    );

    let credentials = Credentials::load(&config.platform.credentials_path)
        .await
        .with_context(|| {
            format!(
                "failed to load credentials from {}",
                config.platform.credentials_path.display()
            )
        })?;

    let transport =
        ReqwestTransport::with_defaults(CONNECT_TIMEOUT).context("failed to build http client")?;

    let source: Arc<dyn RuleSource> = match &config.platform.rules_file {
        Some(path) => {
            let document = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read rules file {}", path.display()))?;
            Arc::new(StaticRuleSource::new(document))
        }
        None => Arc::new(HttpRuleSource::new(
            transport.client().clone(),
            config.platform.rules_url.clone(),
        )),
    };
    let rules = Arc::new(
        RuleStore::bootstrap(source)
            .await
            .context("failed to load initial signing rules")?,
    );

    let session = Session::new(
        credentials,
        rules.clone(),
        Arc::new(transport),
        config.session_config(),
    )
    .context("failed to start session")?;

    let refresh_task = match config.platform.rules_refresh_secs {
        0 => {
            info!("background rule refresh disabled");
            None
        }
        secs => Some(spawn_rule_refresh(rules, Duration::from_secs(secs))),
    };

    let app_state = AppState {
        platform: PlatformState {
            session: Arc::new(session),
            page_size: config.pagination.page_size,
        },
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    if let Some(task) = refresh_task {
        task.abort();
    }
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: account, rule state, limiter headroom and uptime.
///
/// Stale rules still sign requests, so a failed refresh reports
/// `degraded` with a 200 rather than taking the gateway out of rotation.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = &state.platform.session;
    let rules = session.rules();
    let stale = rules.is_stale();
    let snapshot = rules.current();

    let body = serde_json::json!({
        "status": if stale { "degraded" } else { "healthy" },
        "account_id": session.account_id(),
        "rules_version": snapshot.version,
        "rules_source": rules.describe_source(),
        "rules_fetched_at": snapshot.fetched_at,
        "rules_stale": stale,
        "rules_refreshes": rules.refresh_count(),
        "rate_limit_available": session.limiter().available().await,
        "rate_limit_capacity": session.limiter().capacity(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode};
    use onlyfans_session::{RateLimitConfig, RetryPolicy, SessionConfig};
    use std::collections::HashMap;
    use tower::ServiceExt;

    const RULES_DOC: &str = r#"{
        "version": "test-rules",
        "static_param": "d3Zr5wNTLEhfXGtX9J1yvQG5GbMx0uW2",
        "checksum_indexes": [0, 5, 10, 21, 39],
        "checksum_constant": -1180,
        "prefix": "28232",
        "suffix": "689f0f9d"
    }"#;

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    /// Gateway state wired to a platform at `base_url`. Retries are disabled
    /// so failures surface on the first response.
    async fn test_app_state(base_url: &str) -> AppState {
        let credentials =
            Credentials::new(12345, "sess=abc; auth_id=12345", "bc-token", "test-agent").unwrap();
        let rules = Arc::new(
            RuleStore::bootstrap(Arc::new(StaticRuleSource::new(RULES_DOC)))
                .await
                .unwrap(),
        );
        let transport = ReqwestTransport::with_defaults(Duration::from_secs(2)).unwrap();
        let config = SessionConfig {
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(5),
            rate_limit: RateLimitConfig {
                capacity: 100,
                refill_per_sec: 100.0,
            },
            retry: RetryPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                rate_limit_retries: 0,
                transient_retries: 0,
                signature_refresh_retries: 1,
            },
            max_pages: 10,
        };
        let session = Session::new(credentials, rules, Arc::new(transport), config).unwrap();

        AppState {
            platform: PlatformState {
                session: Arc::new(session),
                page_size: 2,
            },
            prometheus: test_prometheus_handle(),
            started_at: Instant::now(),
        }
    }

    fn header(headers: &HeaderMap, name: &str) -> String {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    }

    /// Start a mock platform. Every route rejects unsigned requests the way
    /// the platform does.
    async fn start_platform() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("http://{addr}");

        async fn me(headers: HeaderMap) -> (StatusCode, axum::Json<serde_json::Value>) {
            if header(&headers, "sign").is_empty() {
                return (
                    StatusCode::BAD_REQUEST,
                    axum::Json(serde_json::json!({"error": {"message": "Please refresh the page"}})),
                );
            }
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({
                    "id": 12345,
                    "username": "creator",
                    "seen_user_id": header(&headers, "user-id"),
                    "seen_sign": header(&headers, "sign"),
                    "seen_user_agent": header(&headers, "user-agent"),
                })),
            )
        }

        async fn user(
            axum::extract::Path(name): axum::extract::Path<String>,
        ) -> (StatusCode, axum::Json<serde_json::Value>) {
            match name.as_str() {
                "ghost" => (
                    StatusCode::NOT_FOUND,
                    axum::Json(serde_json::json!({"error": {"message": "User not found"}})),
                ),
                "anon" => (StatusCode::OK, axum::Json(serde_json::json!({"username": name}))),
                _ => (
                    StatusCode::OK,
                    axum::Json(serde_json::json!({"id": 4242, "username": name})),
                ),
            }
        }

        // Posts are keyed by numeric id; the path segment shares the
        // profile route's parameter name
        async fn posts(
            axum::extract::Path(name): axum::extract::Path<String>,
        ) -> (StatusCode, axum::Json<serde_json::Value>) {
            if name != "4242" {
                return (
                    StatusCode::NOT_FOUND,
                    axum::Json(serde_json::json!({"error": {"message": "User not found"}})),
                );
            }
            let list: Vec<serde_json::Value> = (1..=3)
                .map(|id| serde_json::json!({"id": id, "author": name}))
                .collect();
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({"list": list, "tailMarker": null})),
            )
        }

        async fn chats(
            axum::extract::Query(query): axum::extract::Query<HashMap<String, String>>,
        ) -> axum::Json<serde_json::Value> {
            let offset: usize = query.get("offset").and_then(|o| o.parse().ok()).unwrap_or(0);
            let limit: usize = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(10);
            let all: Vec<serde_json::Value> =
                (1..=3).map(|id| serde_json::json!({"id": id})).collect();
            let page: Vec<serde_json::Value> = all.into_iter().skip(offset).take(limit).collect();
            axum::Json(serde_json::json!({"list": page}))
        }

        async fn stats() -> impl IntoResponse {
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "7")],
                "slow down",
            )
        }

        let handle = tokio::spawn(async move {
            let app = axum::Router::new()
                .route("/api2/v2/users/me", get(me))
                .route("/api2/v2/users/{name}", get(user))
                .route("/api2/v2/users/{name}/posts", get(posts))
                .route("/api2/v2/chats", get(chats))
                .route("/api2/v2/messages/queue/stats", get(stats));
            axum::serve(listener, app).await.unwrap();
        });

        (url, handle)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, HeaderMap, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_reports_session_and_rules() {
        let state = test_app_state("http://127.0.0.1:9").await;
        let (status, _, json) = get_json(build_router(state, 1000), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["account_id"], 12345);
        assert_eq!(json["rules_version"], "test-rules");
        assert_eq!(json["rules_source"], "static");
        assert_eq!(json["rules_stale"], false);
        assert_eq!(json["rate_limit_available"], 100);
        assert_eq!(json["rate_limit_capacity"], 100);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_text() {
        let state = test_app_state("http://127.0.0.1:9").await;
        let response = build_router(state, 1000)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"), "got: {content_type}");
    }

    #[tokio::test]
    async fn me_route_sends_signed_request() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;

        let (status, _, json) = get_json(build_router(state, 1000), "/v1/me").await;
        assert_eq!(status, StatusCode::OK, "got: {json}");
        assert_eq!(json["username"], "creator");
        assert_eq!(json["seen_user_id"], "12345");
        assert_eq!(json["seen_user_agent"], "test-agent");

        let sign = json["seen_sign"].as_str().unwrap();
        let parts: Vec<&str> = sign.split(':').collect();
        assert_eq!(parts.len(), 4, "got: {sign}");
        assert_eq!(parts[0], "28232");
        assert_eq!(parts[1].len(), 40);
        assert_eq!(parts[3], "689f0f9d");
    }

    #[tokio::test]
    async fn user_route_passes_through_profile() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;

        let (status, _, json) = get_json(build_router(state, 1000), "/v1/users/somebody").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["username"], "somebody");
    }

    #[tokio::test]
    async fn missing_user_maps_to_404_with_details() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;

        let (status, _, json) = get_json(build_router(state, 1000), "/v1/users/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["type"], "not_found");
        assert_eq!(json["error"]["upstream_status"], 404);
        assert!(
            json["error"]["request_id"]
                .as_str()
                .unwrap()
                .starts_with("req_")
        );
    }

    #[tokio::test]
    async fn listing_defaults_to_configured_limit() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;

        // Default limit 2 over three chats: one page, cut at the limit
        let (status, _, json) = get_json(build_router(state, 1000), "/v1/chats").await;
        assert_eq!(status, StatusCode::OK, "got: {json}");
        assert_eq!(json["count"], 2);
        assert_eq!(json["limit"], 2);
        assert_eq!(json["offset"], 0);
        assert_eq!(json["pages"], 1);
        assert_eq!(json["limit_reached"], true);
        assert_eq!(json["truncated"], false);
        assert_eq!(json["items"][1]["id"], 2);
    }

    #[tokio::test]
    async fn listing_limit_caps_items_returned() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;
        let app = build_router(state, 1000);

        let (status, _, json) = get_json(app.clone(), "/v1/chats?limit=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
        assert_eq!(json["pages"], 1);
        assert_eq!(json["items"][0]["id"], 1);

        // A limit above the listing's size reads to the end: [1,2,3], []
        let (_, _, json) = get_json(app, "/v1/chats?limit=10").await;
        assert_eq!(json["count"], 3);
        assert_eq!(json["pages"], 2);
        assert_eq!(json["limit_reached"], false);
    }

    #[tokio::test]
    async fn listing_offset_starts_platform_run() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;

        let (status, _, json) =
            get_json(build_router(state, 1000), "/v1/chats?offset=1&limit=5").await;
        assert_eq!(status, StatusCode::OK, "got: {json}");
        assert_eq!(json["offset"], 1);
        assert_eq!(json["count"], 2);
        assert_eq!(json["items"][0]["id"], 2);
        assert_eq!(json["items"][1]["id"], 3);
    }

    #[tokio::test]
    async fn negative_offset_is_rejected() {
        let state = test_app_state("http://127.0.0.1:9").await;
        let response = build_router(state, 1000)
            .oneshot(
                Request::builder()
                    .uri("/v1/chats?offset=-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn posts_resolve_username_to_id() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;

        let (status, _, json) =
            get_json(build_router(state, 1000), "/v1/users/somebody/posts?limit=10").await;
        assert_eq!(status, StatusCode::OK, "got: {json}");
        assert_eq!(json["count"], 3);
        assert_eq!(json["pages"], 1);
        assert_eq!(json["items"][0]["author"], "4242");
    }

    #[tokio::test]
    async fn posts_offset_skips_leading_items() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;

        let (status, _, json) = get_json(
            build_router(state, 1000),
            "/v1/users/somebody/posts?offset=1&limit=1",
        )
        .await;
        assert_eq!(status, StatusCode::OK, "got: {json}");
        assert_eq!(json["count"], 1);
        assert_eq!(json["items"][0]["id"], 2);
        assert_eq!(json["limit_reached"], true);
    }

    #[tokio::test]
    async fn posts_of_missing_user_map_to_404() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;
        let app = build_router(state, 1000);

        let (status, _, json) = get_json(app.clone(), "/v1/users/ghost/posts").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["type"], "not_found");

        // A profile without an id cannot be listed
        let (status, _, json) = get_json(app, "/v1/users/anon/posts").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["type"], "malformed");
        assert_eq!(json["error"]["upstream_status"], 200);
    }

    #[tokio::test]
    async fn out_of_range_limit_is_rejected() {
        let state = test_app_state("http://127.0.0.1:9").await;
        let app = build_router(state, 1000);

        for uri in ["/v1/chats?limit=0", "/v1/vault/media?limit=1000"] {
            let (status, _, json) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(json["error"]["type"], "invalid_request");
        }
    }

    #[tokio::test]
    async fn rate_limited_listing_forwards_retry_after() {
        let (platform_url, _server) = start_platform().await;
        let state = test_app_state(&platform_url).await;

        let (status, headers, json) =
            get_json(build_router(state, 1000), "/v1/mass-messages/stats").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers["retry-after"], "7");
        assert_eq!(json["error"]["type"], "rate_limited");
        assert_eq!(json["error"]["attempts"], 1);
    }

    #[tokio::test]
    async fn unreachable_platform_maps_to_bad_gateway() {
        // Nothing listens on the discard port
        let state = test_app_state("http://127.0.0.1:9").await;
        let (status, _, json) = get_json(build_router(state, 1000), "/v1/me").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["type"], "network");
    }

    #[tokio::test]
    async fn non_numeric_chat_id_is_rejected_by_router() {
        let state = test_app_state("http://127.0.0.1:9").await;
        let response = build_router(state, 1000)
            .oneshot(
                Request::builder()
                    .uri("/v1/chats/abc/messages")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
