//! Platform-facing routes
//!
//! Single-object routes return the platform body unchanged. Listing routes
//! take `limit` (1..=100, items to return) and `offset` (items to skip) and
//! answer with
//! `{"items":[...],"count":n,"limit":n,"offset":n,"pages":n,"limit_reached":bool,"truncated":bool}`.
//!
//! Offset-paginated resources start the platform run at `offset`. Resources
//! continued by id or marker have no random access, so the gateway reads
//! `offset + limit` items from the start and drops the first `offset`.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use onlyfans_session::{CursorStyle, PageCursor, ResourceTemplate, Session, resources};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::error::{ApiFailure, error_response};
use crate::metrics;

/// Upper bound for a caller-supplied `limit`.
const MAX_LIMIT: u32 = 100;

/// State the platform routes need.
#[derive(Clone)]
pub struct PlatformState {
    pub session: Arc<Session>,
    /// `limit` when the caller does not pass one
    pub page_size: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

/// A validated listing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    limit: u32,
    offset: u64,
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

impl ListQuery {
    /// The window this query asks for, with `default_limit` when `limit` is
    /// absent.
    fn window(&self, default_limit: u32) -> Result<Window, String> {
        let limit = match self.limit {
            None => default_limit,
            Some(limit) if (1..=MAX_LIMIT).contains(&limit) => limit,
            Some(limit) => return Err(format!("limit must be between 1 and {MAX_LIMIT}, got {limit}")),
        };
        Ok(Window {
            limit,
            offset: self.offset.unwrap_or(0),
        })
    }
}

fn finish(route: &'static str, started: Instant, response: Response) -> Response {
    metrics::record_request(route, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

fn invalid_request(route: &'static str, started: Instant, message: &str, request_id: &str) -> Response {
    finish(
        route,
        started,
        error_response(StatusCode::BAD_REQUEST, "invalid_request", message, request_id),
    )
}

/// Send one request and return the platform body.
#[instrument(skip_all, fields(request_id = %request_id, route = %route))]
async fn fetch_one(
    state: &PlatformState,
    route: &'static str,
    spec: onlyfans_session::RequestSpec,
    request_id: String,
) -> Response {
    let started = Instant::now();
    let response = match state.session.dispatch(&spec).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(error) => {
            warn!(kind = %error.kind, attempts = error.attempts, error = %error, "platform call failed");
            ApiFailure::new(error, request_id).into_response()
        }
    };
    finish(route, started, response)
}

/// Read one window of a listing.
#[instrument(skip_all, fields(request_id = %request_id, route = %route, limit = window.limit, offset = window.offset))]
async fn fetch_window(
    state: &PlatformState,
    route: &'static str,
    template: ResourceTemplate,
    window: Window,
    request_id: String,
) -> Response {
    let started = Instant::now();
    let limit = window.limit as usize;
    let by_offset = matches!(template.style, CursorStyle::Offset { .. });
    let run = state.session.paginate(template);
    let (mut run, skip) = if by_offset {
        (
            run.starting_at(PageCursor::Offset(window.offset))
                .with_item_limit(limit),
            0,
        )
    } else {
        let skip = usize::try_from(window.offset).unwrap_or(usize::MAX);
        (run.with_item_limit(skip.saturating_add(limit)), skip)
    };
    let mut items = Vec::new();

    let response = loop {
        match run.next_page().await {
            Ok(Some(page)) => items.extend(page.items),
            Ok(None) => {
                items.drain(..skip.min(items.len()));
                info!(
                    count = items.len(),
                    pages = run.pages_fetched(),
                    limit_reached = run.limit_reached(),
                    truncated = run.truncated(),
                    "listing complete"
                );
                let body = serde_json::json!({
                    "count": items.len(),
                    "limit": window.limit,
                    "offset": window.offset,
                    "pages": run.pages_fetched(),
                    "limit_reached": run.limit_reached(),
                    "truncated": run.truncated(),
                    "items": items,
                });
                break (StatusCode::OK, Json(body)).into_response();
            }
            Err(error) => {
                warn!(
                    kind = %error.kind,
                    pages = run.pages_fetched(),
                    error = %error,
                    "listing failed"
                );
                break ApiFailure::new(error, request_id).into_response();
            }
        }
    };
    finish(route, started, response)
}

/// Validate the window, then read it from the resource `build` returns for
/// the window's page size.
async fn list(
    state: &PlatformState,
    route: &'static str,
    query: &ListQuery,
    build: impl FnOnce(u32) -> ResourceTemplate,
) -> Response {
    let started = Instant::now();
    let request_id = request_id();
    match query.window(state.page_size) {
        Ok(window) => fetch_window(state, route, build(window.limit), window, request_id).await,
        Err(message) => invalid_request(route, started, &message, &request_id),
    }
}

pub async fn me(State(state): State<PlatformState>) -> Response {
    fetch_one(&state, "/v1/me", resources::me(), request_id()).await
}

pub async fn user(State(state): State<PlatformState>, Path(username): Path<String>) -> Response {
    fetch_one(&state, "/v1/users/{user}", resources::user(&username), request_id()).await
}

/// Posts of `username`. The platform lists posts by numeric id, so the
/// profile is fetched first.
pub async fn user_posts(
    State(state): State<PlatformState>,
    Path(username): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    const ROUTE: &str = "/v1/users/{user}/posts";
    let started = Instant::now();
    let request_id = request_id();
    let window = match query.window(state.page_size) {
        Ok(window) => window,
        Err(message) => return invalid_request(ROUTE, started, &message, &request_id),
    };

    match state.session.resolve_user_id(&username).await {
        Ok(user_id) => {
            let template = resources::user_posts(user_id, window.limit);
            fetch_window(&state, ROUTE, template, window, request_id).await
        }
        Err(error) => {
            warn!(
                %request_id,
                username = %username,
                kind = %error.kind,
                error = %error,
                "could not resolve user for posts"
            );
            finish(ROUTE, started, ApiFailure::new(error, request_id).into_response())
        }
    }
}

pub async fn chat_messages(
    State(state): State<PlatformState>,
    Path(chat_id): Path<u64>,
    Query(query): Query<ListQuery>,
) -> Response {
    list(&state, "/v1/chats/{chat_id}/messages", &query, |size| {
        resources::chat_messages(chat_id, size)
    })
    .await
}

pub async fn chats(State(state): State<PlatformState>, Query(query): Query<ListQuery>) -> Response {
    list(&state, "/v1/chats", &query, resources::chats).await
}

pub async fn subscriptions(
    State(state): State<PlatformState>,
    Query(query): Query<ListQuery>,
) -> Response {
    list(&state, "/v1/subscriptions", &query, resources::subscriptions).await
}

pub async fn mass_message_stats(
    State(state): State<PlatformState>,
    Query(query): Query<ListQuery>,
) -> Response {
    list(&state, "/v1/mass-messages/stats", &query, resources::mass_message_stats).await
}

pub async fn vault_media(
    State(state): State<PlatformState>,
    Query(query): Query<ListQuery>,
) -> Response {
    list(&state, "/v1/vault/media", &query, resources::vault_media).await
}

pub async fn archived_stories(
    State(state): State<PlatformState>,
    Query(query): Query<ListQuery>,
) -> Response {
    list(&state, "/v1/stories/archive", &query, resources::archived_stories).await
}
