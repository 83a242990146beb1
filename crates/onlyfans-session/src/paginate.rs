//! Cursor-driven pagination
//!
//! The platform continues listings in three ways: a numeric offset, the id of
//! the last item seen, or an opaque marker returned alongside the page. A
//! `ResourceTemplate` fixes one of those styles for a resource; the
//! `Paginator` runs the single shared loop:
//!
//! 1. build the request from the template and the current cursor
//! 2. send it through the dispatcher
//! 3. extract the items and the continuation
//! 4. advance the cursor (only after a successful page)
//!
//! A run ends on an empty page, on `hasMore: false`, when the continuation is
//! missing or repeats, at the page ceiling, or once an optional item limit is
//! met. It cannot be restarted.

use futures_util::stream::{self, TryStream};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::error::{ApiError, Result};
use crate::request::RequestSpec;

/// Where to resume a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// First page
    None,
    Offset(u64),
    Id(String),
    Marker(String),
}

/// How a resource encodes its continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorStyle {
    /// `offset_param` advances by the number of items received
    Offset {
        offset_param: &'static str,
        limit_param: &'static str,
        page_size: u32,
    },
    /// `param` carries `item_field` of the last item on the previous page
    Id {
        param: &'static str,
        item_field: &'static str,
    },
    /// `param` carries the body's `marker_field` from the previous page
    Marker {
        param: &'static str,
        marker_field: &'static str,
    },
}

/// A paginated resource: the base request plus its cursor style.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceTemplate {
    pub request: RequestSpec,
    pub style: CursorStyle,
}

impl ResourceTemplate {
    pub fn new(request: RequestSpec, style: CursorStyle) -> Self {
        Self { request, style }
    }

    /// Request for the page at `cursor`.
    pub fn request_for(&self, cursor: &PageCursor) -> RequestSpec {
        let spec = self.request.clone();
        match (&self.style, cursor) {
            (
                CursorStyle::Offset {
                    offset_param,
                    limit_param,
                    page_size,
                },
                cursor,
            ) => {
                let offset = match cursor {
                    PageCursor::Offset(offset) => *offset,
                    _ => 0,
                };
                spec.with_query(*limit_param, page_size)
                    .with_query(*offset_param, offset)
            }
            (CursorStyle::Id { param, .. }, PageCursor::Id(id)) => spec.with_query(*param, id),
            (CursorStyle::Marker { param, .. }, PageCursor::Marker(marker)) => {
                spec.with_query(*param, marker)
            }
            _ => spec,
        }
    }
}

/// One fetched, non-empty page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based position in the run
    pub number: u32,
    /// Cursor the page was requested with
    pub cursor: PageCursor,
    pub items: Vec<Value>,
}

pub struct Paginator<'a> {
    dispatcher: &'a Dispatcher,
    template: ResourceTemplate,
    cursor: PageCursor,
    fetched: u32,
    max_pages: u32,
    done: bool,
    truncated: bool,
    item_limit: Option<usize>,
    yielded: usize,
    limit_reached: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(dispatcher: &'a Dispatcher, template: ResourceTemplate, max_pages: u32) -> Self {
        Self {
            dispatcher,
            template,
            cursor: PageCursor::None,
            fetched: 0,
            max_pages,
            done: false,
            truncated: false,
            item_limit: None,
            yielded: 0,
            limit_reached: false,
        }
    }

    /// Start the run at `cursor` instead of the first page.
    pub fn starting_at(mut self, cursor: PageCursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Stop once `limit` items have been yielded. The page that crosses the
    /// limit is cut short.
    pub fn with_item_limit(mut self, limit: usize) -> Self {
        self.item_limit = Some(limit);
        self
    }

    /// Fetch the next page, or `None` once the run has ended.
    ///
    /// On error the cursor is left where it was, so calling again retries the
    /// same page.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.done {
            return Ok(None);
        }
        if self.item_limit.is_some_and(|limit| self.yielded >= limit) {
            self.limit_reached = true;
            self.done = true;
            return Ok(None);
        }
        if self.fetched >= self.max_pages {
            warn!(
                path = self.template.request.path(),
                pages = self.fetched,
                "page ceiling reached, ending pagination early"
            );
            self.truncated = true;
            self.done = true;
            return Ok(None);
        }

        let spec = self.template.request_for(&self.cursor);
        let reply = self.dispatcher.send_reply(&spec).await?;
        self.fetched += 1;

        let body = &reply.value;
        let mut items = extract_items(body).map_err(|message| reply.malformed(message))?;
        let has_more = body.get("hasMore").and_then(Value::as_bool);
        let requested_with = self.cursor.clone();

        if items.is_empty() {
            debug!(path = spec.path(), pages = self.fetched, "empty page, pagination complete");
            self.done = true;
            return Ok(None);
        }

        let next = self
            .next_cursor(body, &items)
            .map_err(|message| reply.malformed(message))?;
        match next {
            Some(cursor) if has_more != Some(false) && cursor != self.cursor => {
                self.cursor = cursor;
            }
            _ => self.done = true,
        }

        if let Some(limit) = self.item_limit {
            let remaining = limit - self.yielded;
            if items.len() >= remaining {
                debug!(path = spec.path(), limit, "item limit reached, ending pagination");
                items.truncate(remaining);
                self.limit_reached = true;
                self.done = true;
            }
        }
        self.yielded += items.len();

        Ok(Some(Page {
            number: self.fetched,
            cursor: requested_with,
            items,
        }))
    }

    /// Continuation after a page of `items`, or `None` if the resource has no
    /// more pages.
    fn next_cursor(
        &self,
        body: &Value,
        items: &[Value],
    ) -> std::result::Result<Option<PageCursor>, String> {
        match &self.template.style {
            CursorStyle::Offset { .. } => {
                let current = match self.cursor {
                    PageCursor::Offset(offset) => offset,
                    _ => 0,
                };
                Ok(Some(PageCursor::Offset(current + items.len() as u64)))
            }
            CursorStyle::Id { item_field, .. } => {
                let last = items.last().and_then(|item| item.get(*item_field));
                match last.and_then(scalar_string) {
                    Some(id) => Ok(Some(PageCursor::Id(id))),
                    None => Err(format!(
                        "last item has no usable `{item_field}` for the next page"
                    )),
                }
            }
            CursorStyle::Marker { marker_field, .. } => Ok(body
                .get(*marker_field)
                .and_then(scalar_string)
                .filter(|m| !m.is_empty())
                .map(PageCursor::Marker)),
        }
    }

    /// Pages fetched so far, including empty ones.
    pub fn pages_fetched(&self) -> u32 {
        self.fetched
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether the run stopped at the page ceiling rather than at its end.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Whether the run stopped because the item limit was met.
    pub fn limit_reached(&self) -> bool {
        self.limit_reached
    }

    /// Items yielded so far, after any limit cut.
    pub fn items_yielded(&self) -> usize {
        self.yielded
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    /// Drain the remaining pages into one list of items.
    pub async fn collect_items(mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page.items);
        }
        Ok(items)
    }

    /// The remaining pages as a stream.
    pub fn into_stream(self) -> impl TryStream<Ok = Page, Error = ApiError> + 'a {
        stream::try_unfold(self, |mut paginator| async move {
            let page = paginator.next_page().await?;
            Ok::<_, ApiError>(page.map(|page| (page, paginator)))
        })
    }
}

/// Item list of a page body: the body itself when it is an array, otherwise
/// its `list` field.
fn extract_items(body: &Value) -> std::result::Result<Vec<Value>, &'static str> {
    match body {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => match map.get("list") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err("page body has no item list"),
        },
        _ => Err("page body is not a list"),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
