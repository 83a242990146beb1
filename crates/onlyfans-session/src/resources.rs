//! Platform endpoints and the cursor style each one uses

use crate::paginate::{CursorStyle, ResourceTemplate};
use crate::request::RequestSpec;

/// Page size used by offset-paginated listings unless overridden.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

fn offset(path: impl Into<String>, page_size: u32) -> ResourceTemplate {
    ResourceTemplate::new(
        RequestSpec::get(path),
        CursorStyle::Offset {
            offset_param: "offset",
            limit_param: "limit",
            page_size,
        },
    )
}

/// The authenticated account.
pub fn me() -> RequestSpec {
    RequestSpec::get("/api2/v2/users/me")
}

/// A user's profile by username.
pub fn user(username: &str) -> RequestSpec {
    RequestSpec::get(format!("/api2/v2/users/{username}"))
}

/// A user's posts, newest first, continued by publish-time marker.
pub fn user_posts(user_id: u64, page_size: u32) -> ResourceTemplate {
    ResourceTemplate::new(
        RequestSpec::get(format!("/api2/v2/users/{user_id}/posts"))
            .with_query("limit", page_size)
            .with_query("order", "publish_date_desc"),
        CursorStyle::Marker {
            param: "beforePublishTime",
            marker_field: "tailMarker",
        },
    )
}

/// Messages of one chat, newest first, continued by the oldest id seen.
pub fn chat_messages(chat_id: u64, page_size: u32) -> ResourceTemplate {
    ResourceTemplate::new(
        RequestSpec::get(format!("/api2/v2/chats/{chat_id}/messages"))
            .with_query("limit", page_size)
            .with_query("order", "desc"),
        CursorStyle::Id {
            param: "id",
            item_field: "id",
        },
    )
}

pub fn chats(page_size: u32) -> ResourceTemplate {
    offset("/api2/v2/chats", page_size)
}

/// Active subscriptions of the account.
pub fn subscriptions(page_size: u32) -> ResourceTemplate {
    let mut template = offset("/api2/v2/subscriptions/subscribes", page_size);
    template.request = template.request.with_query("type", "active");
    template
}

pub fn mass_message_stats(page_size: u32) -> ResourceTemplate {
    offset("/api2/v2/messages/queue/stats", page_size)
}

pub fn vault_media(page_size: u32) -> ResourceTemplate {
    offset("/api2/v2/vault/media", page_size)
}

pub fn archived_stories(page_size: u32) -> ResourceTemplate {
    offset("/api2/v2/stories/archive", page_size)
}
