//! Rate-limited, retrying session engine for the OnlyFans web API
//!
//! Builds on `onlyfans-auth` for signing and `transport` for the wire. A
//! `Session` owns one account's credentials and token bucket and shares a
//! `RuleStore`; every call goes through its `Dispatcher`.
//!
//! Request lifecycle:
//! 1. `RateLimiter::acquire()` waits for a token
//! 2. The dispatcher signs with the current rule snapshot and a fresh timestamp
//! 3. The transport sends with a bounded timeout
//! 4. `classify_response()` maps the result to a body or an `ApiError`
//! 5. Transient kinds are retried with backoff; a signature rejection forces
//!    one rule refresh and one re-signed retry
//! 6. Paginated resources run the same call per page through a `Paginator`

pub mod classify;
pub mod dispatch;
pub mod error;
pub mod paginate;
pub mod ratelimit;
pub mod refresh;
pub mod request;
pub mod resources;
pub mod retry;
pub mod session;

#[cfg(test)]
mod testing;

pub use classify::{classify_response, classify_status, is_signature_rejection};
pub use dispatch::{Dispatcher, Reply};
pub use error::{ApiError, ErrorKind, Result, SessionError};
pub use paginate::{CursorStyle, Page, PageCursor, Paginator, ResourceTemplate};
pub use ratelimit::{MIN_REFILL_PER_SEC, RateLimitConfig, RateLimiter};
pub use refresh::spawn_rule_refresh;
pub use request::RequestSpec;
pub use retry::RetryPolicy;
pub use session::{Session, SessionConfig};
