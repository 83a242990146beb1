//! Request authentication for the OnlyFans web API
//!
//! Every call to the platform carries a per-request signature derived from a
//! set of signing rules the platform rotates at its own discretion. This crate
//! owns everything needed to produce those headers and nothing else: it does
//! no dispatching and keeps no connection state.
//!
//! Signing flow:
//! 1. `RuleStore::bootstrap()` fetches and validates the first `SigningRuleSet`
//! 2. `Credentials::load()` reads the session cookie, `x-bc` token and user agent
//! 3. Per request, the caller takes `RuleStore::current()` (an immutable snapshot)
//! 4. `sign()` turns snapshot + credentials + path + timestamp into the
//!    `sign`/`time`/`app-token` triple; `signed_headers()` adds the rest
//! 5. On signature rejection the caller forces `RuleStore::refresh()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod headers;
pub mod rules;
pub mod sign;
pub mod store;

pub use constants::*;
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use headers::signed_headers;
pub use rules::{SigningRuleSet, fetch_rules};
pub use sign::{SignatureHeaders, sign};
pub use store::{HttpRuleSource, RuleSource, RuleStore, StaticRuleSource};
