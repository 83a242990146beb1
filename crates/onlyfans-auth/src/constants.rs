//! Platform constants
//!
//! Public values the web client sends with every request. None of these are
//! secrets; the session secrets live in `Credentials`.

/// Origin of the platform web API
pub const BASE_URL: &str = "https://onlyfans.com";

/// Community-maintained signing rules document. The platform rotates the
/// rules every few days; this document tracks the current revision.
pub const DEFAULT_RULES_URL: &str =
    "https://raw.githubusercontent.com/DATAHOARDERS/dynamic-rules/main/onlyfans.json";

/// Public application identifier the web client ships with. Used when the
/// rules document does not carry its own token.
pub const DEFAULT_APP_TOKEN: &str = "33d57ade8c02dbc5a333db99ff9ae26a";

/// Length of a lowercase hex SHA-1 digest. Checksum indexes address bytes of
/// the hex string, so every index must be below this.
pub const DIGEST_HEX_LEN: usize = 40;

pub const SIGN_HEADER: &str = "sign";
pub const TIME_HEADER: &str = "time";
pub const APP_TOKEN_HEADER: &str = "app-token";
pub const BROWSER_CHECK_HEADER: &str = "x-bc";
pub const USER_ID_HEADER: &str = "user-id";

/// `Accept` value sent by the web client
pub const ACCEPT: &str = "application/json, text/plain, */*";
