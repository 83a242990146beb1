//! Session credentials
//!
//! The platform authenticates a browser session, not an API key: the caller
//! supplies the full cookie string, the `x-bc` browser-check token the web
//! client generated, and the exact user agent that session was created with.
//! A mismatch in any of them reads as a logged-out session.
//!
//! Credentials are validated once at load time and never mutated afterwards.
//! The cookie and `x-bc` token are wrapped in `Secret` so they cannot leak
//! through `Debug` or log fields.

use std::fmt;
use std::path::Path;

use common::Secret;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Authenticated identity for one platform account.
#[derive(Clone)]
pub struct Credentials {
    account_id: u64,
    cookie: Secret<String>,
    browser_check_token: Secret<String>,
    user_agent: String,
}

/// Shape of the `auth` object in an `auth.json` export.
///
/// `id` appears as either a number or a numeric string depending on the tool
/// that produced the file.
#[derive(Debug, Deserialize)]
struct AuthDetails {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    cookie: String,
    #[serde(default)]
    x_bc: String,
    #[serde(default)]
    user_agent: String,
}

impl Credentials {
    /// Build credentials from already-extracted values.
    ///
    /// Rejects a zero account id and empty cookie, browser-check token or
    /// user agent.
    pub fn new(
        account_id: u64,
        cookie: impl Into<String>,
        browser_check_token: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Result<Self> {
        let cookie = Secret::new(cookie.into());
        let browser_check_token = Secret::new(browser_check_token.into());
        let user_agent = user_agent.into();

        if account_id == 0 {
            return Err(Error::InvalidCredentials("account id must be non-zero".into()));
        }
        if cookie.is_blank() {
            return Err(Error::InvalidCredentials("cookie must not be empty".into()));
        }
        if browser_check_token.is_blank() {
            return Err(Error::InvalidCredentials(
                "browser check token (x_bc) must not be empty".into(),
            ));
        }
        if user_agent.trim().is_empty() {
            return Err(Error::InvalidCredentials("user agent must not be empty".into()));
        }

        Ok(Self {
            account_id,
            cookie,
            browser_check_token,
            user_agent,
        })
    }

    /// Parse an `auth.json` document.
    ///
    /// Accepts both `{"auth": {...}}` and the bare inner object. When `id` is
    /// missing or zero the account id is taken from the cookie's `auth_id`.
    pub fn from_json(contents: &str) -> Result<Self> {
        let root: serde_json::Value = serde_json::from_str(contents)
            .map_err(|e| Error::CredentialParse(format!("parsing auth document: {e}")))?;
        let inner = root.get("auth").unwrap_or(&root);
        let details = AuthDetails::deserialize(inner)
            .map_err(|e| Error::CredentialParse(format!("reading auth fields: {e}")))?;

        let declared_id = details.id.as_ref().and_then(parse_id).filter(|id| *id != 0);
        let account_id = match declared_id {
            Some(id) => id,
            None => {
                let recovered = auth_id_from_cookie(&details.cookie).ok_or_else(|| {
                    Error::InvalidCredentials(
                        "no account id and cookie has no auth_id component".into(),
                    )
                })?;
                debug!(account_id = recovered, "account id recovered from cookie auth_id");
                recovered
            }
        };

        Self::new(account_id, details.cookie, details.x_bc, details.user_agent)
    }

    /// Load credentials from an `auth.json` file.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Io(format!("reading credential file {}: {e}", path.display())))?;
        let credentials = Self::from_json(&contents)?;
        info!(
            path = %path.display(),
            account_id = credentials.account_id,
            cookie_len = credentials.cookie.len(),
            "loaded credentials"
        );
        Ok(credentials)
    }

    pub fn account_id(&self) -> u64 {
        self.account_id
    }

    /// Full cookie string (use only when building request headers)
    pub fn cookie(&self) -> &str {
        self.cookie.expose()
    }

    /// `x-bc` token (use only when building request headers)
    pub fn browser_check_token(&self) -> &str {
        self.browser_check_token.expose()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("cookie", &self.cookie)
            .field("browser_check_token", &self.browser_check_token)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

fn parse_id(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract the numeric `auth_id` component from a cookie string.
fn auth_id_from_cookie(cookie: &str) -> Option<u64> {
    cookie
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, _)| *name == "auth_id")
        .and_then(|(_, value)| value.trim().parse().ok())
}
