//! Signing rule sets and the remote rule document
//!
//! The platform derives each request signature from a salt and a checksum
//! recipe it changes without notice. The current revision is published as a
//! small JSON document; this module parses that document into a validated
//! `SigningRuleSet`.
//!
//! Published documents are not consistent about field names. Accepted shapes:
//! - `prefix`/`suffix`, or `start`/`end`, or a `format` template such as
//!   `"28232:{}:{:x}:689f0f9d"` from which prefix and suffix are derived
//! - `revision` or `version` (string or number)
//! - `app_token` or `app-token` (optional, falls back to the public token)

use serde::Deserialize;
use tracing::debug;

use crate::constants::{DEFAULT_APP_TOKEN, DIGEST_HEX_LEN};
use crate::error::{Error, Result};

/// One validated revision of the signing rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRuleSet {
    pub version: String,
    pub static_param: String,
    /// Positions in the hex digest whose bytes are summed into the checksum
    pub checksum_indexes: Vec<usize>,
    pub checksum_constant: i64,
    pub prefix: String,
    pub suffix: String,
    pub app_token: String,
    /// Unix timestamp (seconds) at which this revision was fetched
    pub fetched_at: u64,
}

/// Raw rule document as published. Every field optional so validation can
/// report exactly which one is missing.
#[derive(Debug, Deserialize)]
struct RuleDocument {
    #[serde(default)]
    version: Option<serde_json::Value>,
    #[serde(default)]
    revision: Option<serde_json::Value>,
    #[serde(default)]
    static_param: Option<String>,
    #[serde(default)]
    checksum_indexes: Option<Vec<i64>>,
    #[serde(default)]
    checksum_constant: Option<i64>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    suffix: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    app_token: Option<String>,
    #[serde(default, rename = "app-token")]
    app_token_dashed: Option<String>,
}

impl SigningRuleSet {
    /// Parse and validate a rule document.
    pub fn from_document(document: &str, fetched_at: u64) -> Result<Self> {
        let doc: RuleDocument = serde_json::from_str(document)
            .map_err(|e| Error::RuleParse(format!("rule document is not valid JSON: {e}")))?;

        let version = doc
            .version
            .or(doc.revision)
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_default();

        let (format_prefix, format_suffix) = doc
            .format
            .as_deref()
            .and_then(split_format)
            .map(|(p, s)| (Some(p), Some(s)))
            .unwrap_or((None, None));

        let mut checksum_indexes = Vec::new();
        for index in doc.checksum_indexes.unwrap_or_default() {
            let index = usize::try_from(index).map_err(|_| {
                Error::InvalidRules(format!("checksum index {index} is negative"))
            })?;
            checksum_indexes.push(index);
        }

        let rules = Self {
            version,
            static_param: doc.static_param.unwrap_or_default(),
            checksum_indexes,
            checksum_constant: doc
                .checksum_constant
                .ok_or_else(|| Error::InvalidRules("checksum_constant is missing".into()))?,
            prefix: doc.prefix.or(doc.start).or(format_prefix).unwrap_or_default(),
            suffix: doc.suffix.or(doc.end).or(format_suffix).unwrap_or_default(),
            app_token: doc
                .app_token
                .or(doc.app_token_dashed)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_APP_TOKEN.to_string()),
            fetched_at,
        };
        rules.validate()?;
        debug!(version = %rules.version, indexes = rules.checksum_indexes.len(), "parsed signing rules");
        Ok(rules)
    }

    /// Check every field is present and usable for signing.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::InvalidRules("version is missing".into()));
        }
        if self.static_param.is_empty() {
            return Err(Error::InvalidRules("static_param is missing".into()));
        }
        if self.checksum_indexes.is_empty() {
            return Err(Error::InvalidRules("checksum_indexes is empty".into()));
        }
        if let Some(bad) = self
            .checksum_indexes
            .iter()
            .find(|i| **i >= DIGEST_HEX_LEN)
        {
            return Err(Error::InvalidRules(format!(
                "checksum index {bad} is outside the {DIGEST_HEX_LEN}-character digest"
            )));
        }
        if self.prefix.is_empty() {
            return Err(Error::InvalidRules("signature prefix is missing".into()));
        }
        if self.suffix.is_empty() {
            return Err(Error::InvalidRules("signature suffix is missing".into()));
        }
        Ok(())
    }
}

/// Split a `"prefix:{}:{:x}:suffix"` template into prefix and suffix.
fn split_format(format: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = format.split(':').collect();
    match parts.as_slice() {
        [prefix, .., suffix] if parts.len() >= 4 && !prefix.is_empty() && !suffix.is_empty() => {
            Some((prefix.to_string(), suffix.to_string()))
        }
        _ => None,
    }
}

/// Fetch and validate the rule document at `url`.
pub async fn fetch_rules(client: &reqwest::Client, url: &str) -> Result<SigningRuleSet> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Http(format!("rule request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Http(format!("rule source returned {status}: {body}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading rule document: {e}")))?;
    SigningRuleSet::from_document(&body, unix_now())
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
