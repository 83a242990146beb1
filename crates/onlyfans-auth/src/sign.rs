//! Per-request signature computation
//!
//! Pure function over a rule snapshot: no I/O, no clock, no shared state.
//! The caller supplies the timestamp so the output can be checked against
//! fixed vectors.

use reqwest::Method;
use sha1::{Digest, Sha1};
use tracing::trace;

use crate::credentials::Credentials;
use crate::rules::SigningRuleSet;

/// The three signature-bearing header values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    /// `{prefix}:{digest_hex}:{checksum_hex}:{suffix}`
    pub sign: String,
    /// Epoch seconds, decimal
    pub time: String,
    pub app_token: String,
}

/// Compute the signature headers for one request.
///
/// `path` is the request path with leading slash. Anything from `?` onward
/// is ignored. The method does not enter the digest.
pub fn sign(
    rules: &SigningRuleSet,
    credentials: &Credentials,
    method: &Method,
    path: &str,
    timestamp: u64,
) -> SignatureHeaders {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let time = timestamp.to_string();

    let message = format!(
        "{}\n{}\n{}\n{}",
        rules.static_param,
        time,
        path,
        credentials.account_id()
    );
    let digest_hex = hex::encode(Sha1::digest(message.as_bytes()));

    let bytes = digest_hex.as_bytes();
    let sum: i64 = rules
        .checksum_indexes
        .iter()
        .filter_map(|i| bytes.get(*i))
        .map(|b| i64::from(*b))
        .sum();
    let checksum = sum + rules.checksum_constant;

    trace!(%method, path, version = %rules.version, "signed request");

    SignatureHeaders {
        sign: format!(
            "{}:{}:{:x}:{}",
            rules.prefix,
            digest_hex,
            checksum.unsigned_abs(),
            rules.suffix
        ),
        time,
        app_token: rules.app_token.clone(),
    }
}
