//! Full signed header set for one request

use reqwest::Method;
use reqwest::header::{ACCEPT as ACCEPT_HEADER, COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};

use crate::constants::{
    ACCEPT, APP_TOKEN_HEADER, BROWSER_CHECK_HEADER, SIGN_HEADER, TIME_HEADER, USER_ID_HEADER,
};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::rules::SigningRuleSet;
use crate::sign::sign;

/// Sign a request and assemble every header the platform expects.
///
/// The cookie and `x-bc` values are marked sensitive so they are hidden from
/// `HeaderMap`'s `Debug` output.
pub fn signed_headers(
    rules: &SigningRuleSet,
    credentials: &Credentials,
    method: &Method,
    path: &str,
    timestamp: u64,
) -> Result<HeaderMap> {
    let signature = sign(rules, credentials, method, path, timestamp);

    let mut headers = HeaderMap::with_capacity(8);
    headers.insert(ACCEPT_HEADER, HeaderValue::from_static(ACCEPT));
    headers.insert(USER_AGENT, value("user-agent", credentials.user_agent(), false)?);
    headers.insert(COOKIE, value("cookie", credentials.cookie(), true)?);
    headers.insert(
        HeaderName::from_static(BROWSER_CHECK_HEADER),
        value(BROWSER_CHECK_HEADER, credentials.browser_check_token(), true)?,
    );
    headers.insert(
        HeaderName::from_static(USER_ID_HEADER),
        value(USER_ID_HEADER, &credentials.account_id().to_string(), false)?,
    );
    headers.insert(
        HeaderName::from_static(APP_TOKEN_HEADER),
        value(APP_TOKEN_HEADER, &signature.app_token, false)?,
    );
    headers.insert(
        HeaderName::from_static(TIME_HEADER),
        value(TIME_HEADER, &signature.time, false)?,
    );
    headers.insert(
        HeaderName::from_static(SIGN_HEADER),
        value(SIGN_HEADER, &signature.sign, false)?,
    );
    Ok(headers)
}

fn value(name: &str, raw: &str, sensitive: bool) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(raw).map_err(|_| Error::Header(name.to_string()))?;
    value.set_sensitive(sensitive);
    Ok(value)
}
