//! Error types for signing and credential operations

/// Errors from rule fetching, credential loading and header assembly.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// waited on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("rule source unreachable: {0}")]
    Http(String),

    #[error("rule document unparsable: {0}")]
    RuleParse(String),

    #[error("invalid signing rules: {0}")]
    InvalidRules(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid header value for {0}")]
    Header(String),
}

impl Error {
    /// Whether this error came from fetching rules (as opposed to local input).
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::RuleParse(_) | Error::InvalidRules(_)
        )
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
