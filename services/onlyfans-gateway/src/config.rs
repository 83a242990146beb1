//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Every section is optional; an empty file yields a working configuration
//! that reads `auth.json` from the working directory.
//!
//! Session secrets never live in the TOML. `credentials_path` points at the
//! `auth.json` export and `OF_AUTH_PATH` overrides it.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use onlyfans_auth::{BASE_URL, DEFAULT_RULES_URL};
use onlyfans_session::{MIN_REFILL_PER_SEC, RateLimitConfig, RetryPolicy, SessionConfig};

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub platform: PlatformConfig,
    pub rate_limit: RateLimitSection,
    pub retry: RetrySection,
    pub pagination: PaginationSection,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

/// Platform endpoints and session material
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    pub rules_url: String,
    /// Pinned rule document; when set, `rules_url` is not used
    pub rules_file: Option<PathBuf>,
    pub credentials_path: PathBuf,
    pub timeout_secs: u64,
    /// Background rule refresh period; 0 disables it
    pub rules_refresh_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub rate_limit_retries: u32,
    pub transient_retries: u32,
    pub signature_refresh_retries: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PaginationSection {
    pub max_pages: u32,
    /// Default `limit` of listing routes
    pub page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 256,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            rules_url: DEFAULT_RULES_URL.to_string(),
            rules_file: None,
            credentials_path: PathBuf::from("auth.json"),
            timeout_secs: 20,
            rules_refresh_secs: 1800,
        }
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            capacity: defaults.capacity,
            refill_per_sec: defaults.refill_per_sec,
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            rate_limit_retries: defaults.rate_limit_retries,
            transient_retries: defaults.transient_retries,
            signature_refresh_retries: defaults.signature_refresh_retries,
        }
    }
}

impl Default for PaginationSection {
    fn default() -> Self {
        Self {
            max_pages: 500,
            page_size: onlyfans_session::resources::DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(auth_path) = std::env::var("OF_AUTH_PATH") {
            config.platform.credentials_path = PathBuf::from(auth_path);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        for (field, url) in [
            ("platform.base_url", &self.platform.base_url),
            ("platform.rules_url", &self.platform.rules_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::invalid(
                    field,
                    format!("must start with http:// or https://, got: {url}"),
                ));
            }
        }
        if self.platform.timeout_secs == 0 {
            return Err(common::Error::invalid(
                "platform.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::invalid(
                "server.max_connections",
                "must be greater than 0",
            ));
        }
        if self.rate_limit.capacity == 0 {
            return Err(common::Error::invalid(
                "rate_limit.capacity",
                "must be greater than 0",
            ));
        }
        let refill = self.rate_limit.refill_per_sec;
        if !(refill.is_finite() && refill >= MIN_REFILL_PER_SEC) {
            return Err(common::Error::invalid(
                "rate_limit.refill_per_sec",
                format!("must be at least {MIN_REFILL_PER_SEC}, got {refill}"),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(common::Error::invalid(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.pagination.max_pages == 0 {
            return Err(common::Error::invalid(
                "pagination.max_pages",
                "must be greater than 0",
            ));
        }
        if !(1..=100).contains(&self.pagination.page_size) {
            return Err(common::Error::invalid(
                "pagination.page_size",
                format!("must be between 1 and 100, got {}", self.pagination.page_size),
            ));
        }
        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            base_url: self.platform.base_url.clone(),
            request_timeout: Duration::from_secs(self.platform.timeout_secs),
            rate_limit: RateLimitConfig {
                capacity: self.rate_limit.capacity,
                refill_per_sec: self.rate_limit.refill_per_sec,
            },
            retry: RetryPolicy {
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                rate_limit_retries: self.retry.rate_limit_retries,
                transient_retries: self.retry.transient_retries,
                signature_refresh_retries: self.retry.signature_refresh_retries,
            },
            max_pages: self.pagination.max_pages,
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("onlyfans-gateway.toml")
    }
}
