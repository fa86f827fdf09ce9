//! Remote trust-service configuration.
//!
//! Both services are optional at this layer: a missing base URL yields no
//! client, and the gate that needs it runs in deny mode.

use url::Url;

/// Default path of the account-check endpoint.
pub const DEFAULT_ACCOUNT_CHECK_PATH: &str = "/accountcheck";

/// Configuration for the account-check and role-check services.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the identity service (`DNS_ACCOUNT`).
    pub account_url: Option<Url>,
    /// Path of the account-check endpoint below `account_url`.
    pub account_check_path: String,
    /// Base URL of the role service (`DNS_USERS`).
    pub users_url: Option<Url>,
    /// Base URL of the user lookup service (`DNS_USER`). Falls back to
    /// `users_url` when unset.
    pub user_url: Option<Url>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt, on transport errors only.
    pub max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            account_url: None,
            account_check_path: DEFAULT_ACCOUNT_CHECK_PATH.to_string(),
            users_url: None,
            user_url: None,
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

impl RemoteConfig {
    /// Base URL used for user lookups.
    pub fn user_lookup_url(&self) -> Option<&Url> {
        self.user_url.as_ref().or(self.users_url.as_ref())
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DNS_ACCOUNT` (optional): identity service base URL
    /// - `ACCOUNT_CHECK_PATH` (default: `/accountcheck`)
    /// - `DNS_USERS` (optional): role service base URL
    /// - `DNS_USER` (optional): user lookup base URL, defaults to `DNS_USERS`
    /// - `REMOTE_TIMEOUT_SECS` (default: 10)
    /// - `REMOTE_MAX_RETRIES` (default: 2)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            account_url: env_url("DNS_ACCOUNT")?,
            account_check_path: std::env::var("ACCOUNT_CHECK_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.account_check_path),
            users_url: env_url("DNS_USERS")?,
            user_url: env_url("DNS_USER")?,
            timeout_secs: env_number("REMOTE_TIMEOUT_SECS", defaults.timeout_secs)?,
            max_retries: env_number("REMOTE_MAX_RETRIES", defaults.max_retries)?,
        })
    }

    /// Configuration pointing every service at one local base URL (for testing).
    pub fn local(base: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(base)
            .map_err(|e| ConfigError::InvalidUrl("local".to_string(), e.to_string()))?;
        Ok(Self {
            account_url: Some(url.clone()),
            users_url: Some(url),
            timeout_secs: 5,
            max_retries: 0,
            ..Self::default()
        })
    }
}

fn env_url(var: &str) -> Result<Option<Url>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => Url::parse(raw.trim())
            .map(Some)
            .map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string())),
        _ => Ok(None),
    }
}

fn env_number<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(var.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid number for {0}: {1:?}")]
    InvalidNumber(String, String),
}
