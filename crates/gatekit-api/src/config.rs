//! # Service Configuration
//!
//! Everything the service reads from its environment, validated once at
//! startup. The remote trust-service settings are delegated to
//! [`RemoteConfig`].

use std::net::SocketAddr;

use gatekit_remote_client::config::ConfigError as RemoteConfigError;
use gatekit_remote_client::RemoteConfig;

use crate::gates::network::{LocalNetworks, SubnetParseError};

/// Default listen address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the server binds to (`HTTP_ADDR`).
    pub http_addr: SocketAddr,
    /// Remote account-check and role-check services.
    pub remote: RemoteConfig,
    /// Extra whitelist patterns (`PUBLIC_ROUTES`), added to the built-in ones.
    pub public_routes: Vec<String>,
    /// Honour `X-Forwarded-For` / `X-Real-IP` when resolving the caller.
    /// Only applied to requests whose transport peer is loopback or inside
    /// a local network.
    pub trust_forwarded_for: bool,
    /// Explicit local networks (`LOCAL_NETWORKS`). `None` means interface
    /// discovery at startup.
    pub local_networks: Option<LocalNetworks>,
    /// Resolve bearer tokens to their owner on gated requests (`USER_LOOKUP`).
    pub user_lookup: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            remote: RemoteConfig::default(),
            public_routes: Vec::new(),
            trust_forwarded_for: false,
            local_networks: None,
            user_lookup: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// See [`RemoteConfig::from_env`] for the remote-service variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr_raw =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = http_addr_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(http_addr_raw.clone()))?;

        let public_routes = std::env::var("PUBLIC_ROUTES")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        let trust_forwarded_for = env_bool("TRUST_FORWARDED_FOR")?;
        let user_lookup = env_bool("USER_LOOKUP")?;

        let local_networks = match std::env::var("LOCAL_NETWORKS") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(LocalNetworks::from_cidrs(&split_list(&raw))?)
            }
            _ => None,
        };

        Ok(Self {
            http_addr,
            remote: RemoteConfig::from_env()?,
            public_routes,
            trust_forwarded_for,
            local_networks,
            user_lookup,
        })
    }
}

/// An unset variable is `false`.
fn env_bool(var: &'static str) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidBool { var, value: raw }),
        Err(_) => Ok(false),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid HTTP_ADDR: {0:?}")]
    InvalidAddr(String),
    #[error("invalid boolean for {var}: {value:?}")]
    InvalidBool { var: &'static str, value: String },
    #[error("invalid LOCAL_NETWORKS: {0}")]
    LocalNetworks(#[from] SubnetParseError),
    #[error(transparent)]
    Remote(#[from] RemoteConfigError),
}
