//! # gatekit-remote-client
//!
//! Typed access to the remote trust services the gatekit gates consult:
//! - **Account check** (`DNS_ACCOUNT`) turns relayed API-key credentials into
//!   an [`Identity`](gatekit_core::Identity).
//! - **Role check** (`DNS_USERS`) answers whether a bearer token holds a role.
//! - **User lookup** (`DNS_USER`) resolves a bearer token to its owner.
//!
//! Every outbound call carries the request's `X-Trace-Id` and a bounded
//! timeout. Transport errors are retried; verdicts never are.

pub mod account;
pub mod config;
pub mod error;
pub(crate) mod retry;
pub mod roles;
pub mod users;

pub use account::{AccountClient, AccountCredentials};
pub use config::RemoteConfig;
pub use error::RemoteError;
pub use roles::RoleClient;
pub use users::UserClient;

use std::time::Duration;

/// Header carrying the per-request trace id on inbound and outbound calls.
pub const TRACE_HEADER: &str = "X-Trace-Id";

/// Top-level remote client. A service without a configured base URL has no
/// sub-client.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    account: Option<AccountClient>,
    roles: Option<RoleClient>,
    users: Option<UserClient>,
}

impl RemoteClient {
    /// Create the client from configuration.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        let account = config
            .account_url
            .as_ref()
            .map(|base| {
                AccountClient::new(
                    http.clone(),
                    base,
                    &config.account_check_path,
                    config.max_retries,
                )
            })
            .transpose()?;
        let users = config
            .user_lookup_url()
            .cloned()
            .map(|base| UserClient::new(http.clone(), base, config.max_retries));
        let roles = config
            .users_url
            .map(|base| RoleClient::new(http, base, config.max_retries));

        Ok(Self {
            account,
            roles,
            users,
        })
    }

    /// The account-check client, if `DNS_ACCOUNT` is configured.
    pub fn account(&self) -> Option<&AccountClient> {
        self.account.as_ref()
    }

    /// The role-check client, if `DNS_USERS` is configured.
    pub fn roles(&self) -> Option<&RoleClient> {
        self.roles.as_ref()
    }

    /// The user lookup client, if `DNS_USER` or `DNS_USERS` is configured.
    pub fn users(&self) -> Option<&UserClient> {
        self.users.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_services_have_no_client() {
        let client = RemoteClient::new(RemoteConfig::default()).unwrap();
        assert!(client.account().is_none());
        assert!(client.roles().is_none());
        assert!(client.users().is_none());
    }

    #[test]
    fn local_config_builds_every_client() {
        let client = RemoteClient::new(RemoteConfig::local("http://127.0.0.1:9").unwrap()).unwrap();
        assert!(client.account().is_some());
        assert!(client.roles().is_some());
        assert!(client.users().is_some());
    }
}
