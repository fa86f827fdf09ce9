//! Typed client for the remote account-check (identity) service.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `{DNS_ACCOUNT}{ACCOUNT_CHECK_PATH}?ApiKey&Hash&Time&Origin` | Verify an API account |
//!
//! The hash is a keyed digest computed by the caller and verified by the
//! remote service. This client only relays the four values.

use gatekit_core::Identity;
use serde::Deserialize;
use url::Url;

use crate::error::RemoteError;
use crate::TRACE_HEADER;

/// Caller-supplied credentials, relayed verbatim to the account-check service.
#[derive(Clone, Default)]
pub struct AccountCredentials {
    pub api_key: String,
    pub hash: String,
    pub time: String,
    pub origin: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("api_key", &"[REDACTED]")
            .field("hash", &"[REDACTED]")
            .field("time", &self.time)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Body of a 200 account-check response.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountCheckResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub data: AccountData,
}

/// The `data` object of an account-check response.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountData {
    pub role: String,
    pub event_id: i64,
}

impl From<AccountData> for Identity {
    fn from(data: AccountData) -> Self {
        Identity::new(data.event_id, data.role)
    }
}

/// Client for the account-check endpoint.
#[derive(Debug, Clone)]
pub struct AccountClient {
    http: reqwest::Client,
    check_url: Url,
    max_retries: u32,
}

impl AccountClient {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: &Url,
        check_path: &str,
        max_retries: u32,
    ) -> Result<Self, RemoteError> {
        let joined = format!(
            "{}/{}",
            base_url.as_str().trim_end_matches('/'),
            check_path.trim_start_matches('/')
        );
        let check_url = Url::parse(&joined).map_err(|e| RemoteError::InvalidUrl {
            endpoint: "GET account check".into(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            http,
            check_url,
            max_retries,
        })
    }

    /// The fully-resolved account-check URL, without query.
    pub fn check_url(&self) -> &Url {
        &self.check_url
    }

    /// Verify the credentials.
    ///
    /// Returns the identity on a 200 with a well-formed body. A 200 with a
    /// body that does not parse is [`RemoteError::Deserialization`]; any
    /// other status is [`RemoteError::Rejected`].
    pub async fn check(
        &self,
        creds: &AccountCredentials,
        trace_id: &str,
    ) -> Result<Identity, RemoteError> {
        let endpoint = format!("GET {}", self.check_url.path());

        let mut url = self.check_url.clone();
        url.query_pairs_mut()
            .append_pair("ApiKey", &creds.api_key)
            .append_pair("Hash", &creds.hash)
            .append_pair("Time", &creds.time)
            .append_pair("Origin", &creds.origin);

        let resp = crate::retry::retry_send(self.max_retries, || {
            self.http
                .get(url.clone())
                .header(TRACE_HEADER, trace_id)
                .send()
        })
        .await
        .map_err(|e| RemoteError::Http {
            endpoint: endpoint.clone(),
            source: e,
        })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await.map_err(|e| RemoteError::Http {
            endpoint: endpoint.clone(),
            source: e,
        })?;
        let parsed: AccountCheckResponse =
            serde_json::from_slice(&body).map_err(|e| RemoteError::Deserialization {
                endpoint,
                body_len: body.len(),
                source: e,
            })?;

        Ok(parsed.data.into())
    }
}
