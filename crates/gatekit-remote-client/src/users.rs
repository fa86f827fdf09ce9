//! Typed client for the remote user lookup.
//!
//! `GET {DNS_USER}/user/byToken/{token}` returns the user owning a bearer
//! token. Only a 200 with a decodable user counts as found.

use gatekit_core::User;
use url::Url;

use crate::error::RemoteError;
use crate::TRACE_HEADER;

/// Client for the by-token user lookup.
#[derive(Debug, Clone)]
pub struct UserClient {
    http: reqwest::Client,
    base_url: Url,
    max_retries: u32,
}

impl UserClient {
    pub(crate) fn new(http: reqwest::Client, base_url: Url, max_retries: u32) -> Self {
        Self {
            http,
            base_url,
            max_retries,
        }
    }

    /// Build the lookup URL. The token is percent-encoded as one segment.
    pub fn by_token_url(&self, token: &str) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl {
                endpoint: "GET /user/byToken".into(),
                reason: format!("{} cannot be a base URL", self.base_url),
            })?
            .pop_if_empty()
            .extend(["user", "byToken", token]);
        Ok(url)
    }

    /// Look up the owner of `token`.
    pub async fn by_token(&self, token: &str, trace_id: &str) -> Result<User, RemoteError> {
        let endpoint = "GET /user/byToken/{token}".to_string();
        let url = self.by_token_url(token)?;

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
        serde_json::from_slice(&body).map_err(|e| RemoteError::Deserialization {
            endpoint,
            body_len: body.len(),
            source: e,
        })
    }
}
