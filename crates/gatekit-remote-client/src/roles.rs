//! Typed client for the remote role-check (authorization) service.
//!
//! `GET {DNS_USERS}/user/can/{token}/{role}` answers 200 when the bearer of
//! `token` holds `role`. Any other status is a denial.

use url::Url;

use crate::error::RemoteError;
use crate::TRACE_HEADER;

/// Client for the role-check endpoint.
#[derive(Debug, Clone)]
pub struct RoleClient {
    http: reqwest::Client,
    base_url: Url,
    max_retries: u32,
}

impl RoleClient {
    pub(crate) fn new(http: reqwest::Client, base_url: Url, max_retries: u32) -> Self {
        Self {
            http,
            base_url,
            max_retries,
        }
    }

    /// Build the role-check URL. Token and role are percent-encoded as
    /// single path segments.
    pub fn can_url(&self, token: &str, role: &str) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl {
                endpoint: "GET /user/can".into(),
                reason: format!("{} cannot be a base URL", self.base_url),
            })?
            .pop_if_empty()
            .extend(["user", "can", token, role]);
        Ok(url)
    }

    /// Ask whether the bearer of `token` holds `role`.
    ///
    /// `Ok(())` only on a 200 response.
    pub async fn can(&self, token: &str, role: &str, trace_id: &str) -> Result<(), RemoteError> {
        let endpoint = format!("GET /user/can/{{token}}/{role}");
        let url = self.can_url(token, role)?;

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

        if resp.status() != reqwest::StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                endpoint,
                status,
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> RoleClient {
        RoleClient::new(reqwest::Client::new(), Url::parse(base).unwrap(), 0)
    }

    #[test]
    fn can_url_appends_segments() {
        let url = client("http://users.local:9000").can_url("abc", "admin").unwrap();
        assert_eq!(url.as_str(), "http://users.local:9000/user/can/abc/admin");
    }

    #[test]
    fn can_url_keeps_base_path() {
        let url = client("http://gateway.local/users/").can_url("abc", "admin").unwrap();
        assert_eq!(url.as_str(), "http://gateway.local/users/user/can/abc/admin");
    }

    #[test]
    fn can_url_escapes_slashes_in_token() {
        let url = client("http://users.local").can_url("a/b c", "admin").unwrap();
        assert_eq!(url.as_str(), "http://users.local/user/can/a%2Fb%20c/admin");
    }
}
