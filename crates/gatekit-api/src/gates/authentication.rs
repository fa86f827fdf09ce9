//! # Authentication Gate
//!
//! Decides, per request, in this order:
//!
//! 1. **Topology bypass**: a caller in the same block as a local network
//!    is trusted outright.
//! 2. **Whitelist**: public paths pass without credentials.
//! 3. **Remote verification**: `ApiKey`, `Hash`, `Time` and `Origin` are
//!    relayed to the account-check service. A 200 attaches the returned
//!    identity; anything else aborts with 401.
//!
//! A 200 whose body does not parse lets the request through without an
//! identity. Role-sensitive routes must add an
//! [`AmbientRoleGate`](super::AmbientRoleGate) to close that gap.

use std::net::IpAddr;

use axum::response::IntoResponse;
use gatekit_remote_client::{AccountClient, AccountCredentials, RemoteError};

use super::network::{resolve_client_ip, LocalNetworks};
use super::whitelist::Whitelist;
use crate::error::AppError;
use crate::pipeline::{Flow, GateRequest, Stage};

/// Request headers relayed to the account-check service.
pub const API_KEY_HEADER: &str = "ApiKey";
pub const HASH_HEADER: &str = "Hash";
pub const TIME_HEADER: &str = "Time";
pub const ORIGIN_HEADER: &str = "Origin";

/// The authentication stage.
#[derive(Debug, Clone)]
pub struct AuthenticationGate {
    account: Option<AccountClient>,
    whitelist: Whitelist,
    local: LocalNetworks,
    trust_forwarded_for: bool,
}

impl AuthenticationGate {
    /// Without an account client the gate runs in deny mode: only bypassed
    /// and whitelisted requests get through.
    pub fn new(
        account: Option<AccountClient>,
        whitelist: Whitelist,
        local: LocalNetworks,
        trust_forwarded_for: bool,
    ) -> Self {
        if account.is_none() {
            tracing::warn!("no account-check service configured, authentication gate denies all credentialed requests");
        }
        Self {
            account,
            whitelist,
            local,
            trust_forwarded_for,
        }
    }

    /// Forwarding headers count only when the transport peer is a trusted
    /// proxy. Without a peer address nothing is trusted.
    fn bypassed(&self, req: &GateRequest<'_>) -> Option<IpAddr> {
        let peer = req.peer_addr().map(|a| a.ip());
        let trust = self.trust_forwarded_for && peer.is_some_and(|p| self.local.trusts_proxy(p));
        resolve_client_ip(req.headers(), peer, trust).filter(|ip| self.local.admits(*ip))
    }

    fn credentials(req: &GateRequest<'_>) -> AccountCredentials {
        let value = |name| req.header(name).unwrap_or_default().to_string();
        AccountCredentials {
            api_key: value(API_KEY_HEADER),
            hash: value(HASH_HEADER),
            time: value(TIME_HEADER),
            origin: value(ORIGIN_HEADER),
        }
    }
}

fn reject(message: &str) -> Flow {
    Flow::Abort(AppError::unauthorized(message).into_response())
}

#[async_trait::async_trait]
impl Stage for AuthenticationGate {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn run(&self, req: &mut GateRequest<'_>) -> Flow {
        if let Some(ip) = self.bypassed(req) {
            tracing::debug!(client_ip = %ip, path = req.path(), "same-subnet caller, credential check skipped");
            return Flow::Continue;
        }

        if self.whitelist.is_public(req.path()) {
            return Flow::Continue;
        }

        let trace_id = req.context().trace_id().clone();
        let Some(account) = &self.account else {
            tracing::warn!(%trace_id, path = req.path(), reason = "no account-check service", "authentication rejected");
            return reject("Cant check api account");
        };

        let creds = Self::credentials(req);
        match account.check(&creds, trace_id.as_str()).await {
            Ok(identity) => {
                tracing::debug!(%trace_id, role = %identity.role, event_id = identity.event_id, "api account verified");
                req.context_mut().set_identity(identity);
                Flow::Continue
            }
            Err(RemoteError::Deserialization { body_len, .. }) => {
                tracing::warn!(%trace_id, body_len, "can not parse account-check response, continuing without identity");
                Flow::Continue
            }
            Err(RemoteError::Rejected { status, .. }) => {
                tracing::warn!(%trace_id, path = req.path(), status, reason = "account check refused", "authentication rejected");
                reject("Invalid api account")
            }
            Err(e) => {
                tracing::warn!(%trace_id, path = req.path(), error = %e, reason = "account check unreachable", "authentication rejected");
                reject("Cant check api account")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use gatekit_core::Identity;
    use gatekit_remote_client::{RemoteClient, RemoteConfig};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::pipeline::Pipeline;

    fn account_client(base: &str) -> AccountClient {
        RemoteClient::new(RemoteConfig::local(base).unwrap())
            .unwrap()
            .account()
            .cloned()
            .unwrap()
    }

    fn gate(account: Option<AccountClient>) -> Pipeline {
        Pipeline::new().stage(AuthenticationGate::new(
            account,
            Whitelist::new(["^/public/"]).unwrap(),
            LocalNetworks::from_cidrs(&["10.99.0.1"]).unwrap(),
            true,
        ))
    }

    fn request(uri: &str) -> axum::http::request::Builder {
        Request::builder().uri(uri)
    }

    async fn run(pipeline: &Pipeline, req: Request<Body>) -> Result<gatekit_core::RequestContext, StatusCode> {
        let (parts, _) = req.into_parts();
        pipeline.run(&parts).await.map_err(|r| r.status())
    }

    fn from_peer(mut req: Request<Body>, peer: [u8; 4]) -> Request<Body> {
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        req
    }

    #[tokio::test]
    async fn same_subnet_peer_bypasses_without_credentials() {
        let pipeline = gate(None);
        let req = from_peer(request("/widgets/list").body(Body::empty()).unwrap(), [10, 99, 0, 77]);
        let ctx = run(&pipeline, req).await.unwrap();
        assert!(ctx.identity().is_none());
    }

    #[tokio::test]
    async fn local_proxy_can_forward_same_subnet_caller() {
        let pipeline = gate(None);
        let req = request("/widgets/list")
            .header("X-Real-IP", "10.99.0.77")
            .body(Body::empty())
            .unwrap();
        assert!(run(&pipeline, from_peer(req, [127, 0, 0, 1])).await.is_ok());
    }

    #[tokio::test]
    async fn forwarding_headers_without_peer_are_ignored() {
        let pipeline = gate(None);
        let req = request("/widgets/list")
            .header("X-Forwarded-For", "10.99.0.77")
            .body(Body::empty())
            .unwrap();
        assert_eq!(run(&pipeline, req).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forwarding_headers_from_remote_peer_are_ignored() {
        let pipeline = gate(None);
        let req = request("/widgets/list")
            .header("X-Forwarded-For", "10.99.0.77")
            .body(Body::empty())
            .unwrap();
        let req = from_peer(req, [203, 0, 113, 9]);
        assert_eq!(run(&pipeline, req).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn local_proxy_forwarding_remote_caller_is_not_bypassed() {
        let pipeline = gate(None);
        let req = request("/widgets/list")
            .header("X-Forwarded-For", "203.0.113.5")
            .body(Body::empty())
            .unwrap();
        let req = from_peer(req, [10, 99, 0, 2]);
        assert_eq!(run(&pipeline, req).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forwarding_disabled_uses_peer_only() {
        let pipeline = Pipeline::new().stage(AuthenticationGate::new(
            None,
            Whitelist::builtin().unwrap(),
            LocalNetworks::from_cidrs(&["10.99.0.1"]).unwrap(),
            false,
        ));
        let req = request("/widgets/list")
            .header("X-Real-IP", "10.99.0.77")
            .body(Body::empty())
            .unwrap();
        let req = from_peer(req, [127, 0, 0, 1]);
        assert_eq!(run(&pipeline, req).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn other_subnet_without_service_is_denied() {
        let pipeline = gate(None);
        let req = from_peer(request("/widgets/list").body(Body::empty()).unwrap(), [10, 98, 0, 77]);
        assert_eq!(run(&pipeline, req).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn whitelisted_paths_skip_credentials() {
        let pipeline = gate(None);
        for uri in ["/healthz", "/readyz", "/metrics", "/public/terms"] {
            let req = request(uri).body(Body::empty()).unwrap();
            assert!(run(&pipeline, req).await.is_ok(), "{uri} must be public");
        }
    }

    #[tokio::test]
    async fn verified_account_attaches_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accountcheck"))
            .and(query_param("ApiKey", "k1"))
            .and(query_param("Hash", "h1"))
            .and(query_param("Time", "1700000000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"role": "admin", "event_id": 12}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = gate(Some(account_client(&server.uri())));
        let req = request("/widgets/list")
            .header("ApiKey", "k1")
            .header("Hash", "h1")
            .header("Time", "1700000000")
            .body(Body::empty())
            .unwrap();
        let ctx = run(&pipeline, req).await.unwrap();
        assert_eq!(ctx.identity(), Some(&Identity::new(12, "admin")));
    }

    #[tokio::test]
    async fn refused_account_is_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accountcheck"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = gate(Some(account_client(&server.uri())));
        let req = request("/widgets/list").body(Body::empty()).unwrap();
        assert_eq!(run(&pipeline, req).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unreachable_account_service_is_401() {
        let pipeline = gate(Some(account_client("http://127.0.0.1:1")));
        let req = request("/widgets/list").body(Body::empty()).unwrap();
        assert_eq!(run(&pipeline, req).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unparseable_account_response_continues_without_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accountcheck"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let pipeline = gate(Some(account_client(&server.uri())));
        let req = request("/widgets/list").body(Body::empty()).unwrap();
        let ctx = run(&pipeline, req).await.unwrap();
        assert!(ctx.identity().is_none());
    }

    #[tokio::test]
    async fn bypass_skips_remote_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let pipeline = gate(Some(account_client(&server.uri())));
        let req = request("/widgets/list")
            .header("X-Forwarded-For", "10.99.0.3")
            .body(Body::empty())
            .unwrap();
        assert!(run(&pipeline, from_peer(req, [127, 0, 0, 1])).await.is_ok());
    }
}
