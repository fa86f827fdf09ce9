//! # Authorization Gates
//!
//! - [`RoleGate`] asks the remote role service whether the bearer token in
//!   `Authorization` holds a role.
//! - [`AmbientRoleGate`] checks the role of the identity the authentication
//!   gate attached. No remote call.
//!
//! Both abort with 401.

use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use gatekit_remote_client::{RemoteError, RoleClient};

use crate::error::AppError;
use crate::pipeline::{Flow, GateRequest, Stage};

fn reject(message: &str) -> Flow {
    Flow::Abort(AppError::unauthorized(message).into_response())
}

/// Remote role check for a bearer token.
#[derive(Debug, Clone)]
pub struct RoleGate {
    roles: Option<RoleClient>,
    role: String,
}

impl RoleGate {
    /// Without a role client every request is denied.
    pub fn new(roles: Option<RoleClient>, role: impl Into<String>) -> Self {
        Self {
            roles,
            role: role.into(),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

/// The token after `Bearer `, trimmed. `Err` carries the rejection message.
fn bearer_token(header: Option<&str>) -> Result<&str, &'static str> {
    let header = header.ok_or("Missed Authorization header")?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or("Missed Bearer token")?;
    if token.is_empty() {
        return Err("Missed Bearer token");
    }
    Ok(token)
}

#[async_trait::async_trait]
impl Stage for RoleGate {
    fn name(&self) -> &'static str {
        "role"
    }

    async fn run(&self, req: &mut GateRequest<'_>) -> Flow {
        let trace_id = req.context().trace_id().clone();

        let token = match bearer_token(req.header(AUTHORIZATION.as_str())) {
            Ok(token) => token,
            Err(reason) => {
                tracing::warn!(%trace_id, path = req.path(), reason, "authorization rejected");
                return reject(reason);
            }
        };

        let Some(roles) = &self.roles else {
            tracing::warn!(%trace_id, role = %self.role, reason = "no role service", "authorization rejected");
            return reject("Cant check user permissions");
        };

        match roles.can(token, &self.role, trace_id.as_str()).await {
            Ok(()) => Flow::Continue,
            Err(RemoteError::Rejected { status, .. }) => {
                tracing::warn!(%trace_id, role = %self.role, status, reason = "role refused", "authorization rejected");
                reject("Permission denied")
            }
            Err(e) => {
                tracing::warn!(%trace_id, role = %self.role, error = %e, reason = "role service unreachable", "authorization rejected");
                reject("Cant check user permissions")
            }
        }
    }
}

/// Requires the ambient identity to carry a role.
#[derive(Debug, Clone)]
pub struct AmbientRoleGate {
    role: String,
}

impl AmbientRoleGate {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }

    /// The original admin-only check.
    pub fn admin() -> Self {
        Self::new("admin")
    }
}

#[async_trait::async_trait]
impl Stage for AmbientRoleGate {
    fn name(&self) -> &'static str {
        "ambient_role"
    }

    async fn run(&self, req: &mut GateRequest<'_>) -> Flow {
        match req.context().identity() {
            Some(identity) if identity.has_role(&self.role) => Flow::Continue,
            other => {
                tracing::warn!(
                    trace_id = %req.context().trace_id(),
                    required = %self.role,
                    actual = other.map(|i| i.role.as_str()).unwrap_or("none"),
                    "ambient role rejected"
                );
                reject(&format!("{} only method", self.role))
            }
        }
    }
}
