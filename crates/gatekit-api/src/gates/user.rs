//! # User Lookup
//!
//! [`UserLookup`] resolves the bearer token in `Authorization` to its owner
//! and attaches it to the request context. It never aborts: a missing
//! token, an unknown token, or an unreachable service all leave the
//! context without a user and the request continues.

use axum::http::header::AUTHORIZATION;
use gatekit_remote_client::UserClient;

use crate::pipeline::{Flow, GateRequest, Stage};

/// Optional bearer-token owner lookup.
#[derive(Debug, Clone)]
pub struct UserLookup {
    users: Option<UserClient>,
}

impl UserLookup {
    /// Without a user client the stage is a pass-through.
    pub fn new(users: Option<UserClient>) -> Self {
        Self { users }
    }
}

fn bearer(header: Option<&str>) -> Option<&str> {
    header?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait::async_trait]
impl Stage for UserLookup {
    fn name(&self) -> &'static str {
        "user_lookup"
    }

    async fn run(&self, req: &mut GateRequest<'_>) -> Flow {
        let (Some(users), Some(token)) = (&self.users, bearer(req.header(AUTHORIZATION.as_str()))) else {
            return Flow::Continue;
        };
        let trace_id = req.context().trace_id().clone();

        match users.by_token(token, trace_id.as_str()).await {
            Ok(user) => {
                tracing::debug!(%trace_id, user_id = user.id, "bearer user attached");
                req.context_mut().set_user(user);
            }
            Err(e) => tracing::debug!(%trace_id, error = %e, "bearer user not resolved"),
        }
        Flow::Continue
    }
}
