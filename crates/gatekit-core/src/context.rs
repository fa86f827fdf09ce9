//! # Request Context
//!
//! State handed from the gate chain to entity logic.
//!
//! ## Two Lifetimes
//!
//! A request has two notions of "still alive":
//!
//! - **Transport**: the client connection. When the client goes away the
//!   [`disconnect_token`](RequestContext::disconnect_token) is cancelled.
//!   Storage reads may watch it and give up early.
//! - **Business**: the entity operation itself. The dispatcher runs it on a
//!   detached task, so a write accepted past the gate chain finishes even if
//!   the client disconnects mid-flight. Nothing in this type can cancel it.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::identity::{Identity, TraceId, User};

/// Per-request context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace_id: TraceId,
    identity: Option<Identity>,
    user: Option<User>,
    params: PathParams,
    disconnect: CancellationToken,
}

impl RequestContext {
    /// A context with the given trace id, no identity, and a fresh
    /// transport token.
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            identity: None,
            user: None,
            params: PathParams::new(),
            disconnect: CancellationToken::new(),
        }
    }

    /// Trace id propagated to logs and remote calls.
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Replace the trace id.
    pub fn set_trace_id(&mut self, trace_id: TraceId) {
        self.trace_id = trace_id;
    }

    /// Identity attached by the authentication gate, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Attach the caller identity.
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Bearer-token owner attached by the user lookup stage, if any.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Attach the bearer-token owner.
    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    /// Path parameters captured for the matched route. Empty outside a
    /// dispatcher endpoint.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Attach the captured path parameters.
    pub fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    /// Token cancelled when the inbound connection is abandoned.
    pub fn disconnect_token(&self) -> &CancellationToken {
        &self.disconnect
    }

    /// Whether the client has gone away.
    pub fn client_disconnected(&self) -> bool {
        self.disconnect.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(TraceId::generate())
    }
}

/// Named path parameters captured by the router (`:id`, `:widget_id`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(BTreeMap<String, String>);

impl PathParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The conventional `id` parameter.
    pub fn id(&self) -> Option<&str> {
        self.get("id")
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
