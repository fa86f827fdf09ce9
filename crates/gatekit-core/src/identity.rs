//! # Ambient Identity and Trace Identifiers
//!
//! [`Identity`] is what the authentication gate learns from the remote
//! account-check service. [`User`] is the bearer-token owner looked up from
//! the user service. [`TraceId`] correlates one request across logs,
//! outbound remote calls, and storage.
//!
//! Both live only for the duration of a request; nothing here is persisted.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller identity attached after a successful remote verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Event the API account is bound to.
    #[serde(rename = "event_id")]
    pub event_id: i64,
    /// Role granted to the API account (e.g. `"admin"`).
    pub role: String,
}

impl Identity {
    /// Build an identity.
    pub fn new(event_id: i64, role: impl Into<String>) -> Self {
        Self {
            event_id,
            role: role.into(),
        }
    }

    /// Whether the identity carries exactly the given role.
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

/// Owner of a bearer token, as returned by the user service.
///
/// Only `id` is required; fields this crate does not know are kept in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: i64,
    /// Contact email, empty when the service omits it.
    #[serde(default)]
    pub email: String,
    /// Display name, empty when the service omits it.
    #[serde(default)]
    pub name: String,
    /// Remaining fields of the service's user object.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Per-request correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

impl TraceId {
    /// Longest inbound trace id that is accepted verbatim.
    pub const MAX_LEN: usize = 128;

    /// Generate a fresh random trace id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept an inbound `X-Trace-Id` value, or generate one when the value
    /// is absent, empty, too long, or contains non-printable characters.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v)
                if !v.is_empty()
                    && v.len() <= Self::MAX_LEN
                    && v.bytes().all(|b| b.is_ascii_graphic()) =>
            {
                Self(v.to_string())
            }
            _ => Self::generate(),
        }
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
