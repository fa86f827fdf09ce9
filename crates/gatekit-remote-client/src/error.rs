//! Remote trust-service error types.

/// Errors from account-check and role-check calls.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// HTTP transport error (connect, timeout, TLS).
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The remote service answered with a non-200 status.
    #[error("{endpoint} returned {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// A 200 response whose body could not be decoded.
    #[error("failed to deserialize response from {endpoint} ({body_len} bytes): {source}")]
    Deserialization {
        endpoint: String,
        body_len: usize,
        source: serde_json::Error,
    },
    /// The request URL could not be built.
    #[error("invalid request URL for {endpoint}: {reason}")]
    InvalidUrl { endpoint: String, reason: String },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl RemoteError {
    /// Whether the failure happened before any verdict was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::InvalidUrl { .. })
    }
}
