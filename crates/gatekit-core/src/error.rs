//! # Error Types
//!
//! Entity-level and query-level errors. Neither type knows about HTTP; the
//! API layer decides how each variant is rendered, using
//! [`ResourceError::status_code`] as the default mapping.

use thiserror::Error;

use crate::capability::Verb;

/// Errors returned by resource capabilities and by the storage collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The addressed record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation conflicts with the current state of the record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The payload could not be decoded or failed entity validation.
    #[error("{0}")]
    Unprocessable(String),

    /// The decoded payload does not support the verb being dispatched.
    #[error("decoded payload does not support {0}")]
    UnsupportedVerb(Verb),

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The client disconnected before a cancellable read completed.
    #[error("request cancelled by client")]
    Cancelled,
}

impl ResourceError {
    /// Default HTTP status for this error.
    ///
    /// `Cancelled` maps to the non-standard 499 used by proxies for
    /// "client closed request"; by the time it is produced nobody is
    /// listening for the response anyway.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unprocessable(_) | Self::UnsupportedVerb(_) => 422,
            Self::Storage(_) => 500,
            Self::Cancelled => 499,
        }
    }
}

/// Validation failures while decoding a [`ListQuery`](crate::ListQuery).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListQueryError {
    /// `limit` was absent or empty.
    #[error("limit is required")]
    MissingLimit,

    /// A numeric parameter could not be parsed.
    #[error("{field} must be an integer, got {value:?}")]
    InvalidNumber {
        /// The offending parameter name.
        field: &'static str,
        /// The raw value supplied by the caller.
        value: String,
    },

    /// `limit` was outside `1..=100`.
    #[error("limit must be between 1 and 100, got {0}")]
    LimitOutOfRange(i64),

    /// `offset` was negative.
    #[error("offset must not be negative, got {0}")]
    NegativeOffset(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_error_status_codes() {
        assert_eq!(ResourceError::NotFound("widget 1".into()).status_code(), 404);
        assert_eq!(ResourceError::Conflict("x".into()).status_code(), 409);
        assert_eq!(ResourceError::Unprocessable("x".into()).status_code(), 422);
        assert_eq!(ResourceError::UnsupportedVerb(Verb::Update).status_code(), 422);
        assert_eq!(ResourceError::Storage("x".into()).status_code(), 500);
        assert_eq!(ResourceError::Cancelled.status_code(), 499);
    }

    #[test]
    fn not_found_message_names_the_record() {
        let err = ResourceError::NotFound("widget 42".into());
        assert_eq!(err.to_string(), "widget 42 not found");
    }

    #[test]
    fn list_query_error_messages() {
        let err = ListQueryError::InvalidNumber {
            field: "limit",
            value: "ten".into(),
        };
        assert!(err.to_string().contains("limit"));
        assert!(err.to_string().contains("ten"));
        assert!(ListQueryError::LimitOutOfRange(101).to_string().contains("101"));
    }
}
