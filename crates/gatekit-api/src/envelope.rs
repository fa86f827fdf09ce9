//! Response envelopes returned by the resource dispatcher.
//!
//! | Operation | Success | Failure |
//! |-----------|---------|---------|
//! | list      | 200 `{data, error: null, total}` | 200 `{data: [], error, total: 0}` |
//! | get       | 200 `{data, error: null}` | error status, `{data: null, error}` |
//! | create/update | 200 `{data}` | 422 `{error}` |
//! | delete    | 200 `{message: "ok"}` | 404 `{message}` |

use serde::{Deserialize, Serialize};

/// `GET P/list` body. `data` is always a sequence, never `null`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListEnvelope<M> {
    pub data: Vec<M>,
    pub error: Option<String>,
    pub total: i64,
}

impl<M> ListEnvelope<M> {
    pub fn ok(data: Vec<M>, total: i64) -> Self {
        Self {
            data,
            error: None,
            total,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            error: Some(error.into()),
            total: 0,
        }
    }
}

/// `GET P/:id` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemEnvelope<M> {
    pub data: Option<M>,
    pub error: Option<String>,
}

impl<M> ItemEnvelope<M> {
    pub fn ok(data: M) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Successful `POST P` / `PUT P/:id` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataEnvelope<M> {
    pub data: M,
}

/// Failed `POST P` / `PUT P/:id` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}
