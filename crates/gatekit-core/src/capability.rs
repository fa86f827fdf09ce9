//! # Resource Capability Contract
//!
//! A type takes part in dispatch by implementing [`Resource`] plus any subset
//! of the five verb traits. The dispatcher only registers endpoints for the
//! verbs a resource implements, so an entity that cannot be deleted simply
//! has no `DELETE` route.
//!
//! ## Payload Decoding
//!
//! `Create` and `Update` share [`Resource::decode`]. A decoded payload is a
//! [`Decoded`] value carrying an explicit set of verbs it may be used for;
//! the dispatcher checks that set once before invoking the verb, and a
//! mismatch is a [`ResourceError::UnsupportedVerb`].

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::{PathParams, RequestContext};
use crate::error::ResourceError;
use crate::filter::FilterParam;
use crate::query::ListQuery;

/// Mutating verbs a decoded payload may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// `POST P`
    Create,
    /// `PUT P/:id`
    Update,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// A decoded payload tagged with the verbs it satisfies.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<M> {
    model: M,
    create: bool,
    update: bool,
}

impl<M> Decoded<M> {
    /// Usable for both create and update.
    pub fn any(model: M) -> Self {
        Self {
            model,
            create: true,
            update: true,
        }
    }

    /// Usable for exactly one verb.
    pub fn only(model: M, verb: Verb) -> Self {
        Self {
            model,
            create: verb == Verb::Create,
            update: verb == Verb::Update,
        }
    }

    /// Whether the payload may be used for `verb`.
    pub fn supports(&self, verb: Verb) -> bool {
        match verb {
            Verb::Create => self.create,
            Verb::Update => self.update,
        }
    }

    /// Unwrap the model for `verb`, or fail if the payload does not support it.
    pub fn into_model_for(self, verb: Verb) -> Result<M, ResourceError> {
        if self.supports(verb) {
            Ok(self.model)
        } else {
            Err(ResourceError::UnsupportedVerb(verb))
        }
    }
}

/// One page of list results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<M> {
    /// Rows of this page.
    pub items: Vec<M>,
    /// Number of rows matching the filters, ignoring pagination.
    pub total: i64,
}

impl<M> Page<M> {
    /// A page with no rows.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Base contract shared by every verb.
pub trait Resource: Send + Sync + 'static {
    /// The entity type exchanged with callers.
    type Model: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Human-readable entity name used in messages (`"widget"`).
    fn name(&self) -> &str;

    /// Storage predicates this resource adds to every list query.
    ///
    /// Defaults to none. Child resources use it to scope themselves to the
    /// parent id captured in the path.
    fn filter_params(&self, _params: &PathParams) -> Vec<FilterParam> {
        Vec::new()
    }

    /// Decode a request body into a model for `Create`/`Update`.
    ///
    /// The default decodes JSON and allows both verbs.
    fn decode(&self, body: &[u8], _params: &PathParams) -> Result<Decoded<Self::Model>, ResourceError> {
        serde_json::from_slice(body)
            .map(Decoded::any)
            .map_err(|e| ResourceError::Unprocessable(format!("invalid {} payload: {e}", self.name())))
    }
}

/// `GET P/list`
#[async_trait]
pub trait List: Resource {
    /// Return one page of rows matching `query` and `filters`.
    async fn list(
        &self,
        query: &ListQuery,
        ctx: &RequestContext,
        filters: &[FilterParam],
    ) -> Result<Page<Self::Model>, ResourceError>;
}

/// `GET P/:id`
#[async_trait]
pub trait Get: Resource {
    /// Fetch one row by id.
    async fn get(&self, id: &str, ctx: &RequestContext) -> Result<Self::Model, ResourceError>;
}

/// `POST P`
#[async_trait]
pub trait Create: Resource {
    /// Persist a new row and return it as stored.
    async fn create(&self, model: Self::Model, ctx: &RequestContext) -> Result<Self::Model, ResourceError>;
}

/// `PUT P/:id`
#[async_trait]
pub trait Update: Resource {
    /// Overwrite the row addressed by `id` and return it as stored.
    async fn update(
        &self,
        id: &str,
        model: Self::Model,
        ctx: &RequestContext,
    ) -> Result<Self::Model, ResourceError>;
}

/// `DELETE P/:id`
#[async_trait]
pub trait Delete: Resource {
    /// Remove the row addressed by `id`. `Ok(false)` means nothing was removed.
    async fn delete(&self, id: &str, ctx: &RequestContext) -> Result<bool, ResourceError>;
}
