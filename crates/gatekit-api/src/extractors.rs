//! Request extractors for routes placed behind a [`Pipeline`](crate::Pipeline).

use axum::http::request::Parts;
use gatekit_core::{Identity, RequestContext};

use crate::error::AppError;

/// The [`RequestContext`] built by the gate pipeline.
///
/// Returns 500 if no context is present: the route was mounted without
/// [`Pipeline::protect`](crate::Pipeline::protect).
#[derive(Debug, Clone)]
pub struct Ctx(pub RequestContext);

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Ctx {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Ctx)
            .ok_or_else(|| AppError::Internal("no request context: route is not gated".into()))
    }
}

/// The ambient identity attached by the authentication gate.
///
/// Returns 401 if the request passed the gates without one (topology
/// bypass, whitelist, or an unparseable account-check response).
#[derive(Debug, Clone)]
pub struct AmbientIdentity(pub Identity);

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for AmbientIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.identity().cloned())
            .map(AmbientIdentity)
            .ok_or_else(|| AppError::unauthorized("no caller identity in request context"))
    }
}
