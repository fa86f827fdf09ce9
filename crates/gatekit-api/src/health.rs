//! # Probes
//!
//! Kubernetes-style `/healthz` and `/readyz`, plus the Prometheus scrape
//! endpoint. All three are on the built-in whitelist, so they are answered
//! without credentials.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::middleware::metrics::ApiMetrics;

/// A dependency checked by `/healthz`.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// `Err` carries a short diagnostic returned in the 503 body.
    async fn check(&self) -> Result<(), String>;
}

/// Shared readiness flag flipped by [`Server`](crate::server::Server).
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }
}

#[derive(Clone)]
struct ProbeState {
    probes: Arc<[Arc<dyn HealthProbe>]>,
    readiness: Readiness,
    metrics: ApiMetrics,
}

/// Router serving `/healthz`, `/readyz` and `/metrics`.
pub fn router(
    probes: Vec<Arc<dyn HealthProbe>>,
    readiness: Readiness,
    metrics: ApiMetrics,
) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(prometheus_metrics))
        .with_state(ProbeState {
            probes: probes.into(),
            readiness,
            metrics,
        })
}

/// 200 while every registered probe passes.
async fn healthz(State(state): State<ProbeState>) -> Response {
    for probe in state.probes.iter() {
        if let Err(reason) = probe.check().await {
            tracing::warn!(probe = probe.name(), %reason, "health probe failed");
            return AppError::ServiceUnavailable(format!("{}: {reason}", probe.name()))
                .into_response();
        }
    }
    (StatusCode::OK, "ok").into_response()
}

async fn readyz(State(state): State<ProbeState>) -> Response {
    if state.readiness.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        AppError::ServiceUnavailable("not ready".to_string()).into_response()
    }
}

async fn prometheus_metrics(State(state): State<ProbeState>) -> Response {
    match state.metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => AppError::Internal(e).into_response(),
    }
}
