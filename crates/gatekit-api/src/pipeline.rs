//! # Gate Pipeline
//!
//! An ordered list of [`Stage`]s run against the request head before any
//! endpoint logic. Each stage either lets the request continue or aborts it
//! with a finished response; the first abort wins and no later stage, body
//! read, or entity call happens.
//!
//! Dispatcher endpoints run their pipeline directly. Hand-written routes
//! can be put behind the same pipeline with [`Pipeline::protect`], which
//! inserts the resulting [`RequestContext`] into the request extensions
//! (see [`crate::extractors::Ctx`]).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use gatekit_core::RequestContext;

use crate::gates::TraceStage;
use crate::middleware::metrics::ApiMetrics;

/// Outcome of one stage.
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next stage.
    Continue,
    /// Stop here and send this response.
    Abort(Response),
}

/// Read-only view of the request head plus the context being built.
#[derive(Debug)]
pub struct GateRequest<'a> {
    parts: &'a Parts,
    ctx: RequestContext,
}

impl<'a> GateRequest<'a> {
    pub fn new(parts: &'a Parts) -> Self {
        Self {
            parts,
            ctx: RequestContext::default(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// A header value, if present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Transport peer address, when the server was started with connect info.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.ctx
    }

    pub fn into_context(self) -> RequestContext {
        self.ctx
    }
}

/// One gate in the pipeline.
#[async_trait::async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Short name used in logs and the gate-rejection metric.
    fn name(&self) -> &'static str;

    async fn run(&self, req: &mut GateRequest<'_>) -> Flow;
}

/// Ordered, cheaply clonable list of stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    metrics: Option<ApiMetrics>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.names())
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append an already shared stage.
    pub fn push(&mut self, stage: Arc<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Count gate rejections in the given metrics registry.
    pub fn with_metrics(mut self, metrics: ApiMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Put a [`TraceStage`] first unless the pipeline already starts with one.
    pub fn traced(mut self) -> Self {
        let leading = self.stages.first().map(|s| s.name());
        if leading != Some(TraceStage.name()) {
            self.stages.insert(0, Arc::new(TraceStage));
        }
        self
    }

    /// Stage names in run order.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order against the request head.
    ///
    /// Returns the populated context, or the response of the first stage
    /// that aborted.
    pub async fn run(&self, parts: &Parts) -> Result<RequestContext, Response> {
        let mut req = GateRequest::new(parts);
        for stage in &self.stages {
            if let Flow::Abort(response) = stage.run(&mut req).await {
                tracing::debug!(
                    gate = stage.name(),
                    trace_id = %req.context().trace_id(),
                    status = response.status().as_u16(),
                    "request aborted by gate"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_gate_rejection(stage.name());
                }
                return Err(response);
            }
        }
        Ok(req.into_context())
    }

    /// Put every route of `router` behind this pipeline, adopting the
    /// inbound trace id first.
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(from_fn_with_state(self.clone().traced(), pipeline_middleware))
    }
}

/// Axum middleware form of [`Pipeline::run`].
pub async fn pipeline_middleware(
    State(pipeline): State<Pipeline>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    match pipeline.run(&parts).await {
        Ok(ctx) => {
            let _disconnect = ctx.disconnect_token().clone().drop_guard();
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(response) => response,
    }
}
