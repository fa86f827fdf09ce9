//! # Request/Response Tracing
//!
//! Configures `tower_http::trace::TraceLayer` so each request span carries
//! the inbound `X-Trace-Id`, when the caller sent one.

use axum::body::Body;
use axum::http::Request;
use gatekit_remote_client::TRACE_HEADER;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;

type MakeSpan = fn(&Request<Body>) -> tracing::Span;

/// Build the `TraceLayer` for the service.
pub fn layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, MakeSpan> {
    TraceLayer::new_for_http().make_span_with(request_span as MakeSpan)
}

fn request_span(request: &Request<Body>) -> tracing::Span {
    let trace_id = request
        .headers()
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        trace_id = %trace_id,
    )
}
