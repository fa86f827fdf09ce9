//! # Middleware Stack
//!
//! Tower middleware wrapped around the whole router:
//! - [`tracing_layer`]: request spans with `TraceLayer`, tagged with the trace id.
//! - [`metrics`]: Prometheus request metrics.
//! - [`cors`]: permissive CORS answered before any gate.

pub mod cors;
pub mod metrics;
pub mod tracing_layer;
