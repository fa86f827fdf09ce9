//! First stage of every pipeline: fix the request's trace id.

use gatekit_core::TraceId;
use gatekit_remote_client::TRACE_HEADER;

use crate::pipeline::{Flow, GateRequest, Stage};

/// Adopts a well-formed inbound `X-Trace-Id`, or generates one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceStage;

#[async_trait::async_trait]
impl Stage for TraceStage {
    fn name(&self) -> &'static str {
        "trace"
    }

    async fn run(&self, req: &mut GateRequest<'_>) -> Flow {
        let trace_id = TraceId::from_header(req.header(TRACE_HEADER));
        req.context_mut().set_trace_id(trace_id);
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    use crate::pipeline::Pipeline;

    #[tokio::test]
    async fn inbound_trace_id_is_kept() {
        let (parts, _) = Request::builder()
            .uri("/widgets/list")
            .header("X-Trace-Id", "abc-123")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let ctx = Pipeline::new().stage(TraceStage).run(&parts).await.unwrap();
        assert_eq!(ctx.trace_id().as_str(), "abc-123");
    }

    #[tokio::test]
    async fn missing_trace_id_is_generated() {
        let (parts, _) = Request::builder()
            .uri("/widgets/list")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let ctx = Pipeline::new().stage(TraceStage).run(&parts).await.unwrap();
        assert!(!ctx.trace_id().as_str().is_empty());
    }
}
