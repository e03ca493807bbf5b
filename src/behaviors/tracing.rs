use std::time::Instant;

use async_trait::async_trait;
use tracing::{field, info_span, Instrument};

use crate::message::ErasedResponse;
use crate::pipeline::{Next, PipelineBehavior, RequestContext};

/// Wraps the rest of the chain in a `request` span.
///
/// The span carries the dispatch id and the request and handler types, and
/// records `latency_ms` and `outcome` once the chain returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBehavior;

#[async_trait]
impl PipelineBehavior for TracingBehavior {
    async fn handle(&self, ctx: RequestContext<'_>, next: Next<'_>) -> anyhow::Result<ErasedResponse> {
        let span = info_span!(
            "request",
            dispatch_id = %ctx.dispatch_id(),
            request_type = %ctx.request_type().short_name(),
            handler_type = %ctx.handler_type().short_name(),
            latency_ms = field::Empty,
            outcome = field::Empty,
        );

        let started = Instant::now();
        let result = next.run().instrument(span.clone()).await;

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.record("latency_ms", latency_ms);
        span.record("outcome", if result.is_ok() { "ok" } else { "error" });
        result
    }
}
