use async_trait::async_trait;

use crate::error::check_cancelled;
use crate::message::ErasedResponse;
use crate::pipeline::{Next, PipelineBehavior, RequestContext};

/// Fails with [`MediatorError::Cancelled`](crate::MediatorError::Cancelled)
/// instead of running the rest of the chain when the call is already cancelled.
///
/// Register it first so cancelled calls skip every other behavior too.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancellationBehavior;

#[async_trait]
impl PipelineBehavior for CancellationBehavior {
    async fn handle(&self, ctx: RequestContext<'_>, next: Next<'_>) -> anyhow::Result<ErasedResponse> {
        check_cancelled(ctx.cancellation())?;
        next.run().await
    }
}
