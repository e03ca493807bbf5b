//! # Pipeline Composer
//!
//! Builds, per request type, the ordered chain of behaviors wrapped around the
//! compiled handler invoker, and memoizes it.
//!
//! ## Execution order
//!
//! Given behaviors `[A, B]` registered in that order and handler `H`:
//!
//! ```text
//! A enter -> B enter -> H -> B exit -> A exit
//! ```
//!
//! A behavior that returns without calling [`Next::run`] short-circuits the
//! chain; its own value becomes the result.
//!
//! ## Build vs. call
//!
//! | Step                                   | When            |
//! |----------------------------------------|-----------------|
//! | Resolve handler type, compile invoker  | first build     |
//! | Close behavior definitions over types  | first build     |
//! | Resolve handler instance from scope    | every call      |
//! | Resolve behavior instances from scope  | every call      |
//!
//! ## Writing a behavior
//!
//! ```rust
//! use async_trait::async_trait;
//! use brrtmediator::{ErasedResponse, Next, PipelineBehavior, RequestContext};
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl PipelineBehavior for Audit {
//!     async fn handle(&self, ctx: RequestContext<'_>, next: Next<'_>) -> anyhow::Result<ErasedResponse> {
//!         let response = next.run().await?;
//!         tracing::info!(request_type = %ctx.request_type(), "audited");
//!         Ok(response)
//!     }
//! }
//! ```

mod behavior;
mod core;

pub use behavior::{
    BehaviorDefinition, Next, PipelineBehavior, RequestContext, RequestInfo, TypedBehavior, TypedNext,
};
pub(crate) use core::PipelineCache;
