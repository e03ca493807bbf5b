//! # Built-in Behaviors
//!
//! Ready-made [`PipelineBehavior`](crate::PipelineBehavior)s. Each must be
//! registered as a service as well as a behavior definition:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use brrtmediator::services::ServiceCollection;
//! use brrtmediator::{BehaviorDefinition, CancellationBehavior, HandlerRegistry, MetricsBehavior, TracingBehavior};
//!
//! let metrics = Arc::new(MetricsBehavior::new());
//!
//! let registry = HandlerRegistry::new();
//! registry.register_behavior(BehaviorDefinition::open::<CancellationBehavior>());
//! registry.register_behavior(BehaviorDefinition::open::<TracingBehavior>());
//! registry.register_behavior(BehaviorDefinition::open::<MetricsBehavior>());
//!
//! let services = ServiceCollection::new()
//!     .add_singleton(|_| Ok(CancellationBehavior))
//!     .add_singleton(|_| Ok(TracingBehavior))
//!     .add_instance(Arc::clone(&metrics))
//!     .build();
//! # let _ = services;
//! ```

mod cancellation;
mod metrics;
mod tracing;

pub use cancellation::CancellationBehavior;
pub use metrics::MetricsBehavior;
pub use tracing::TracingBehavior;
