//! # Dispatcher Module
//!
//! The public entry point: [`Dispatcher::send`] routes a request to its one
//! handler through the behavior pipeline, [`Dispatcher::publish`] fans a
//! notification out to every registered handler.
//!
//! ## Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant C as Caller
//!     participant D as Dispatcher
//!     participant P as PipelineCache
//!     participant S as ServiceScope
//!     participant B as Behaviors
//!     participant H as Handler
//!     C->>D: send(&request)
//!     D->>P: get_or_build(request type)
//!     D->>S: begin_scope()
//!     S-->>D: handler + behavior instances
//!     D->>B: run chain (first registered outermost)
//!     B->>H: invoke
//!     H-->>B: response / error
//!     B-->>D: response / error
//!     D-->>C: response / error (unchanged)
//! ```
//!
//! 1. Load a snapshot of the registry
//! 2. Get the cached pipeline for the request type, building it on first use
//! 3. Open a service scope for this call
//! 4. Resolve the handler instance, then the behavior instances
//! 5. Run the behaviors outermost-first around the compiled handler invoker
//! 6. Drop the scope and return the result
//!
//! ## Publish Flow
//!
//! Handlers run sequentially in registration order and share one scope. The
//! first failure stops the fan-out and is returned wrapped in
//! [`MediatorError::NotificationHandler`](crate::MediatorError::NotificationHandler).
//! Publishing with no registered handlers succeeds without opening a scope.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use brrtmediator::services::ServiceCollection;
//! use brrtmediator::{Dispatcher, HandlerRegistry, Request, RequestHandler};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Echo(String);
//!
//! impl Request for Echo {
//!     type Response = String;
//! }
//!
//! struct EchoHandler;
//!
//! #[async_trait]
//! impl RequestHandler<Echo> for EchoHandler {
//!     async fn handle(&self, req: &Echo, _cancel: &CancellationToken) -> anyhow::Result<String> {
//!         Ok(req.0.clone())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register_request_handler::<Echo, EchoHandler>();
//!
//! let services = ServiceCollection::new()
//!     .add_transient(|_| Ok(EchoHandler))
//!     .build();
//!
//! let dispatcher = Dispatcher::new(registry, Arc::new(services));
//! assert_eq!(dispatcher.send(&Echo("hi".into())).await?, "hi");
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Dispatches never block each other. Registry reads are lock-free snapshots;
//! the invoker and pipeline caches use sharded maps where a concurrent first
//! build for one type is performed once and reused by every racer.

mod core;
mod fanout;

pub use core::Dispatcher;
