//! # brrtmediator
//!
//! **brrtmediator** is an in-process mediator: callers send requests and publish
//! notifications without knowing which component handles them.
//!
//! ## Overview
//!
//! Two interaction kinds are supported:
//!
//! - **Request/response** - exactly one handler produces one typed response.
//!   Requests pass through an ordered chain of behaviors (tracing, metrics,
//!   validation, authorization...) on the way to their handler.
//! - **Notification/broadcast** - zero or more handlers react in registration
//!   order; none returns a value.
//!
//! Routing is by Rust type. Each (message, handler) pair is compiled once into
//! a monomorphized invoker and each request pipeline is composed once, so a
//! steady-state `send` costs a map lookup, a scope, and the handler itself.
//!
//! ## Architecture
//!
//! - **[`registry`]** - Type Registry: request type to handler type, notification
//!   type to ordered handler types, plus global behaviors
//! - **[`invoker`]** - Invocation Compiler: cached, type-erased call paths
//! - **[`pipeline`]** - Pipeline Composer: behavior chains memoized per request type
//! - **[`dispatcher`]** - [`Dispatcher::send`] and [`Dispatcher::publish`]
//! - **[`services`]** - dependency-resolution context handlers are resolved from
//! - **[`behaviors`]** - built-in tracing, metrics and cancellation behaviors
//! - **[`runtime_config`]** / **[`telemetry`]** - configuration and logging setup
//!
//! ### Send Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Caller
//!     participant Dispatcher
//!     participant Registry as HandlerRegistry
//!     participant Cache as PipelineCache
//!     participant Invokers as InvokerCache
//!     participant Scope as ServiceScope
//!     participant Handler
//!
//!     Caller->>Dispatcher: send(&request)
//!     Dispatcher->>Registry: snapshot()
//!     Dispatcher->>Cache: get_or_build(request type)
//!     alt first use or registry changed
//!         Cache->>Invokers: request_invoker(binding)
//!         Cache->>Cache: close behavior definitions
//!     end
//!     Dispatcher->>Scope: begin_scope()
//!     Scope-->>Dispatcher: handler, behaviors
//!     Dispatcher->>Handler: behaviors -> invoker -> handle()
//!     Handler-->>Caller: response or original error
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use brrtmediator::services::ServiceCollection;
//! use brrtmediator::{
//!     Dispatcher, HandlerRegistry, Notification, NotificationHandler, Request, RequestHandler,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Request)]
//! #[request(response = u64)]
//! struct CreateUser {
//!     name: String,
//! }
//!
//! #[derive(Notification)]
//! struct UserCreated {
//!     id: u64,
//! }
//!
//! struct CreateUserHandler;
//!
//! #[async_trait]
//! impl RequestHandler<CreateUser> for CreateUserHandler {
//!     async fn handle(&self, req: &CreateUser, _cancel: &CancellationToken) -> anyhow::Result<u64> {
//!         Ok(req.name.len() as u64)
//!     }
//! }
//!
//! struct WelcomeMail;
//!
//! #[async_trait]
//! impl NotificationHandler<UserCreated> for WelcomeMail {
//!     async fn handle(&self, n: &UserCreated, _cancel: &CancellationToken) -> anyhow::Result<()> {
//!         tracing::info!(user_id = n.id, "welcome mail queued");
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register_request_handler::<CreateUser, CreateUserHandler>();
//! registry.register_notification_handler::<UserCreated, WelcomeMail>();
//!
//! let services = ServiceCollection::new()
//!     .add_transient(|_| Ok(CreateUserHandler))
//!     .add_transient(|_| Ok(WelcomeMail))
//!     .build();
//!
//! let dispatcher = Dispatcher::new(registry, Arc::new(services));
//! let id = dispatcher.send(&CreateUser { name: "ada".into() }).await?;
//! dispatcher.publish(&UserCreated { id }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`Result`], an alias over [`MediatorError`].
//! Handler and behavior failures from `send` come back unchanged (the original
//! error stays downcastable); `publish` wraps a failure with the failing
//! handler's type name and stops the fan-out.
//!
//! ## Logging
//!
//! The crate emits `tracing` events with structured fields (`dispatch_id`,
//! `request_type`, `handler_type`, `latency_ms`). Install a subscriber with
//! [`telemetry::init_logging`] or any `tracing-subscriber` setup of your own.

pub mod behaviors;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod ids;
pub mod invoker;
pub mod message;
pub mod pipeline;
pub mod registry;
pub mod runtime_config;
pub mod services;
pub mod telemetry;

pub use behaviors::{CancellationBehavior, MetricsBehavior, TracingBehavior};
pub use brrtmediator_macros::{Notification, Request};
pub use dispatcher::Dispatcher;
pub use error::{check_cancelled, MediatorError, Result};
pub use handler::{NotificationHandler, RequestHandler};
pub use ids::DispatchId;
pub use message::{DynNotification, DynRequest, ErasedResponse, Notification, Request, TypeKey};
pub use pipeline::{
    BehaviorDefinition, Next, PipelineBehavior, RequestContext, RequestInfo, TypedBehavior, TypedNext,
};
pub use registry::{HandlerRegistry, NotificationBinding, RequestBinding};
pub use runtime_config::RuntimeConfig;
