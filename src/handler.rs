//! # Handler Traits
//!
//! Handlers are plain structs resolved from the service scope on every call.
//! A request handler produces the request's declared response; a notification
//! handler only reacts.
//!
//! ```rust
//! use async_trait::async_trait;
//! use brrtmediator::{Request, RequestHandler};
//! use tokio_util::sync::CancellationToken;
//!
//! struct GetPet {
//!     id: u64,
//! }
//!
//! impl Request for GetPet {
//!     type Response = String;
//! }
//!
//! struct GetPetHandler;
//!
//! #[async_trait]
//! impl RequestHandler<GetPet> for GetPetHandler {
//!     async fn handle(&self, req: &GetPet, _cancel: &CancellationToken) -> anyhow::Result<String> {
//!         Ok(format!("pet-{}", req.id))
//!     }
//! }
//! ```
//!
//! Handlers observing cancellation should return
//! [`MediatorError::Cancelled`](crate::MediatorError::Cancelled), most easily via
//! [`check_cancelled`](crate::check_cancelled).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::message::{Notification, Request};

/// Handles one request type and produces its response.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    /// Handle the request.
    ///
    /// # Errors
    ///
    /// Any error is returned to the `send` caller unchanged.
    async fn handle(&self, request: &R, cancel: &CancellationToken) -> anyhow::Result<R::Response>;
}

/// Reacts to one notification type.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    /// Handle the notification.
    ///
    /// # Errors
    ///
    /// An error stops the fan-out; handlers registered later are not invoked.
    async fn handle(&self, notification: &N, cancel: &CancellationToken) -> anyhow::Result<()>;
}
