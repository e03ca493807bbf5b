//! Error taxonomy for dispatch.
//!
//! Three families of failure reach callers:
//!
//! - **Configuration errors** ([`MediatorError::NoHandler`],
//!   [`MediatorError::InvokerMismatch`], [`MediatorError::ServiceNotRegistered`],
//!   [`MediatorError::ServiceResolution`], [`MediatorError::ResponseTypeMismatch`],
//!   and [`MediatorError::NotificationService`] naming the notification whose
//!   handler could not be resolved) are reported at first use and never retried.
//! - **Handler failures** come back from `send` unchanged as
//!   [`MediatorError::Handler`], and from `publish` wrapped in
//!   [`MediatorError::NotificationHandler`] naming the failing handler.
//! - **Cancellation** ([`MediatorError::Cancelled`]) propagates like any other
//!   handler failure.
//!
//! Handlers and behaviors return `anyhow::Result`. Converting an `anyhow::Error`
//! back into a `MediatorError` unwraps errors that already are `MediatorError`,
//! so a `NoHandler` raised deep in the chain does not turn into `Handler(..)`.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Main error type for all dispatch operations.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// No handler type is registered for the request type.
    #[error("No handler registered for request type {request_type}")]
    NoHandler { request_type: &'static str },

    /// A compiled invoker was applied to an instance of the wrong type.
    #[error("Invoker for {message_type} expected {expected} but received {actual}")]
    InvokerMismatch {
        message_type: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// The service scope has no registration for the type.
    #[error("Service not registered: {type_name}")]
    ServiceNotRegistered { type_name: &'static str },

    /// The service factory failed.
    #[error("Failed to resolve service {type_name}: {source}")]
    ServiceResolution {
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The pipeline produced a value that is not the request's declared response.
    #[error("Request {request_type} expects response {expected} but the pipeline produced {actual}")]
    ResponseTypeMismatch {
        request_type: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// The operation observed its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// A notification handler failed; remaining handlers were skipped.
    #[error("Notification handler {handler} failed for {notification_type}: {source}")]
    NotificationHandler {
        handler: &'static str,
        notification_type: &'static str,
        #[source]
        source: Box<MediatorError>,
    },

    /// A notification handler could not be resolved from the publish scope;
    /// it and the remaining handlers were skipped.
    #[error("Notification handler {handler} for {notification_type} could not be resolved: {source}")]
    NotificationService {
        handler: &'static str,
        notification_type: &'static str,
        #[source]
        source: Box<MediatorError>,
    },

    /// Failure raised by a handler or behavior.
    #[error(transparent)]
    Handler(anyhow::Error),
}

impl MediatorError {
    /// True for configuration errors, which indicate a registration problem
    /// rather than a runtime failure.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MediatorError::NoHandler { .. }
                | MediatorError::InvokerMismatch { .. }
                | MediatorError::ServiceNotRegistered { .. }
                | MediatorError::ServiceResolution { .. }
                | MediatorError::ResponseTypeMismatch { .. }
                | MediatorError::NotificationService { .. }
        )
    }

    /// True if this error, or the handler failure it wraps, is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            MediatorError::Cancelled => true,
            MediatorError::NotificationHandler { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The original handler failure, looking through notification wrapping.
    #[must_use]
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            MediatorError::Handler(err) => Some(err),
            MediatorError::NotificationHandler { source, .. } => source.handler_error(),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for MediatorError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<MediatorError>() {
            Ok(inner) => inner,
            Err(err) => MediatorError::Handler(err),
        }
    }
}

/// Fail with [`MediatorError::Cancelled`] if the token has been cancelled.
///
/// ```rust
/// use brrtmediator::check_cancelled;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(check_cancelled(&token).is_ok());
/// token.cancel();
/// assert!(check_cancelled(&token).unwrap_err().is_cancelled());
/// ```
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(MediatorError::Cancelled)
    } else {
        Ok(())
    }
}

/// Result type alias using MediatorError.
pub type Result<T> = std::result::Result<T, MediatorError>;
