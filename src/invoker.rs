//! # Invocation Compiler
//!
//! Turns a (handler type, message type) pair into a reusable, stateless
//! closure that takes a type-erased handler instance and message and performs
//! the typed call. Compilation is monomorphization: the binding captured at
//! registration carries a `fn` pointer to [`compile_request`] or
//! [`compile_notification`] instantiated for its concrete types, so dispatch
//! never inspects types beyond one `downcast`.
//!
//! Compiled invokers are cached in an [`InvokerCache`] keyed by
//! (message type, handler type). Concurrent first use is resolved by the
//! map's entry lock: the first caller compiles, everyone else reuses.
//!
//! Applying an invoker to an instance or message of the wrong type fails with
//! [`MediatorError::InvokerMismatch`], reported at first use.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::MediatorError;
use crate::handler::{NotificationHandler, RequestHandler};
use crate::message::{ErasedResponse, Notification, Request, TypeKey};
use crate::registry::{NotificationBinding, RequestBinding};
use crate::services::ServiceInstance;

/// Compiled call path for one request handler type.
pub trait RequestInvoker: Send + Sync {
    fn request_type(&self) -> TypeKey;
    fn handler_type(&self) -> TypeKey;

    /// Call the handler exactly as `H::handle(request, cancel)` would.
    fn invoke<'a>(
        &'a self,
        handler: ServiceInstance,
        request: &'a (dyn Any + Send + Sync),
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<ErasedResponse>>;
}

/// Compiled call path for one notification handler type.
pub trait NotificationInvoker: Send + Sync {
    fn notification_type(&self) -> TypeKey;
    fn handler_type(&self) -> TypeKey;

    fn invoke<'a>(
        &'a self,
        handler: ServiceInstance,
        notification: &'a (dyn Any + Send + Sync),
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

struct CompiledRequest<R, H> {
    _types: PhantomData<fn() -> (R, H)>,
}

impl<R, H> RequestInvoker for CompiledRequest<R, H>
where
    R: Request,
    H: RequestHandler<R>,
{
    fn request_type(&self) -> TypeKey {
        TypeKey::of::<R>()
    }

    fn handler_type(&self) -> TypeKey {
        TypeKey::of::<H>()
    }

    fn invoke<'a>(
        &'a self,
        handler: ServiceInstance,
        request: &'a (dyn Any + Send + Sync),
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<ErasedResponse>> {
        Box::pin(async move {
            let handler = downcast_handler::<H>(handler, TypeKey::of::<R>())?;
            let request = downcast_message::<R>(request)?;
            let response = <H as RequestHandler<R>>::handle(&handler, request, cancel).await?;
            Ok::<_, anyhow::Error>(ErasedResponse::new(response))
        })
    }
}

struct CompiledNotification<N, H> {
    _types: PhantomData<fn() -> (N, H)>,
}

impl<N, H> NotificationInvoker for CompiledNotification<N, H>
where
    N: Notification,
    H: NotificationHandler<N>,
{
    fn notification_type(&self) -> TypeKey {
        TypeKey::of::<N>()
    }

    fn handler_type(&self) -> TypeKey {
        TypeKey::of::<H>()
    }

    fn invoke<'a>(
        &'a self,
        handler: ServiceInstance,
        notification: &'a (dyn Any + Send + Sync),
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let handler = downcast_handler::<H>(handler, TypeKey::of::<N>())?;
            let notification = downcast_message::<N>(notification)?;
            <H as NotificationHandler<N>>::handle(&handler, notification, cancel).await
        })
    }
}

fn downcast_handler<H: Send + Sync + 'static>(
    handler: ServiceInstance,
    message: TypeKey,
) -> Result<Arc<H>, MediatorError> {
    handler
        .downcast::<H>()
        .map_err(|_| MediatorError::InvokerMismatch {
            message_type: message.name(),
            expected: std::any::type_name::<H>(),
            actual: "an instance of another handler type",
        })
}

fn downcast_message<M: 'static>(message: &(dyn Any + Send + Sync)) -> Result<&M, MediatorError> {
    message
        .downcast_ref::<M>()
        .ok_or(MediatorError::InvokerMismatch {
            message_type: std::any::type_name::<M>(),
            expected: std::any::type_name::<M>(),
            actual: "a message of another type",
        })
}

/// Compile the invoker for request handler `H` of `R`.
#[must_use]
pub fn compile_request<R, H>() -> Arc<dyn RequestInvoker>
where
    R: Request,
    H: RequestHandler<R>,
{
    Arc::new(CompiledRequest::<R, H> {
        _types: PhantomData,
    })
}

/// Compile the invoker for notification handler `H` of `N`.
#[must_use]
pub fn compile_notification<N, H>() -> Arc<dyn NotificationInvoker>
where
    N: Notification,
    H: NotificationHandler<N>,
{
    Arc::new(CompiledNotification::<N, H> {
        _types: PhantomData,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InvokerKey {
    message: TypeId,
    handler: TypeId,
}

/// Append-only cache of compiled invokers.
#[derive(Default)]
pub struct InvokerCache {
    requests: DashMap<InvokerKey, Arc<dyn RequestInvoker>>,
    notifications: DashMap<InvokerKey, Arc<dyn NotificationInvoker>>,
    compiled: AtomicUsize,
}

impl InvokerCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the invoker for a request binding, compiling it on first use.
    pub fn request_invoker(&self, binding: &RequestBinding) -> Arc<dyn RequestInvoker> {
        let key = InvokerKey {
            message: binding.request_type().id(),
            handler: binding.handler_type().id(),
        };
        if let Some(found) = self.requests.get(&key) {
            return Arc::clone(found.value());
        }
        let entry = self.requests.entry(key).or_insert_with(|| {
            self.compiled.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_type = %binding.request_type(),
                handler_type = %binding.handler_type(),
                "Compiled request invoker"
            );
            binding.compile()
        });
        Arc::clone(entry.value())
    }

    /// Get the invoker for a notification binding, compiling it on first use.
    pub fn notification_invoker(&self, binding: &NotificationBinding) -> Arc<dyn NotificationInvoker> {
        let key = InvokerKey {
            message: binding.notification_type().id(),
            handler: binding.handler_type().id(),
        };
        if let Some(found) = self.notifications.get(&key) {
            return Arc::clone(found.value());
        }
        let entry = self.notifications.entry(key).or_insert_with(|| {
            self.compiled.fetch_add(1, Ordering::Relaxed);
            debug!(
                notification_type = %binding.notification_type(),
                handler_type = %binding.handler_type(),
                "Compiled notification invoker"
            );
            binding.compile()
        });
        Arc::clone(entry.value())
    }

    /// Number of invokers compiled so far.
    #[must_use]
    pub fn compiled(&self) -> usize {
        self.compiled.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len() + self.notifications.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Double(u32);
    impl Request for Double {
        type Response = u32;
    }

    struct DoubleHandler;

    #[async_trait]
    impl RequestHandler<Double> for DoubleHandler {
        async fn handle(&self, req: &Double, _cancel: &CancellationToken) -> anyhow::Result<u32> {
            Ok(req.0 * 2)
        }
    }

    struct Other;

    #[tokio::test]
    async fn test_compiled_invoker_calls_handler() {
        let invoker = compile_request::<Double, DoubleHandler>();
        let handler: ServiceInstance = Arc::new(DoubleHandler);
        let cancel = CancellationToken::new();
        let response = invoker.invoke(handler, &Double(21), &cancel).await.unwrap();
        assert_eq!(response.downcast::<u32>().ok(), Some(42));
        assert_eq!(invoker.handler_type(), TypeKey::of::<DoubleHandler>());
    }

    #[tokio::test]
    async fn test_wrong_handler_instance_is_mismatch() {
        let invoker = compile_request::<Double, DoubleHandler>();
        let handler: ServiceInstance = Arc::new(Other);
        let cancel = CancellationToken::new();
        let err = invoker.invoke(handler, &Double(1), &cancel).await.unwrap_err();
        let err = MediatorError::from(err);
        assert!(matches!(err, MediatorError::InvokerMismatch { .. }));
    }

    #[test]
    fn test_cache_compiles_once() {
        let cache = InvokerCache::new();
        let binding = RequestBinding::new::<Double, DoubleHandler>();
        let a = cache.request_invoker(&binding);
        let b = cache.request_invoker(&binding);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.compiled(), 1);
        assert_eq!(cache.len(), 1);
    }
}
