use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::{MediatorError, Result};
use crate::ids::DispatchId;
use crate::invoker::RequestInvoker;
use crate::message::{ErasedResponse, Request, TypeKey};
use crate::services::{ServiceInstance, ServiceScope};

/// Types taking part in one request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestInfo {
    pub request: TypeKey,
    pub response: TypeKey,
    pub handler: TypeKey,
}

/// Everything a behavior can see about the request in flight.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    pub(crate) info: &'a RequestInfo,
    pub(crate) request: &'a (dyn Any + Send + Sync),
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) dispatch_id: DispatchId,
}

impl<'a> RequestContext<'a> {
    #[must_use]
    pub fn info(&self) -> &'a RequestInfo {
        self.info
    }

    #[must_use]
    pub fn request_type(&self) -> TypeKey {
        self.info.request
    }

    #[must_use]
    pub fn response_type(&self) -> TypeKey {
        self.info.response
    }

    #[must_use]
    pub fn handler_type(&self) -> TypeKey {
        self.info.handler
    }

    /// Typed view of the request, `None` if it is not a `T`.
    #[must_use]
    pub fn request<T: 'static>(&self) -> Option<&'a T> {
        self.request.downcast_ref::<T>()
    }

    #[must_use]
    pub fn cancellation(&self) -> &'a CancellationToken {
        self.cancel
    }

    #[must_use]
    pub fn dispatch_id(&self) -> DispatchId {
        self.dispatch_id
    }

    /// Build a short-circuit response, checked against the declared response type.
    ///
    /// # Errors
    ///
    /// [`MediatorError::ResponseTypeMismatch`] if `T` is not the request's response type.
    pub fn respond<T: Send + 'static>(&self, value: T) -> Result<ErasedResponse> {
        let response = ErasedResponse::new(value);
        if response.key() != self.info.response {
            return Err(MediatorError::ResponseTypeMismatch {
                request_type: self.info.request.name(),
                expected: self.info.response.name(),
                actual: response.key().name(),
            });
        }
        Ok(response)
    }
}

pub(crate) struct Terminal {
    pub(crate) invoker: Arc<dyn RequestInvoker>,
    pub(crate) handler: ServiceInstance,
}

/// The rest of the chain after the current behavior.
///
/// Not calling [`Next::run`] short-circuits: inner behaviors and the handler
/// never run and the behavior's own result becomes the `send` result.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    pub(crate) behaviors: &'a [Arc<dyn PipelineBehavior>],
    pub(crate) terminal: &'a Terminal,
    pub(crate) ctx: RequestContext<'a>,
}

impl<'a> Next<'a> {
    /// Run the next behavior, or the handler if none are left.
    pub fn run(self) -> BoxFuture<'a, anyhow::Result<ErasedResponse>> {
        match self.behaviors.split_first() {
            Some((behavior, rest)) => {
                let next = Next {
                    behaviors: rest,
                    ..self
                };
                behavior.handle(self.ctx, next)
            }
            None => self.terminal.invoker.invoke(
                Arc::clone(&self.terminal.handler),
                self.ctx.request,
                self.ctx.cancel,
            ),
        }
    }

    /// Number of behaviors still to run before the handler.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.behaviors.len()
    }
}

/// Cross-cutting wrapper around every request handler it applies to.
///
/// Behaviors are resolved from the call's service scope on every `send`, so
/// any state they hold lives as long as their registered lifetime says.
#[async_trait]
pub trait PipelineBehavior: Send + Sync + 'static {
    async fn handle(&self, ctx: RequestContext<'_>, next: Next<'_>) -> anyhow::Result<ErasedResponse>;
}

/// [`Next`] with the response converted back to `R::Response`.
pub struct TypedNext<'a, R> {
    inner: Next<'a>,
    _request: PhantomData<fn() -> R>,
}

impl<R> Clone for TypedNext<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for TypedNext<'_, R> {}

impl<'a, R: Request> TypedNext<'a, R> {
    /// Run the rest of the chain.
    ///
    /// # Errors
    ///
    /// Whatever the inner chain fails with, or
    /// [`MediatorError::ResponseTypeMismatch`] if an inner open behavior
    /// short-circuited with a value of the wrong type.
    pub async fn run(self) -> anyhow::Result<R::Response> {
        let response = self.inner.run().await?;
        response.downcast::<R::Response>().map_err(|other| {
            MediatorError::ResponseTypeMismatch {
                request_type: std::any::type_name::<R>(),
                expected: std::any::type_name::<R::Response>(),
                actual: other.key().name(),
            }
            .into()
        })
    }
}

/// Behavior written against one concrete request type.
#[async_trait]
pub trait TypedBehavior<R: Request>: Send + Sync + 'static {
    async fn handle(
        &self,
        request: &R,
        ctx: RequestContext<'_>,
        next: TypedNext<'_, R>,
    ) -> anyhow::Result<R::Response>;
}

struct TypedBehaviorAdapter<R, B> {
    inner: Arc<B>,
    _request: PhantomData<fn() -> R>,
}

#[async_trait]
impl<R, B> PipelineBehavior for TypedBehaviorAdapter<R, B>
where
    R: Request,
    B: TypedBehavior<R>,
{
    async fn handle(&self, ctx: RequestContext<'_>, next: Next<'_>) -> anyhow::Result<ErasedResponse> {
        let request = ctx.request::<R>().ok_or(MediatorError::InvokerMismatch {
            message_type: ctx.request_type().name(),
            expected: std::any::type_name::<R>(),
            actual: "a request of another type",
        })?;
        let next = TypedNext::<R> {
            inner: next,
            _request: PhantomData,
        };
        let response = self.inner.handle(request, ctx, next).await?;
        Ok(ErasedResponse::new(response))
    }
}

type Activator = fn(&dyn ServiceScope) -> Result<Arc<dyn PipelineBehavior>>;
type Filter = Arc<dyn Fn(&RequestInfo) -> bool + Send + Sync>;

fn activate_open<B: PipelineBehavior>(scope: &dyn ServiceScope) -> Result<Arc<dyn PipelineBehavior>> {
    let behavior: Arc<B> = scope.get::<B>()?;
    Ok(behavior)
}

fn activate_typed<R, B>(scope: &dyn ServiceScope) -> Result<Arc<dyn PipelineBehavior>>
where
    R: Request,
    B: TypedBehavior<R>,
{
    let inner: Arc<B> = scope.get::<B>()?;
    Ok(Arc::new(TypedBehaviorAdapter::<R, B> {
        inner,
        _request: PhantomData,
    }))
}

/// A registered behavior type, closed over concrete request types when a
/// pipeline is built.
///
/// ```rust
/// use brrtmediator::{BehaviorDefinition, HandlerRegistry, TracingBehavior};
///
/// let registry = HandlerRegistry::new();
/// registry.register_behavior(
///     BehaviorDefinition::open::<TracingBehavior>()
///         .when(|info| !info.request.name().ends_with("HealthCheck")),
/// );
/// assert_eq!(registry.behavior_count(), 1);
/// ```
#[derive(Clone)]
pub struct BehaviorDefinition {
    behavior: TypeKey,
    target: Option<TypeKey>,
    filter: Option<Filter>,
    activate: Activator,
}

impl BehaviorDefinition {
    /// Behavior `B` applied to every request type.
    #[must_use]
    pub fn open<B: PipelineBehavior>() -> Self {
        Self {
            behavior: TypeKey::of::<B>(),
            target: None,
            filter: None,
            activate: activate_open::<B>,
        }
    }

    /// Behavior `B` applied only to request type `R`.
    #[must_use]
    pub fn typed<R, B>() -> Self
    where
        R: Request,
        B: TypedBehavior<R>,
    {
        Self {
            behavior: TypeKey::of::<B>(),
            target: Some(TypeKey::of::<R>()),
            filter: None,
            activate: activate_typed::<R, B>,
        }
    }

    /// Further restrict the request types this behavior applies to.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RequestInfo) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn behavior_type(&self) -> TypeKey {
        self.behavior
    }

    #[must_use]
    pub fn applies_to(&self, info: &RequestInfo) -> bool {
        if self.target.is_some_and(|target| target != info.request) {
            return false;
        }
        self.filter.as_ref().map_or(true, |filter| filter(info))
    }

    pub(crate) fn close(&self, info: &RequestInfo) -> Option<ClosedBehavior> {
        self.applies_to(info).then_some(ClosedBehavior {
            behavior: self.behavior,
            activate: self.activate,
        })
    }
}

impl fmt::Debug for BehaviorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorDefinition")
            .field("behavior", &self.behavior)
            .field("target", &self.target)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// A behavior definition specialized to one pipeline.
#[derive(Clone, Copy)]
pub(crate) struct ClosedBehavior {
    pub(crate) behavior: TypeKey,
    activate: Activator,
}

impl ClosedBehavior {
    pub(crate) fn activate(&self, scope: &dyn ServiceScope) -> Result<Arc<dyn PipelineBehavior>> {
        (self.activate)(scope)
    }
}
