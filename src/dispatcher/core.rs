use std::any::{type_name, Any};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::fanout::fan_out;
use crate::error::{MediatorError, Result};
use crate::ids::DispatchId;
use crate::invoker::InvokerCache;
use crate::message::{DynNotification, DynRequest, ErasedResponse, Notification, Request, TypeKey};
use crate::pipeline::PipelineCache;
use crate::registry::HandlerRegistry;
use crate::runtime_config::RuntimeConfig;
use crate::services::ServiceProvider;

struct Shared {
    registry: Arc<HandlerRegistry>,
    provider: Arc<dyn ServiceProvider>,
    invokers: InvokerCache,
    pipelines: PipelineCache,
    config: RuntimeConfig,
}

/// Routes requests and notifications to their registered handlers.
///
/// Cloning is cheap; clones share the registry, the service provider and
/// the invoker and pipeline caches.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Create a dispatcher with the default [`RuntimeConfig`].
    ///
    /// Nothing is compiled until first use; call [`Dispatcher::warm_up`] to
    /// build everything ahead of traffic.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>, provider: Arc<dyn ServiceProvider>) -> Self {
        Self::build(registry, provider, RuntimeConfig::default())
    }

    /// Create a dispatcher, warming every pipeline first if
    /// `config.warm_pipelines` is set.
    ///
    /// # Errors
    ///
    /// The first configuration error found while warming.
    pub fn with_config(
        registry: Arc<HandlerRegistry>,
        provider: Arc<dyn ServiceProvider>,
        config: RuntimeConfig,
    ) -> Result<Self> {
        let dispatcher = Self::build(registry, provider, config);
        if config.warm_pipelines {
            dispatcher.warm_up()?;
        }
        Ok(dispatcher)
    }

    fn build(registry: Arc<HandlerRegistry>, provider: Arc<dyn ServiceProvider>, config: RuntimeConfig) -> Self {
        info!(
            request_types = registry.request_types().len(),
            behaviors = registry.behavior_count(),
            slow_dispatch_ms = config.slow_dispatch_ms,
            warm_pipelines = config.warm_pipelines,
            "Dispatcher created"
        );
        Self {
            shared: Arc::new(Shared {
                registry,
                provider,
                invokers: InvokerCache::new(),
                pipelines: PipelineCache::default(),
                config,
            }),
        }
    }

    /// Send a request to its handler through the behavior pipeline.
    ///
    /// # Errors
    ///
    /// [`MediatorError::NoHandler`] if nothing handles `R`; otherwise whatever
    /// the handler or a behavior failed with, unchanged.
    pub async fn send<R: Request>(&self, request: &R) -> Result<R::Response> {
        self.send_with(request, &CancellationToken::new()).await
    }

    /// [`Dispatcher::send`] with a caller-supplied cancellation token.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn send_with<R: Request>(&self, request: &R, cancel: &CancellationToken) -> Result<R::Response> {
        let response = self.dispatch(TypeKey::of::<R>(), request, cancel).await?;
        response
            .downcast::<R::Response>()
            .map_err(|other| MediatorError::ResponseTypeMismatch {
                request_type: type_name::<R>(),
                expected: type_name::<R::Response>(),
                actual: other.key().name(),
            })
    }

    /// Send a request whose concrete type is only known at runtime.
    ///
    /// The response comes back type-erased; downcast it to the request's
    /// declared response type.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn send_dyn(&self, request: &dyn DynRequest, cancel: &CancellationToken) -> Result<ErasedResponse> {
        self.dispatch(request.request_key(), request.as_any(), cancel).await
    }

    async fn dispatch(
        &self,
        request_type: TypeKey,
        request: &(dyn Any + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<ErasedResponse> {
        let dispatch_id = DispatchId::new();
        let started = Instant::now();
        let shared = &self.shared;

        let tables = shared.registry.snapshot();
        let pipeline = match shared.pipelines.get_or_build(&tables, request_type, &shared.invokers) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                error!(
                    dispatch_id = %dispatch_id,
                    request_type = %request_type,
                    error = %err,
                    "No pipeline for request"
                );
                return Err(err);
            }
        };

        debug!(
            dispatch_id = %dispatch_id,
            request_type = %request_type,
            handler_type = %pipeline.info().handler,
            "Dispatching request"
        );

        let scope = shared.provider.begin_scope();
        let result = pipeline
            .execute(scope.as_ref(), request, cancel, dispatch_id)
            .await;
        drop(scope);

        self.record("request", dispatch_id, request_type, started.elapsed(), result.as_ref().err());
        result
    }

    /// Publish a notification to every registered handler, in registration order.
    ///
    /// # Errors
    ///
    /// [`MediatorError::NotificationHandler`] naming the first handler that
    /// failed, or [`MediatorError::NotificationService`] naming the first
    /// handler the scope could not resolve. Handlers after it are not invoked.
    pub async fn publish<N: Notification>(&self, notification: &N) -> Result<()> {
        self.publish_with(notification, &CancellationToken::new()).await
    }

    /// [`Dispatcher::publish`] with a caller-supplied cancellation token.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::publish`].
    pub async fn publish_with<N: Notification>(&self, notification: &N, cancel: &CancellationToken) -> Result<()> {
        self.broadcast(TypeKey::of::<N>(), notification, cancel).await
    }

    /// Publish a notification whose concrete type is only known at runtime.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::publish`].
    pub async fn publish_dyn(&self, notification: &dyn DynNotification, cancel: &CancellationToken) -> Result<()> {
        self.broadcast(notification.notification_key(), notification.as_any(), cancel)
            .await
    }

    async fn broadcast(
        &self,
        notification_type: TypeKey,
        notification: &(dyn Any + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let dispatch_id = DispatchId::new();
        let started = Instant::now();
        let shared = &self.shared;

        let tables = shared.registry.snapshot();
        let handlers = tables.notification_handlers(notification_type);
        if handlers.is_empty() {
            debug!(
                dispatch_id = %dispatch_id,
                notification_type = %notification_type,
                "No handlers for notification"
            );
            return Ok(());
        }

        debug!(
            dispatch_id = %dispatch_id,
            notification_type = %notification_type,
            handlers = handlers.len(),
            "Publishing notification"
        );

        let result = fan_out(
            shared.provider.as_ref(),
            &shared.invokers,
            handlers,
            notification,
            cancel,
            dispatch_id,
        )
        .await;

        self.record(
            "notification",
            dispatch_id,
            notification_type,
            started.elapsed(),
            result.as_ref().err(),
        );
        result.map(|_| ())
    }

    fn record(
        &self,
        kind: &'static str,
        dispatch_id: DispatchId,
        message_type: TypeKey,
        elapsed: Duration,
        failure: Option<&MediatorError>,
    ) {
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match failure {
            None => debug!(
                dispatch_id = %dispatch_id,
                kind = kind,
                message_type = %message_type,
                latency_ms = latency_ms,
                "Dispatch complete"
            ),
            Some(err) if err.is_cancelled() => info!(
                dispatch_id = %dispatch_id,
                kind = kind,
                message_type = %message_type,
                latency_ms = latency_ms,
                "Dispatch cancelled"
            ),
            Some(err) => warn!(
                dispatch_id = %dispatch_id,
                kind = kind,
                message_type = %message_type,
                latency_ms = latency_ms,
                configuration = err.is_configuration(),
                error = %err,
                "Dispatch failed"
            ),
        }

        if let Some(threshold) = self.shared.config.slow_dispatch_threshold() {
            if elapsed > threshold {
                warn!(
                    dispatch_id = %dispatch_id,
                    kind = kind,
                    message_type = %message_type,
                    latency_ms = latency_ms,
                    threshold_ms = self.shared.config.slow_dispatch_ms,
                    "Slow dispatch"
                );
            }
        }
    }

    /// Compile every invoker and build every request pipeline now.
    ///
    /// Also checks that the service provider can resolve every handler and
    /// behavior type the pipelines need.
    ///
    /// # Errors
    ///
    /// The first configuration error found.
    pub fn warm_up(&self) -> Result<()> {
        let shared = &self.shared;
        let provider = shared.provider.as_ref();
        let tables = shared.registry.snapshot();
        let started = Instant::now();

        let mut pipelines = 0_usize;
        for binding in tables.requests() {
            let pipeline = shared
                .pipelines
                .get_or_build(&tables, binding.request_type(), &shared.invokers)?;
            let needed = std::iter::once(pipeline.info().handler).chain(pipeline.behavior_types());
            for key in needed {
                if !provider.can_resolve(key) {
                    error!(
                        request_type = %binding.request_type(),
                        service_type = %key,
                        "Pipeline depends on an unregistered service"
                    );
                    return Err(MediatorError::ServiceNotRegistered { type_name: key.name() });
                }
            }
            pipelines += 1;
        }

        let mut notification_handlers = 0_usize;
        for binding in tables.all_notification_handlers() {
            shared.invokers.notification_invoker(binding);
            if !provider.can_resolve(binding.handler_type()) {
                error!(
                    notification_type = %binding.notification_type(),
                    service_type = %binding.handler_type(),
                    "Notification handler is not a registered service"
                );
                return Err(MediatorError::NotificationService {
                    handler: binding.handler_type().name(),
                    notification_type: binding.notification_type().name(),
                    source: Box::new(MediatorError::ServiceNotRegistered {
                        type_name: binding.handler_type().name(),
                    }),
                });
            }
            notification_handlers += 1;
        }

        info!(
            pipelines = pipelines,
            notification_handlers = notification_handlers,
            compiled_invokers = shared.invokers.compiled(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Dispatcher warmed up"
        );
        Ok(())
    }

    /// Behavior types wrapping `R`'s handler, outermost first.
    ///
    /// Builds the pipeline if it is not cached yet.
    ///
    /// # Errors
    ///
    /// [`MediatorError::NoHandler`] if nothing handles `R`.
    pub fn pipeline_behaviors<R: Request>(&self) -> Result<Vec<TypeKey>> {
        let shared = &self.shared;
        let tables = shared.registry.snapshot();
        let pipeline = shared
            .pipelines
            .get_or_build(&tables, TypeKey::of::<R>(), &shared.invokers)?;
        Ok(pipeline.behavior_types().collect())
    }

    /// Number of pipelines built so far, rebuilds after re-registration included.
    #[must_use]
    pub fn pipeline_builds(&self) -> usize {
        self.shared.pipelines.builds()
    }

    /// Number of request and notification invokers compiled so far.
    #[must_use]
    pub fn compiled_invokers(&self) -> usize {
        self.shared.invokers.compiled()
    }

    #[must_use]
    pub fn cached_pipelines(&self) -> usize {
        self.shared.pipelines.len()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.shared.registry
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }
}
