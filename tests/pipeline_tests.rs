//! Tests for behavior pipelines around request handlers
//!
//! # Test Coverage
//!
//! - Wrapping order: first registered behavior is outermost
//! - Short-circuiting behaviors
//! - Zero behaviors
//! - Typed behaviors and `when` filters
//! - Response type checks on short-circuit values
//! - Behavior failures and per-call behavior resolution
//! - Built-in metrics, cancellation and tracing behaviors

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use brrtmediator::services::ServiceCollection;
use brrtmediator::{
    BehaviorDefinition, CancellationBehavior, ErasedResponse, HandlerRegistry, MediatorError, MetricsBehavior,
    Next, PipelineBehavior, Request, RequestContext, RequestHandler, TracingBehavior, TypeKey, TypedBehavior,
    TypedNext,
};
use common::{dispatcher, CallLog, Counter, Echo, EchoHandler, Recording};
use tokio_util::sync::CancellationToken;

fn base_services(log: &Arc<CallLog>) -> ServiceCollection {
    ServiceCollection::new()
        .add_instance(Arc::clone(log))
        .add_transient(|scope| {
            Ok(EchoHandler {
                log: scope.get::<CallLog>()?,
            })
        })
        .add_transient(|scope| {
            Ok(Recording::<'A'> {
                log: scope.get::<CallLog>()?,
            })
        })
        .add_transient(|scope| {
            Ok(Recording::<'B'> {
                log: scope.get::<CallLog>()?,
            })
        })
}

fn echo_registry() -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    registry.register_request_handler::<Echo, EchoHandler>();
    registry
}

#[derive(Request)]
#[request(response = u32)]
struct Ping;

struct PingHandler;

#[async_trait]
impl RequestHandler<Ping> for PingHandler {
    async fn handle(&self, _req: &Ping, _cancel: &CancellationToken) -> anyhow::Result<u32> {
        Ok(1)
    }
}

/// Answers every `Echo` itself without calling the rest of the chain.
struct CachedEcho;

#[async_trait]
impl PipelineBehavior for CachedEcho {
    async fn handle(&self, ctx: RequestContext<'_>, next: Next<'_>) -> anyhow::Result<ErasedResponse> {
        if ctx.request::<Echo>().is_some() {
            return Ok(ctx.respond("cached".to_string())?);
        }
        next.run().await
    }
}

/// Short-circuits with a value of the wrong type.
struct WrongType;

#[async_trait]
impl PipelineBehavior for WrongType {
    async fn handle(&self, _ctx: RequestContext<'_>, _next: Next<'_>) -> anyhow::Result<ErasedResponse> {
        Ok(ErasedResponse::new(42_u32))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("rejected: {0}")]
struct Rejected(String);

struct RejectEmpty;

#[async_trait]
impl TypedBehavior<Echo> for RejectEmpty {
    async fn handle(
        &self,
        request: &Echo,
        _ctx: RequestContext<'_>,
        next: TypedNext<'_, Echo>,
    ) -> anyhow::Result<String> {
        if request.msg.is_empty() {
            return Err(Rejected("empty message".into()).into());
        }
        next.run().await
    }
}

struct Exclaim;

#[async_trait]
impl TypedBehavior<Echo> for Exclaim {
    async fn handle(
        &self,
        _request: &Echo,
        _ctx: RequestContext<'_>,
        next: TypedNext<'_, Echo>,
    ) -> anyhow::Result<String> {
        let response = next.run().await?;
        Ok(format!("{response}!"))
    }
}

#[tokio::test]
async fn test_behaviors_wrap_in_registration_order() {
    let log = Arc::new(CallLog::default());
    let registry = echo_registry();
    registry.register_behavior(BehaviorDefinition::open::<Recording<'A'>>());
    registry.register_behavior(BehaviorDefinition::open::<Recording<'B'>>());
    let (dispatcher, _) = dispatcher(registry, base_services(&log).build());

    assert_eq!(dispatcher.send(&Echo::new("hi")).await.unwrap(), "hi");
    assert_eq!(log.entries(), vec!["A-enter", "B-enter", "H", "B-exit", "A-exit"]);
    assert_eq!(
        dispatcher.pipeline_behaviors::<Echo>().unwrap(),
        vec![TypeKey::of::<Recording<'A'>>(), TypeKey::of::<Recording<'B'>>()]
    );
}

#[tokio::test]
async fn test_short_circuit_skips_handler() {
    let log = Arc::new(CallLog::default());
    let registry = echo_registry();
    registry.register_behavior(BehaviorDefinition::open::<Recording<'A'>>());
    registry.register_behavior(BehaviorDefinition::open::<CachedEcho>());
    registry.register_behavior(BehaviorDefinition::open::<Recording<'B'>>());
    let services = base_services(&log).add_singleton(|_| Ok(CachedEcho)).build();
    let (dispatcher, _) = dispatcher(registry, services);

    assert_eq!(dispatcher.send(&Echo::new("hi")).await.unwrap(), "cached");
    assert_eq!(log.entries(), vec!["A-enter", "A-exit"]);
    assert!(!log.contains("H"));
}

#[tokio::test]
async fn test_zero_behaviors_calls_handler_directly() {
    let log = Arc::new(CallLog::default());
    let (dispatcher, _) = dispatcher(echo_registry(), base_services(&log).build());

    assert_eq!(dispatcher.send(&Echo::new("plain")).await.unwrap(), "plain");
    assert_eq!(log.entries(), vec!["H"]);
    assert!(dispatcher.pipeline_behaviors::<Echo>().unwrap().is_empty());
}

#[tokio::test]
async fn test_typed_behaviors_only_wrap_their_request() {
    let log = Arc::new(CallLog::default());
    let registry = echo_registry();
    registry.register_request_handler::<Ping, PingHandler>();
    registry.register_behavior(BehaviorDefinition::typed::<Echo, RejectEmpty>());
    registry.register_behavior(BehaviorDefinition::typed::<Echo, Exclaim>());
    let services = base_services(&log)
        .add_singleton(|_| Ok(PingHandler))
        .add_singleton(|_| Ok(RejectEmpty))
        .add_singleton(|_| Ok(Exclaim))
        .build();
    let (dispatcher, _) = dispatcher(registry, services);

    assert_eq!(dispatcher.send(&Echo::new("hi")).await.unwrap(), "hi!");
    assert_eq!(dispatcher.send(&Ping).await.unwrap(), 1);
    assert!(dispatcher.pipeline_behaviors::<Ping>().unwrap().is_empty());
    assert_eq!(dispatcher.pipeline_behaviors::<Echo>().unwrap().len(), 2);

    let err = dispatcher.send(&Echo::new("")).await.unwrap_err();
    let rejected = err.handler_error().and_then(|e| e.downcast_ref::<Rejected>());
    assert_eq!(rejected.map(|r| r.0.as_str()), Some("empty message"));
    assert_eq!(log.entries(), vec!["H"]);
}

#[tokio::test]
async fn test_when_filter_excludes_request_types() {
    let log = Arc::new(CallLog::default());
    let registry = echo_registry();
    registry.register_request_handler::<Ping, PingHandler>();
    let ping = TypeKey::of::<Ping>();
    registry.register_behavior(BehaviorDefinition::open::<Recording<'A'>>().when(move |info| info.request != ping));
    let services = base_services(&log).add_singleton(|_| Ok(PingHandler)).build();
    let (dispatcher, _) = dispatcher(registry, services);

    dispatcher.send(&Ping).await.unwrap();
    assert!(log.entries().is_empty());

    dispatcher.send(&Echo::new("hi")).await.unwrap();
    assert_eq!(log.entries(), vec!["A-enter", "H", "A-exit"]);
}

#[tokio::test]
async fn test_short_circuit_with_wrong_type_is_reported() {
    let log = Arc::new(CallLog::default());
    let registry = echo_registry();
    registry.register_behavior(BehaviorDefinition::open::<WrongType>());
    let services = base_services(&log).add_singleton(|_| Ok(WrongType)).build();
    let (dispatcher, _) = dispatcher(registry, services);

    let err = dispatcher.send(&Echo::new("hi")).await.unwrap_err();
    match err {
        MediatorError::ResponseTypeMismatch { expected, actual, .. } => {
            assert_eq!(expected, std::any::type_name::<String>());
            assert_eq!(actual, "u32");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_behavior_instances_resolved_per_call() {
    let log = Arc::new(CallLog::default());
    let created = Arc::new(Counter::default());
    let registry = echo_registry();
    registry.register_behavior(BehaviorDefinition::open::<Recording<'C'>>());

    let counter = Arc::clone(&created);
    let services = base_services(&log)
        .add_transient(move |scope| {
            counter.bump();
            Ok(Recording::<'C'> {
                log: scope.get::<CallLog>()?,
            })
        })
        .build();
    let (dispatcher, _) = dispatcher(registry, services);

    for _ in 0..3 {
        dispatcher.send(&Echo::new("hi")).await.unwrap();
    }
    assert_eq!(created.get(), 3);
    assert_eq!(dispatcher.pipeline_builds(), 1);
}

#[tokio::test]
async fn test_behavior_registered_later_is_picked_up() {
    let log = Arc::new(CallLog::default());
    let (dispatcher, _) = dispatcher(echo_registry(), base_services(&log).build());

    dispatcher.send(&Echo::new("first")).await.unwrap();
    dispatcher
        .registry()
        .register_behavior(BehaviorDefinition::open::<Recording<'A'>>());
    dispatcher.send(&Echo::new("second")).await.unwrap();

    assert_eq!(log.entries(), vec!["H", "A-enter", "H", "A-exit"]);
    assert_eq!(dispatcher.pipeline_builds(), 2);
}

#[tokio::test]
async fn test_unregistered_behavior_service_fails_before_handler() {
    let log = Arc::new(CallLog::default());
    let registry = echo_registry();
    registry.register_behavior(BehaviorDefinition::open::<CachedEcho>());
    let (dispatcher, _) = dispatcher(registry, base_services(&log).build());

    let err = dispatcher.send(&Echo::new("hi")).await.unwrap_err();
    assert!(matches!(err, MediatorError::ServiceNotRegistered { .. }));
    assert!(log.entries().is_empty());
    assert!(matches!(dispatcher.warm_up(), Err(MediatorError::ServiceNotRegistered { .. })));
}

#[tokio::test]
async fn test_metrics_behavior_counts_outcomes() {
    let log = Arc::new(CallLog::default());
    let metrics = Arc::new(MetricsBehavior::new());
    let registry = echo_registry();
    registry.register_behavior(BehaviorDefinition::open::<MetricsBehavior>());
    let services = base_services(&log).add_instance(Arc::clone(&metrics)).build();
    let (dispatcher, _) = dispatcher(registry, services);

    dispatcher.send(&Echo::new("a")).await.unwrap();
    dispatcher.send(&Echo::new("b")).await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    dispatcher.send_with(&Echo::new("c"), &cancel).await.unwrap_err();

    assert_eq!(metrics.request_count(), 3);
    assert_eq!(metrics.failure_count(), 0);
    assert_eq!(metrics.cancelled_count(), 1);
    assert_eq!(metrics.requests_for(TypeKey::of::<Echo>()), 3);
}

#[tokio::test]
async fn test_cancellation_behavior_stops_chain() {
    let log = Arc::new(CallLog::default());
    let registry = echo_registry();
    registry.register_behavior(BehaviorDefinition::open::<CancellationBehavior>());
    registry.register_behavior(BehaviorDefinition::open::<Recording<'A'>>());
    let services = base_services(&log)
        .add_singleton(|_| Ok(CancellationBehavior))
        .build();
    let (dispatcher, _) = dispatcher(registry, services);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = dispatcher.send_with(&Echo::new("hi"), &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_tracing_behavior_passes_result_through() {
    let log = Arc::new(CallLog::default());
    let registry = echo_registry();
    registry.register_behavior(BehaviorDefinition::open::<TracingBehavior>());
    let services = base_services(&log).add_singleton(|_| Ok(TracingBehavior)).build();
    let (dispatcher, _) = dispatcher(registry, services);

    assert_eq!(dispatcher.send(&Echo::new("traced")).await.unwrap(), "traced");
    assert_eq!(log.entries(), vec!["H"]);
}
