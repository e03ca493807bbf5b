use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::MediatorError;
use crate::message::{ErasedResponse, TypeKey};
use crate::pipeline::{Next, PipelineBehavior, RequestContext};

/// Behavior collecting request counters.
///
/// All counters are atomics updated with `Ordering::Relaxed`; readings are
/// eventually consistent. Register it as a singleton (for example with
/// [`ServiceCollection::add_instance`](crate::services::ServiceCollection::add_instance))
/// so every call feeds the same counters.
///
/// Metrics collected:
/// - Total request count, and per request type
/// - Failure count, cancellations counted separately
/// - Average latency
#[derive(Default)]
pub struct MetricsBehavior {
    request_count: AtomicUsize,
    failure_count: AtomicUsize,
    cancelled_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    per_type: DashMap<TypeKey, usize>,
}

impl MetricsBehavior {
    /// Create a metrics behavior with all counters initialized to zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of requests observed
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Requests that returned an error, cancellations excluded
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.cancelled_count.load(Ordering::Relaxed)
    }

    /// Requests observed for one request type
    #[must_use]
    pub fn requests_for(&self, request_type: TypeKey) -> usize {
        self.per_type.get(&request_type).map_or(0, |count| *count)
    }

    /// Calculate the average request latency
    ///
    /// Returns zero duration if no requests have been processed yet.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    fn observe(&self, request_type: TypeKey, latency: Duration, result: &anyhow::Result<ErasedResponse>) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let latency_ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.total_latency_ns.fetch_add(latency_ns, Ordering::Relaxed);
        *self.per_type.entry(request_type).or_insert(0) += 1;

        if let Err(err) = result {
            let cancelled = err
                .downcast_ref::<MediatorError>()
                .is_some_and(MediatorError::is_cancelled);
            if cancelled {
                self.cancelled_count.fetch_add(1, Ordering::Relaxed);
            } else {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[async_trait]
impl PipelineBehavior for MetricsBehavior {
    async fn handle(&self, ctx: RequestContext<'_>, next: Next<'_>) -> anyhow::Result<ErasedResponse> {
        let started = Instant::now();
        let result = next.run().await;
        self.observe(ctx.request_type(), started.elapsed(), &result);
        result
    }
}
