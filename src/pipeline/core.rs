use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::behavior::{ClosedBehavior, Next, PipelineBehavior, RequestContext, RequestInfo, Terminal};
use crate::error::{MediatorError, Result};
use crate::ids::DispatchId;
use crate::invoker::{InvokerCache, RequestInvoker};
use crate::message::{ErasedResponse, TypeKey};
use crate::registry::RegistryTables;
use crate::services::ServiceScope;

/// Most requests carry only a handful of behaviors.
const MAX_INLINE_BEHAVIORS: usize = 4;

type BehaviorVec = SmallVec<[ClosedBehavior; MAX_INLINE_BEHAVIORS]>;
type InstanceVec = SmallVec<[Arc<dyn PipelineBehavior>; MAX_INLINE_BEHAVIORS]>;

/// Composed chain for one request type: behaviors outermost-first, then the
/// compiled handler invoker.
///
/// The chain shape is cached; handler and behavior instances are resolved
/// from the call's scope on every execution.
pub(crate) struct Pipeline {
    info: RequestInfo,
    invoker: Arc<dyn RequestInvoker>,
    behaviors: BehaviorVec,
    generation: u64,
}

impl Pipeline {
    pub(crate) fn info(&self) -> &RequestInfo {
        &self.info
    }

    pub(crate) fn behavior_types(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.behaviors.iter().map(|b| b.behavior)
    }

    /// Resolve the handler, then the behaviors, then run the chain.
    pub(crate) async fn execute(
        &self,
        scope: &dyn ServiceScope,
        request: &(dyn Any + Send + Sync),
        cancel: &CancellationToken,
        dispatch_id: DispatchId,
    ) -> Result<ErasedResponse> {
        let handler = scope.resolve_any(self.info.handler)?;

        let mut instances = InstanceVec::with_capacity(self.behaviors.len());
        for behavior in &self.behaviors {
            instances.push(behavior.activate(scope)?);
        }

        let terminal = Terminal {
            invoker: Arc::clone(&self.invoker),
            handler,
        };
        let next = Next {
            behaviors: &instances,
            terminal: &terminal,
            ctx: RequestContext {
                info: &self.info,
                request,
                cancel,
                dispatch_id,
            },
        };
        next.run().await.map_err(MediatorError::from)
    }
}

/// Pipelines memoized per request type.
///
/// Entries remember the pipeline generation of their request type (its
/// binding or the behavior list, whichever changed last) and are rebuilt once
/// the registry moves past it. Unrelated registrations leave them alone. Concurrent first builds for one
/// type serialize on the map entry; only one build is stored and counted.
#[derive(Default)]
pub(crate) struct PipelineCache {
    pipelines: DashMap<TypeId, Arc<Pipeline>>,
    builds: AtomicUsize,
}

impl PipelineCache {
    pub(crate) fn get_or_build(
        &self,
        tables: &RegistryTables,
        request: TypeKey,
        invokers: &InvokerCache,
    ) -> Result<Arc<Pipeline>> {
        let generation = tables.pipeline_generation(request);
        if let Some(cached) = self.pipelines.get(&request.id()) {
            if cached.generation == generation {
                return Ok(Arc::clone(cached.value()));
            }
        }

        match self.pipelines.entry(request.id()) {
            Entry::Occupied(mut entry) => {
                // A newer snapshot may already have rebuilt it.
                if entry.get().generation >= generation {
                    return Ok(Arc::clone(entry.get()));
                }
                let pipeline = self.build(tables, request, invokers)?;
                entry.insert(Arc::clone(&pipeline));
                Ok(pipeline)
            }
            Entry::Vacant(entry) => {
                let pipeline = self.build(tables, request, invokers)?;
                entry.insert(Arc::clone(&pipeline));
                Ok(pipeline)
            }
        }
    }

    fn build(&self, tables: &RegistryTables, request: TypeKey, invokers: &InvokerCache) -> Result<Arc<Pipeline>> {
        let binding = tables.request(request).ok_or(MediatorError::NoHandler {
            request_type: request.name(),
        })?;
        let invoker = invokers.request_invoker(binding);
        let info = RequestInfo {
            request: binding.request_type(),
            response: binding.response_type(),
            handler: binding.handler_type(),
        };
        let behaviors: BehaviorVec = tables
            .behaviors()
            .iter()
            .filter_map(|definition| definition.close(&info))
            .collect();

        let build_no = self.builds.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            request_type = %info.request,
            handler_type = %info.handler,
            behaviors = behaviors.len(),
            generation = tables.pipeline_generation(request),
            build_no = build_no,
            "Pipeline built"
        );
        for (position, behavior) in behaviors.iter().enumerate() {
            debug!(
                request_type = %info.request,
                behavior_type = %behavior.behavior,
                position = position,
                "Pipeline behavior attached"
            );
        }

        Ok(Arc::new(Pipeline {
            info,
            invoker,
            behaviors,
            generation: tables.pipeline_generation(request),
        }))
    }

    /// Number of pipelines built so far, rebuilds included.
    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub(crate) fn len(&self) -> usize {
        self.pipelines.len()
    }
}
