//! # Type Registry
//!
//! Maps each request type to its single handler type, each notification type
//! to its ordered handler list, and keeps the ordered list of global
//! behaviors.
//!
//! ## Semantics
//!
//! - Registering a request type twice overwrites the earlier handler (logged
//!   as a warning, never an error).
//! - Notification registrations append; insertion order is broadcast order.
//! - Behaviors append; registration order is wrapping order, first is outermost.
//!
//! The tables live behind an [`ArcSwap`]: dispatch loads an immutable
//! snapshot without locking, registration copies the tables and swaps the new
//! version in. Every registration bumps the snapshot's generation. Request
//! registrations stamp their type with it and behavior registrations stamp
//! the behavior list, so a cached pipeline is rebuilt only when its own
//! request binding or the behaviors changed.
//!
//! A request's response type is its associated `Request::Response`, so two
//! registrations for one request type can never disagree on it.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::handler::{NotificationHandler, RequestHandler};
use crate::invoker::{compile_notification, compile_request, NotificationInvoker, RequestInvoker};
use crate::message::{Notification, Request, TypeKey};
use crate::pipeline::BehaviorDefinition;

/// Binding of a request type to its handler type.
///
/// Carries the compile function for the pair, instantiated at registration.
#[derive(Clone)]
pub struct RequestBinding {
    request: TypeKey,
    response: TypeKey,
    handler: TypeKey,
    compile: fn() -> Arc<dyn RequestInvoker>,
}

impl RequestBinding {
    #[must_use]
    pub fn new<R, H>() -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        Self {
            request: TypeKey::of::<R>(),
            response: TypeKey::of::<R::Response>(),
            handler: TypeKey::of::<H>(),
            compile: compile_request::<R, H>,
        }
    }

    #[must_use]
    pub fn request_type(&self) -> TypeKey {
        self.request
    }

    #[must_use]
    pub fn response_type(&self) -> TypeKey {
        self.response
    }

    #[must_use]
    pub fn handler_type(&self) -> TypeKey {
        self.handler
    }

    pub(crate) fn compile(&self) -> Arc<dyn RequestInvoker> {
        (self.compile)()
    }
}

/// Binding of a notification type to one of its handler types.
#[derive(Clone)]
pub struct NotificationBinding {
    notification: TypeKey,
    handler: TypeKey,
    compile: fn() -> Arc<dyn NotificationInvoker>,
}

impl NotificationBinding {
    #[must_use]
    pub fn new<N, H>() -> Self
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        Self {
            notification: TypeKey::of::<N>(),
            handler: TypeKey::of::<H>(),
            compile: compile_notification::<N, H>,
        }
    }

    #[must_use]
    pub fn notification_type(&self) -> TypeKey {
        self.notification
    }

    #[must_use]
    pub fn handler_type(&self) -> TypeKey {
        self.handler
    }

    pub(crate) fn compile(&self) -> Arc<dyn NotificationInvoker> {
        (self.compile)()
    }
}

/// One immutable version of the registry.
#[derive(Clone, Default)]
pub(crate) struct RegistryTables {
    pub(crate) generation: u64,
    requests: HashMap<TypeId, RequestBinding>,
    request_generations: HashMap<TypeId, u64>,
    behaviors_generation: u64,
    notifications: HashMap<TypeId, Vec<NotificationBinding>>,
    behaviors: Vec<BehaviorDefinition>,
}

impl RegistryTables {
    pub(crate) fn request(&self, request: TypeKey) -> Option<&RequestBinding> {
        self.requests.get(&request.id())
    }

    pub(crate) fn requests(&self) -> impl Iterator<Item = &RequestBinding> {
        self.requests.values()
    }

    pub(crate) fn notification_handlers(&self, notification: TypeKey) -> &[NotificationBinding] {
        self.notifications
            .get(&notification.id())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn all_notification_handlers(&self) -> impl Iterator<Item = &NotificationBinding> {
        self.notifications.values().flatten()
    }

    pub(crate) fn behaviors(&self) -> &[BehaviorDefinition] {
        &self.behaviors
    }

    /// Latest generation that changed the pipeline of `request`: its own
    /// binding or the behavior list.
    pub(crate) fn pipeline_generation(&self, request: TypeKey) -> u64 {
        self.request_generations
            .get(&request.id())
            .copied()
            .unwrap_or(0)
            .max(self.behaviors_generation)
    }
}

/// Registry of request handlers, notification handlers and global behaviors.
///
/// Shared between dispatchers as `Arc<HandlerRegistry>`; registration takes
/// `&self` so a registry already handed to a dispatcher can still be extended.
pub struct HandlerRegistry {
    tables: ArcSwap<RegistryTables>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            tables: ArcSwap::from_pointee(RegistryTables::default()),
        }
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `H` as the handler of request type `R`, replacing any earlier one.
    pub fn register_request_handler<R, H>(&self)
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.register_request(RequestBinding::new::<R, H>());
    }

    /// Register a prepared request binding, replacing any earlier one for its type.
    pub fn register_request(&self, binding: RequestBinding) {
        let key = binding.request_type().id();
        let previous = self.update(|tables, generation| {
            tables.requests.insert(key, binding.clone());
            tables.request_generations.insert(key, generation);
        });

        if let Some(old) = previous.requests.get(&key) {
            warn!(
                request_type = %binding.request_type(),
                old_handler = %old.handler_type(),
                new_handler = %binding.handler_type(),
                "Replaced existing request handler"
            );
        }
        info!(
            request_type = %binding.request_type(),
            response_type = %binding.response_type(),
            handler_type = %binding.handler_type(),
            generation = previous.generation + 1,
            "Request handler registered"
        );
    }

    /// Append `H` to the handlers of notification type `N`.
    pub fn register_notification_handler<N, H>(&self)
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.register_notification(NotificationBinding::new::<N, H>());
    }

    /// Append a prepared notification binding to its type's handler list.
    pub fn register_notification(&self, binding: NotificationBinding) {
        let key = binding.notification_type().id();
        let previous = self.update(|tables, _| {
            tables
                .notifications
                .entry(key)
                .or_default()
                .push(binding.clone());
        });

        let position = previous.notifications.get(&key).map_or(0, Vec::len);
        info!(
            notification_type = %binding.notification_type(),
            handler_type = %binding.handler_type(),
            position = position,
            generation = previous.generation + 1,
            "Notification handler registered"
        );
    }

    /// Append a global behavior. The first registered behavior is the outermost.
    pub fn register_behavior(&self, behavior: BehaviorDefinition) {
        let previous = self.update(|tables, generation| {
            tables.behaviors.push(behavior.clone());
            tables.behaviors_generation = generation;
        });

        info!(
            behavior_type = %behavior.behavior_type(),
            position = previous.behaviors.len(),
            generation = previous.generation + 1,
            "Pipeline behavior registered"
        );
    }

    /// Handler type registered for the request type, if any.
    #[must_use]
    pub fn resolve_handler_type(&self, request: TypeKey) -> Option<TypeKey> {
        self.tables
            .load()
            .request(request)
            .map(RequestBinding::handler_type)
    }

    /// Handler types registered for the notification type, in broadcast order.
    #[must_use]
    pub fn resolve_notification_handlers(&self, notification: TypeKey) -> Vec<TypeKey> {
        self.tables
            .load()
            .notification_handlers(notification)
            .iter()
            .map(NotificationBinding::handler_type)
            .collect()
    }

    #[must_use]
    pub fn request_binding(&self, request: TypeKey) -> Option<RequestBinding> {
        self.tables.load().request(request).cloned()
    }

    /// All registered request types, in no particular order.
    #[must_use]
    pub fn request_types(&self) -> Vec<TypeKey> {
        self.tables
            .load()
            .requests()
            .map(RequestBinding::request_type)
            .collect()
    }

    #[must_use]
    pub fn behavior_count(&self) -> usize {
        self.tables.load().behaviors.len()
    }

    /// Number of registrations applied so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.tables.load().generation
    }

    pub(crate) fn snapshot(&self) -> Arc<RegistryTables> {
        self.tables.load_full()
    }

    /// Copy, modify and swap in the tables. `apply` receives the generation
    /// the new tables will carry. Returns the replaced version.
    fn update<F>(&self, apply: F) -> Arc<RegistryTables>
    where
        F: Fn(&mut RegistryTables, u64),
    {
        self.tables.rcu(|current| {
            let mut next = RegistryTables::clone(current);
            next.generation = current.generation + 1;
            let generation = next.generation;
            apply(&mut next, generation);
            next
        })
    }
}
