use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{ServiceInstance, ServiceProvider, ServiceScope};
use crate::error::{MediatorError, Result};
use crate::message::TypeKey;

type Factory = Arc<dyn Fn(&dyn ServiceScope) -> anyhow::Result<ServiceInstance> + Send + Sync>;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Created once on first resolve and shared by every scope.
    Singleton,
    /// Created once per scope and dropped with it.
    Scoped,
    /// Created on every resolve.
    Transient,
}

struct ServiceDescriptor {
    key: TypeKey,
    lifetime: Lifetime,
    factory: Factory,
    singleton: OnceCell<ServiceInstance>,
}

impl ServiceDescriptor {
    fn create(&self, scope: &dyn ServiceScope) -> Result<ServiceInstance> {
        (self.factory)(scope).map_err(|source| MediatorError::ServiceResolution {
            type_name: self.key.name(),
            source,
        })
    }
}

/// Builder collecting service registrations.
///
/// Registering the same type twice replaces the earlier registration.
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: HashMap<TypeId, ServiceDescriptor>,
}

impl ServiceCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lazily created singleton.
    #[must_use]
    pub fn add_singleton<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ServiceScope) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.add::<T, F>(Lifetime::Singleton, factory)
    }

    /// Register an already shared instance as a singleton.
    ///
    /// Useful when the caller keeps its own handle, e.g. a metrics sink.
    #[must_use]
    pub fn add_instance<T>(self, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let factory: Factory = Arc::new(move |_: &dyn ServiceScope| {
            let shared: ServiceInstance = Arc::clone(&instance) as ServiceInstance;
            Ok(shared)
        });
        self.insert(key, Lifetime::Singleton, factory)
    }

    /// Register a service created once per scope.
    #[must_use]
    pub fn add_scoped<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ServiceScope) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.add::<T, F>(Lifetime::Scoped, factory)
    }

    /// Register a service created on every resolve.
    #[must_use]
    pub fn add_transient<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ServiceScope) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.add::<T, F>(Lifetime::Transient, factory)
    }

    fn add<T, F>(self, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ServiceScope) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |scope: &dyn ServiceScope| {
            let instance: ServiceInstance = Arc::new(factory(scope)?);
            Ok(instance)
        });
        self.insert(TypeKey::of::<T>(), lifetime, factory)
    }

    fn insert(mut self, key: TypeKey, lifetime: Lifetime, factory: Factory) -> Self {
        let descriptor = ServiceDescriptor {
            key,
            lifetime,
            factory,
            singleton: OnceCell::new(),
        };
        if self.descriptors.insert(key.id(), descriptor).is_some() {
            warn!(
                service_type = %key,
                lifetime = ?lifetime,
                "Replaced existing service registration"
            );
        }
        self
    }

    #[must_use]
    pub fn build(self) -> ServiceContainer {
        ServiceContainer {
            descriptors: self
                .descriptors
                .into_iter()
                .map(|(id, d)| (id, Arc::new(d)))
                .collect(),
            scopes_opened: AtomicU64::new(0),
        }
    }
}

/// Default [`ServiceProvider`] built from a [`ServiceCollection`].
pub struct ServiceContainer {
    descriptors: HashMap<TypeId, Arc<ServiceDescriptor>>,
    scopes_opened: AtomicU64,
}

impl ServiceContainer {
    #[must_use]
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.descriptors.contains_key(&TypeId::of::<T>())
    }

    #[must_use]
    pub fn lifetime_of<T: 'static>(&self) -> Option<Lifetime> {
        self.descriptors
            .get(&TypeId::of::<T>())
            .map(|d| d.lifetime)
    }

    /// Number of scopes opened so far.
    #[must_use]
    pub fn scopes_opened(&self) -> u64 {
        self.scopes_opened.load(Ordering::Relaxed)
    }
}

impl ServiceProvider for ServiceContainer {
    fn begin_scope(&self) -> Box<dyn ServiceScope + '_> {
        let scope_no = self.scopes_opened.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(scope_no = scope_no, "Service scope opened");
        Box::new(ContainerScope {
            container: self,
            scope_no,
            scoped: Mutex::new(HashMap::new()),
        })
    }

    fn can_resolve(&self, key: TypeKey) -> bool {
        self.descriptors.contains_key(&key.id())
    }
}

struct ContainerScope<'c> {
    container: &'c ServiceContainer,
    scope_no: u64,
    scoped: Mutex<HashMap<TypeId, ServiceInstance>>,
}

impl ServiceScope for ContainerScope<'_> {
    fn resolve_any(&self, key: TypeKey) -> Result<ServiceInstance> {
        let descriptor = self
            .container
            .descriptors
            .get(&key.id())
            .ok_or(MediatorError::ServiceNotRegistered {
                type_name: key.name(),
            })?;

        match descriptor.lifetime {
            Lifetime::Singleton => descriptor
                .singleton
                .get_or_try_init(|| descriptor.create(self))
                .map(Arc::clone),
            Lifetime::Scoped => {
                if let Some(found) = self.scoped.lock().get(&key.id()) {
                    return Ok(Arc::clone(found));
                }
                // Lock released while the factory runs so it can resolve other
                // scoped services. First writer wins if two resolves race.
                let created = descriptor.create(self)?;
                let mut scoped = self.scoped.lock();
                Ok(Arc::clone(scoped.entry(key.id()).or_insert(created)))
            }
            Lifetime::Transient => descriptor.create(self),
        }
    }
}

impl Drop for ContainerScope<'_> {
    fn drop(&mut self) {
        let released = self.scoped.get_mut().len();
        debug!(
            scope_no = self.scope_no,
            released = released,
            "Service scope released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    struct UnitOfWork {
        id: usize,
    }

    fn container() -> ServiceContainer {
        let created = Arc::new(AtomicUsize::new(0));
        ServiceCollection::new()
            .add_singleton(|_| Ok(Counter(AtomicUsize::new(0))))
            .add_scoped(move |_| {
                Ok(UnitOfWork {
                    id: created.fetch_add(1, Ordering::SeqCst),
                })
            })
            .add_transient(|scope| {
                let counter = scope.get::<Counter>()?;
                Ok(counter.0.fetch_add(1, Ordering::SeqCst))
            })
            .build()
    }

    #[test]
    fn test_singleton_shared_across_scopes() {
        let container = container();
        let a = container.begin_scope().get::<Counter>().unwrap();
        let b = container.begin_scope().get::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(container.lifetime_of::<Counter>(), Some(Lifetime::Singleton));
    }

    #[test]
    fn test_scoped_instance_per_scope() {
        let container = container();
        let scope = container.begin_scope();
        let first = scope.get::<UnitOfWork>().unwrap();
        let again = scope.get::<UnitOfWork>().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let other = container.begin_scope().get::<UnitOfWork>().unwrap();
        assert_ne!(first.id, other.id);
        assert_eq!(container.scopes_opened(), 2);
    }

    #[test]
    fn test_transient_resolves_dependencies() {
        let container = container();
        let scope = container.begin_scope();
        assert_eq!(*scope.get::<usize>().unwrap(), 0);
        assert_eq!(*scope.get::<usize>().unwrap(), 1);
    }

    #[test]
    fn test_missing_service() {
        let container = container();
        let scope = container.begin_scope();
        let err = scope.get::<String>().unwrap_err();
        assert!(matches!(err, MediatorError::ServiceNotRegistered { .. }));
        assert!(!container.is_registered::<String>());
    }
}
