//! # Services Module
//!
//! The dependency-resolution context the dispatcher consumes. Handlers and
//! behaviors are never constructed by the dispatcher itself; it asks a
//! [`ServiceScope`] for an instance of the registered type on every call.
//!
//! ## Scopes
//!
//! Each `send` and each `publish` opens exactly one scope via
//! [`ServiceProvider::begin_scope`]. All notification handlers of one publish
//! share that scope, so scoped services (a unit of work, a DB transaction) are
//! shared across the handlers of one event but never across calls. The scope
//! ends when the returned box drops, which happens on every exit path.
//!
//! ## Default container
//!
//! [`ServiceCollection`] builds a [`ServiceContainer`] supporting singleton,
//! scoped, and transient lifetimes:
//!
//! ```rust
//! use brrtmediator::services::{ServiceCollection, ServiceProvider};
//!
//! struct Clock;
//!
//! let container = ServiceCollection::new()
//!     .add_singleton(|_| Ok(Clock))
//!     .build();
//!
//! let scope = container.begin_scope();
//! let clock = scope.get::<Clock>().unwrap();
//! # let _ = clock;
//! ```

mod container;

pub use container::{Lifetime, ServiceCollection, ServiceContainer};

use std::any::Any;
use std::sync::Arc;

use crate::error::{MediatorError, Result};
use crate::message::TypeKey;

/// Type-erased service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Opens resolution scopes.
pub trait ServiceProvider: Send + Sync {
    /// Begin a new scope. Scoped instances live until the box is dropped.
    fn begin_scope(&self) -> Box<dyn ServiceScope + '_>;

    /// Whether `key` has a registration, without creating anything.
    ///
    /// Used by warm-up to report missing handlers and behaviors before the
    /// first call. Providers that cannot tell should return `true`.
    fn can_resolve(&self, _key: TypeKey) -> bool {
        true
    }
}

/// Resolves instances by type within one scope.
pub trait ServiceScope: Send + Sync {
    /// Resolve an instance of the type identified by `key`.
    fn resolve_any(&self, key: TypeKey) -> Result<ServiceInstance>;
}

impl dyn ServiceScope + '_ {
    /// Resolve an instance of `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        let instance = self.resolve_any(key)?;
        instance
            .downcast::<T>()
            .map_err(|_| MediatorError::ServiceResolution {
                type_name: key.name(),
                source: anyhow::anyhow!("scope returned an instance of another type"),
            })
    }
}
