//! Message model: requests, notifications, and the type keys that route them.
//!
//! A [`Request`] expects exactly one handler and declares its response type as
//! an associated type. A [`Notification`] is broadcast to zero or more handlers
//! and produces no response.
//!
//! Every registry and cache in the crate is keyed by [`TypeKey`], which pairs a
//! `TypeId` (for lookups) with the type name (for logs and errors).

use std::any::{type_name, Any, TypeId};
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

/// A message handled by exactly one [`RequestHandler`](crate::RequestHandler).
pub trait Request: Send + Sync + 'static {
    /// The value the handler produces.
    type Response: Send + 'static;
}

/// A message broadcast to every registered
/// [`NotificationHandler`](crate::NotificationHandler).
pub trait Notification: Send + Sync + 'static {}

/// Runtime identity of a Rust type: `TypeId` plus its name.
///
/// Equality and hashing only consider the `TypeId`.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path (`app::cmd::Echo` -> `Echo`).
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        // Generic names keep their full path so parameters stay readable.
        if self.name.contains('<') {
            return self.name;
        }
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Display for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Object-safe view of any [`Request`], used by
/// [`Dispatcher::send_dyn`](crate::Dispatcher::send_dyn).
pub trait DynRequest: Send + Sync {
    /// Key of the concrete request type.
    fn request_key(&self) -> TypeKey;
    /// Key of the declared response type.
    fn response_key(&self) -> TypeKey;
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

impl<R: Request> DynRequest for R {
    fn request_key(&self) -> TypeKey {
        TypeKey::of::<R>()
    }

    fn response_key(&self) -> TypeKey {
        TypeKey::of::<R::Response>()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

/// Object-safe view of any [`Notification`], used by
/// [`Dispatcher::publish_dyn`](crate::Dispatcher::publish_dyn).
pub trait DynNotification: Send + Sync {
    fn notification_key(&self) -> TypeKey;
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

impl<N: Notification> DynNotification for N {
    fn notification_key(&self) -> TypeKey {
        TypeKey::of::<N>()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

/// A response travelling through the behavior chain with its type erased.
///
/// Produced by the terminal handler invocation or by a short-circuiting
/// behavior, and converted back to the request's declared response type by
/// [`Dispatcher::send`](crate::Dispatcher::send).
pub struct ErasedResponse {
    value: Box<dyn Any + Send>,
    key: TypeKey,
}

impl ErasedResponse {
    #[must_use]
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            value: Box::new(value),
            key: TypeKey::of::<T>(),
        }
    }

    /// Key of the contained value's type.
    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.key.id() == TypeId::of::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the value out, or give the response back if it holds another type.
    pub fn downcast<T: 'static>(self) -> Result<T, Self> {
        let key = self.key;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, key }),
        }
    }
}

impl Debug for ErasedResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedResponse")
            .field("type", &self.key.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;
    impl Request for Ping {
        type Response = &'static str;
    }

    #[test]
    fn test_type_key_equality_ignores_name() {
        let a = TypeKey::of::<Ping>();
        let b = TypeKey::of::<Ping>();
        assert_eq!(a, b);
        assert_ne!(a, TypeKey::of::<String>());
        assert!(a.name().ends_with("Ping"));
    }

    #[test]
    fn test_short_name() {
        assert_eq!(TypeKey::of::<Ping>().short_name(), "Ping");
        assert_eq!(TypeKey::of::<u32>().short_name(), "u32");
        assert_eq!(
            TypeKey::of::<Vec<String>>().short_name(),
            TypeKey::of::<Vec<String>>().name()
        );
    }

    #[test]
    fn test_dyn_request_keys() {
        let req: &dyn DynRequest = &Ping;
        assert_eq!(req.request_key(), TypeKey::of::<Ping>());
        assert_eq!(req.response_key(), TypeKey::of::<&'static str>());
        assert!(req.as_any().downcast_ref::<Ping>().is_some());
    }

    #[test]
    fn test_erased_response_downcast() {
        let resp = ErasedResponse::new(42_u32);
        assert!(resp.is::<u32>());
        assert_eq!(resp.downcast_ref::<u32>(), Some(&42));

        let resp = match resp.downcast::<String>() {
            Ok(_) => panic!("u32 must not downcast to String"),
            Err(resp) => resp,
        };
        assert_eq!(resp.key(), TypeKey::of::<u32>());
        assert_eq!(resp.downcast::<u32>().ok(), Some(42));
    }
}
