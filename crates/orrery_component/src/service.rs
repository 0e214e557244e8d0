//! Opaque service values delivered to references.

use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide counter backing [`ServiceId`] allocation.
static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a published service instance.
///
/// Two [`ServiceRef`]s are equal exactly when they share a `ServiceId`, no
/// matter what the instance contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(u64);

impl ServiceId {
    fn next() -> Self {
        Self(NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service_{}", self.0)
    }
}

/// A type-erased, shareable service instance tagged with its interface name.
///
/// The interface name is only a lookup key: references and the
/// [`ServiceRegistry`](crate::ServiceRegistry) match on it, while consumers
/// recover the concrete type with [`downcast`](Self::downcast).
///
/// # Example
///
/// ```
/// use orrery_component::ServiceRef;
///
/// struct Clock;
///
/// let service = ServiceRef::new("clock", Clock);
/// assert_eq!(service.interface(), "clock");
/// assert!(service.downcast::<Clock>().is_some());
/// assert!(service.downcast::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct ServiceRef {
    id: ServiceId,
    interface: Arc<str>,
    instance: Arc<dyn Any + Send + Sync>,
}

impl ServiceRef {
    /// Wraps `instance` as a new service with a fresh [`ServiceId`].
    #[must_use]
    pub fn new<T: Any + Send + Sync>(interface: impl AsRef<str>, instance: T) -> Self {
        Self::from_arc(interface, Arc::new(instance))
    }

    /// Wraps an already shared instance as a new service with a fresh [`ServiceId`].
    #[must_use]
    pub fn from_arc(interface: impl AsRef<str>, instance: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            id: ServiceId::next(),
            interface: Arc::from(interface.as_ref()),
            instance,
        }
    }

    /// Returns the identity of this service.
    #[must_use]
    pub fn id(&self) -> ServiceId {
        self.id
    }

    /// Returns the interface name this service is published under.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Returns the instance as `T`, or `None` if it has another type.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }

    /// Returns the type-erased instance.
    #[must_use]
    pub fn instance(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.instance
    }
}

impl PartialEq for ServiceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceRef {}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("id", &self.id)
            .field("interface", &self.interface)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.interface, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_identity() {
        let a = ServiceRef::new("greeter", 1_u32);
        let b = ServiceRef::new("greeter", 1_u32);

        assert_eq!(a, a.clone());
        assert_ne!(a, b, "same payload, different services");
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ServiceRef::new("x", ());
        let b = ServiceRef::new("x", ());
        assert!(b.id() > a.id());
    }

    #[test]
    fn downcast_recovers_instance() {
        let service = ServiceRef::new("name", String::from("hello"));
        let value = service.downcast::<String>().expect("should downcast");
        assert_eq!(value.as_str(), "hello");
    }

    #[test]
    fn display_includes_interface() {
        let service = ServiceRef::new("store", ());
        assert!(service.to_string().starts_with("store(service_"));
    }
}
