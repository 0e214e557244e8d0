//! Explicit service registry driving bind/unbind notifications.
//!
//! The [`ServiceRegistry`] stands between whatever discovers services (a
//! module system, a test, a graph-backed host) and the
//! components that consume them. Components are tracked by weak reference,
//! and the registry lock is never held while a component is called, so
//! component callbacks are free to look services up.
//!
//! Binding is reluctant: a reference that is already bound is left alone
//! when another matching service appears.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::component::{Component, ComponentId};
use crate::error::ComponentError;
use crate::reference::Policy;
use crate::service::ServiceRef;

/// Outcome of a registry operation that notified components.
///
/// Failures are expected dependency churn (an activation routine failing, a
/// component torn down concurrently) and are collected here rather than
/// propagated.
#[derive(Debug, Default)]
pub struct NotifyReport {
    /// Number of references that received a value.
    pub bound: usize,
    /// Number of references that lost a value.
    pub unbound: usize,
    /// Errors returned by notified components.
    pub failures: Vec<ComponentError>,
}

impl NotifyReport {
    /// Returns true if no notified component reported an error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_bind(&mut self, component: &Component, result: Result<Option<ServiceRef>, ComponentError>) {
        match result {
            Ok(_) => self.bound += 1,
            // Lost a race with another notifier; the reference is already bound.
            Err(ComponentError::PolicyViolation { .. }) => {}
            Err(error) => {
                tracing::warn!(component = %component, %error, "bind notification failed");
                self.failures.push(error);
            }
        }
    }
}

struct Tracked {
    id: ComponentId,
    component: Weak<Component>,
}

#[derive(Default)]
struct RegistryInner {
    /// Services in registration order.
    services: Vec<ServiceRef>,
    tracked: Vec<Tracked>,
}

impl RegistryInner {
    fn live_components(&mut self) -> Vec<Arc<Component>> {
        self.tracked.retain(|t| t.component.strong_count() > 0);
        self.tracked
            .iter()
            .filter_map(|t| t.component.upgrade())
            .collect()
    }
}

/// Registry of published services and the components consuming them.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use orrery_component::{
///     Component, ComponentDescriptor, ComponentState, ReferenceDescriptor, ServiceRef, ServiceRegistry,
/// };
///
/// let registry = ServiceRegistry::new();
/// let component = Arc::new(Component::new(
///     ComponentDescriptor::new("consumer").reference(ReferenceDescriptor::mandatory("db", "database")),
/// ));
/// registry.track(&component);
/// assert_eq!(component.state(), ComponentState::Unsatisfied);
///
/// let db = ServiceRef::new("database", ());
/// registry.register(db.clone());
/// assert_eq!(component.state(), ComponentState::Active);
///
/// registry.unregister(&db);
/// assert_eq!(component.state(), ComponentState::Unsatisfied);
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    inner: RwLock<RegistryInner>,
    notify: Mutex<()>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `service` and binds it into every tracked component with an
    /// unbound reference of the same interface.
    ///
    /// Registering the same service twice is a no-op.
    pub fn register(&self, service: ServiceRef) -> NotifyReport {
        let _notify = self.notify.lock();
        let components = {
            let mut inner = self.inner.write();
            if inner.services.contains(&service) {
                return NotifyReport::default();
            }
            inner.services.push(service.clone());
            inner.live_components()
        };

        tracing::debug!(%service, "service registered");

        let mut report = NotifyReport::default();
        for component in components {
            for reference in component.descriptor().references() {
                if reference.interface() != service.interface() || component.is_bound(reference.name())
                {
                    continue;
                }
                let result = component.bind(reference.name(), service.clone());
                report.record_bind(&component, result);
            }
        }
        report
    }

    /// Withdraws `service`, unbinding it everywhere it is bound.
    ///
    /// Where another service of the same interface is still registered, it
    /// is bound as a replacement. Dynamic references are swapped in place so
    /// their component never deactivates.
    pub fn unregister(&self, service: &ServiceRef) -> NotifyReport {
        let _notify = self.notify.lock();
        let (components, replacement) = {
            let mut inner = self.inner.write();
            let Some(position) = inner.services.iter().position(|s| s == service) else {
                return NotifyReport::default();
            };
            inner.services.remove(position);
            let replacement = inner
                .services
                .iter()
                .find(|s| s.interface() == service.interface())
                .cloned();
            (inner.live_components(), replacement)
        };

        tracing::debug!(%service, "service unregistered");

        let mut report = NotifyReport::default();
        for component in components {
            for reference in component.descriptor().references() {
                if reference.interface() != service.interface()
                    || component.reference(reference.name()).as_ref() != Some(service)
                {
                    continue;
                }

                if let Some(replacement) = &replacement
                    && reference.policy() == Policy::Dynamic
                {
                    report.unbound += 1;
                    let result = component.bind(reference.name(), replacement.clone());
                    report.record_bind(&component, result);
                    continue;
                }

                match component.unbind(reference.name(), service) {
                    Ok(true) => report.unbound += 1,
                    Ok(false) => continue,
                    Err(error) => {
                        tracing::warn!(component = %component, %error, "unbind notification failed");
                        report.failures.push(error);
                    }
                }
                if let Some(replacement) = &replacement {
                    let result = component.bind(reference.name(), replacement.clone());
                    report.record_bind(&component, result);
                }
            }
        }
        report
    }

    /// Starts delivering notifications to `component` and binds every
    /// currently registered service its unbound references match.
    pub fn track(&self, component: &Arc<Component>) -> NotifyReport {
        let _notify = self.notify.lock();
        let services = {
            let mut inner = self.inner.write();
            if !inner.tracked.iter().any(|t| t.id == component.id()) {
                inner.tracked.push(Tracked {
                    id: component.id(),
                    component: Arc::downgrade(component),
                });
            }
            inner.services.clone()
        };

        let mut report = NotifyReport::default();
        for reference in component.descriptor().references() {
            if component.is_bound(reference.name()) {
                continue;
            }
            if let Some(service) = services.iter().find(|s| s.interface() == reference.interface()) {
                let result = component.bind(reference.name(), service.clone());
                report.record_bind(component, result);
            }
        }
        report
    }

    /// Stops delivering notifications to the component with `id`.
    ///
    /// Bound references are left as they are; the owner deactivates the
    /// component to release them.
    pub fn untrack(&self, id: ComponentId) -> bool {
        let mut inner = self.inner.write();
        let before = inner.tracked.len();
        inner.tracked.retain(|t| t.id != id);
        inner.tracked.len() != before
    }

    /// Returns the earliest registered service for `interface`.
    #[must_use]
    pub fn lookup(&self, interface: &str) -> Option<ServiceRef> {
        self.inner
            .read()
            .services
            .iter()
            .find(|s| s.interface() == interface)
            .cloned()
    }

    /// Returns every service registered for `interface`, in registration order.
    #[must_use]
    pub fn lookup_all(&self, interface: &str) -> Vec<ServiceRef> {
        self.inner
            .read()
            .services
            .iter()
            .filter(|s| s.interface() == interface)
            .cloned()
            .collect()
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.inner.read().services.len()
    }

    /// Returns the number of tracked components still alive.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner
            .read()
            .tracked
            .iter()
            .filter(|t| t.component.strong_count() > 0)
            .count()
    }
}

impl core::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ServiceRegistry")
            .field("services", &inner.services)
            .field("tracked", &inner.tracked.len())
            .finish()
    }
}
