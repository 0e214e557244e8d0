//! Components and their activation lifecycle.
//!
//! A [`Component`] owns a set of named references and activates only once
//! every mandatory reference is bound. All transitions, validity checks and
//! reference mutations happen under a single per-component lock, so no
//! observer ever sees an active component with a mandatory reference unbound.
//!
//! # State Machine
//!
//! ```text
//!                 all mandatory bound
//!  Unsatisfied ───────────────────────▶ Activating ──ok──▶ Active
//!       ▲                                   │                │
//!       │◀──────────── failure ─────────────┘                │
//!       │                                                    │
//!       │◀──── mandatory unbind ──── Deactivating ◀──────────┘
//!                                         │        explicit deactivate
//!                                         ▼
//!                                    Deactivated (terminal)
//! ```
//!
//! # Callbacks
//!
//! Activation, deactivation and bind/unbind callbacks run while the component
//! lock is held. They receive a [`ComponentContext`] and must not call back
//! into the same component.
//!
//! # Example
//!
//! ```
//! use orrery_component::{Component, ComponentDescriptor, ComponentState, ReferenceDescriptor, ServiceRef};
//!
//! let descriptor = ComponentDescriptor::new("greeter")
//!     .reference(ReferenceDescriptor::mandatory("store", "store"))
//!     .on_activate(|ctx| {
//!         assert!(ctx.reference("store").is_some());
//!         Ok(())
//!     });
//!
//! let component = Component::new(descriptor);
//! assert_eq!(component.state(), ComponentState::Unsatisfied);
//!
//! component.bind("store", ServiceRef::new("store", ())).unwrap();
//! assert_eq!(component.state(), ComponentState::Active);
//!
//! let greeting = component.with_valid(|ctx| format!("hello from {}", ctx.name())).unwrap();
//! assert!(greeting.starts_with("hello from greeter#"));
//! ```

use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::{BoxError, ComponentError};
use crate::reference::{Cardinality, Policy, ReferenceHandle};
use crate::service::ServiceRef;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

// ─────────────────────────────────────────────────────────────────────────────
// Identity & State
// ─────────────────────────────────────────────────────────────────────────────

/// Stable identity of a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component_{}", self.0)
    }
}

/// Lifecycle state of a [`Component`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    /// At least one mandatory reference is unbound, or activation has not succeeded.
    Unsatisfied,
    /// The activation routine is running.
    Activating,
    /// Activated; business methods are allowed.
    Active,
    /// The deactivation routine is running.
    Deactivating,
    /// Terminal. A fresh component must be created to run again.
    Deactivated,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentState::Unsatisfied => "unsatisfied",
            ComponentState::Activating => "activating",
            ComponentState::Active => "active",
            ComponentState::Deactivating => "deactivating",
            ComponentState::Deactivated => "deactivated",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Activation or deactivation routine.
type LifecycleFn = Arc<dyn Fn(&ComponentContext<'_>) -> Result<(), BoxError> + Send + Sync>;

/// Bind or unbind callback for a single reference.
type BindFn = Arc<dyn Fn(&ComponentContext<'_>, &ServiceRef) + Send + Sync>;

/// Declaration of one reference of a component.
///
/// # Example
///
/// ```
/// use orrery_component::{Cardinality, Policy, ReferenceDescriptor};
///
/// let log = ReferenceDescriptor::optional("log", "logger")
///     .with_policy(Policy::Dynamic)
///     .on_bind(|ctx, service| {
///         tracing::info!(component = ctx.name(), %service, "logger bound");
///     });
///
/// assert_eq!(log.cardinality(), Cardinality::Optional);
/// assert_eq!(log.interface(), "logger");
/// ```
#[derive(Clone)]
pub struct ReferenceDescriptor {
    name: String,
    interface: String,
    cardinality: Cardinality,
    policy: Policy,
    on_bind: Option<BindFn>,
    on_unbind: Option<BindFn>,
}

impl ReferenceDescriptor {
    /// Declares a reference with explicit cardinality and static policy.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        interface: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            interface: interface.into(),
            cardinality,
            policy: Policy::Static,
            on_bind: None,
            on_unbind: None,
        }
    }

    /// Declares a mandatory, static reference.
    #[must_use]
    pub fn mandatory(name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self::new(name, interface, Cardinality::Mandatory)
    }

    /// Declares an optional, static reference.
    #[must_use]
    pub fn optional(name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self::new(name, interface, Cardinality::Optional)
    }

    /// Sets the reference policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Shorthand for `with_policy(Policy::Dynamic)`.
    #[must_use]
    pub fn dynamic(self) -> Self {
        self.with_policy(Policy::Dynamic)
    }

    /// Sets the callback invoked after a value is bound.
    #[must_use]
    pub fn on_bind(
        mut self,
        callback: impl Fn(&ComponentContext<'_>, &ServiceRef) + Send + Sync + 'static,
    ) -> Self {
        self.on_bind = Some(Arc::new(callback));
        self
    }

    /// Sets the callback invoked after a value is unbound or replaced.
    #[must_use]
    pub fn on_unbind(
        mut self,
        callback: impl Fn(&ComponentContext<'_>, &ServiceRef) + Send + Sync + 'static,
    ) -> Self {
        self.on_unbind = Some(Arc::new(callback));
        self
    }

    /// Returns the reference name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the interface name services must be published under.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Returns the cardinality.
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Returns true for mandatory references.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.cardinality == Cardinality::Mandatory
    }
}

impl fmt::Debug for ReferenceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceDescriptor")
            .field("name", &self.name)
            .field("interface", &self.interface)
            .field("cardinality", &self.cardinality)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Declaration of a component: its references and lifecycle callbacks.
///
/// Declaring the same reference name twice replaces the earlier declaration.
#[derive(Clone)]
pub struct ComponentDescriptor {
    name: String,
    references: Vec<ReferenceDescriptor>,
    on_activate: Option<LifecycleFn>,
    on_deactivate: Option<LifecycleFn>,
}

impl ComponentDescriptor {
    /// Creates a descriptor with no references and no callbacks.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: Vec::new(),
            on_activate: None,
            on_deactivate: None,
        }
    }

    /// Adds a reference declaration.
    #[must_use]
    pub fn reference(mut self, reference: ReferenceDescriptor) -> Self {
        self.references.retain(|r| r.name != reference.name);
        self.references.push(reference);
        self
    }

    /// Sets the activation routine.
    #[must_use]
    pub fn on_activate(
        mut self,
        routine: impl Fn(&ComponentContext<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.on_activate = Some(Arc::new(routine));
        self
    }

    /// Sets the deactivation routine.
    #[must_use]
    pub fn on_deactivate(
        mut self,
        routine: impl Fn(&ComponentContext<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.on_deactivate = Some(Arc::new(routine));
        self
    }

    /// Returns the descriptor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared references in declaration order.
    #[must_use]
    pub fn references(&self) -> &[ReferenceDescriptor] {
        &self.references
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("references", &self.references)
            .field("has_activate", &self.on_activate.is_some())
            .field("has_deactivate", &self.on_deactivate.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ComponentContext
// ─────────────────────────────────────────────────────────────────────────────

/// View of a component handed to callbacks and guarded business methods.
pub struct ComponentContext<'a> {
    id: ComponentId,
    name: &'a str,
    references: &'a HashMap<String, ReferenceSlot>,
}

impl ComponentContext<'_> {
    /// Returns the component id.
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Returns the component instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns the value bound to `reference`, if any.
    #[must_use]
    pub fn reference(&self, reference: &str) -> Option<ServiceRef> {
        self.references.get(reference).and_then(|slot| slot.handle.get())
    }

    /// Returns the value bound to `reference` downcast to `T`.
    #[must_use]
    pub fn service<T: Any + Send + Sync>(&self, reference: &str) -> Option<Arc<T>> {
        self.reference(reference).and_then(|s| s.downcast::<T>())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Component
// ─────────────────────────────────────────────────────────────────────────────

struct ReferenceSlot {
    handle: ReferenceHandle<ServiceRef>,
    on_bind: Option<BindFn>,
    on_unbind: Option<BindFn>,
}

struct ComponentInner {
    state: ComponentState,
    valid: bool,
    references: HashMap<String, ReferenceSlot>,
}

/// A unit with declared dependencies that activates only once all mandatory
/// dependencies are bound.
///
/// Every method is safe to call from any thread. Bind and unbind
/// notifications may race freely with [`activate`](Self::activate),
/// [`deactivate`](Self::deactivate) and guarded business calls.
pub struct Component {
    id: ComponentId,
    name: String,
    descriptor: ComponentDescriptor,
    inner: Mutex<ComponentInner>,
}

impl Component {
    /// Constructs an unsatisfied component from its descriptor.
    #[must_use]
    pub fn new(descriptor: ComponentDescriptor) -> Self {
        let id = ComponentId::next();
        let name = format!("{}#{}", descriptor.name, id.0);
        let references = descriptor
            .references
            .iter()
            .map(|r| {
                let slot = ReferenceSlot {
                    handle: ReferenceHandle::new(r.name.clone(), r.cardinality, r.policy),
                    on_bind: r.on_bind.clone(),
                    on_unbind: r.on_unbind.clone(),
                };
                (r.name.clone(), slot)
            })
            .collect();

        tracing::debug!(component = %name, "component constructed");

        Self {
            id,
            name,
            descriptor,
            inner: Mutex::new(ComponentInner {
                state: ComponentState::Unsatisfied,
                valid: false,
                references,
            }),
        }
    }

    /// Returns the component id.
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Returns the instance name (`"<descriptor name>#<n>"`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the descriptor this component was built from.
    #[must_use]
    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.descriptor
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ComponentState {
        self.inner.lock().state
    }

    /// Returns whether business methods are currently allowed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.lock().valid
    }

    /// Returns the value bound to `reference`, if any.
    #[must_use]
    pub fn reference(&self, reference: &str) -> Option<ServiceRef> {
        let inner = self.inner.lock();
        inner
            .references
            .get(reference)
            .and_then(|slot| slot.handle.get())
    }

    /// Returns true if `reference` is declared and currently bound.
    #[must_use]
    pub fn is_bound(&self, reference: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .references
            .get(reference)
            .is_some_and(|slot| slot.handle.is_bound())
    }

    /// Returns the names of mandatory references that are currently unbound.
    #[must_use]
    pub fn missing_references(&self) -> Vec<String> {
        Self::missing(&self.inner.lock())
    }

    /// Fails with [`ComponentError::InvalidState`] unless the component is active.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidState`] when `valid` is false.
    pub fn assert_valid(&self) -> Result<(), ComponentError> {
        let inner = self.inner.lock();
        self.check_valid(&inner)
    }

    /// Runs a business method under the component lock after checking validity.
    ///
    /// A call racing with deactivation either completes before the
    /// deactivation routine starts or fails fast.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidState`] when the component is not active.
    pub fn with_valid<R>(
        &self,
        f: impl FnOnce(&ComponentContext<'_>) -> R,
    ) -> Result<R, ComponentError> {
        let inner = self.inner.lock();
        self.check_valid(&inner)?;
        Ok(f(&self.context(&inner)))
    }

    /// Explicitly activates the component.
    ///
    /// Activating an active component is a no-op.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::InvalidState`] if the component was deactivated
    /// - [`ComponentError::Unsatisfied`] if a mandatory reference is unbound
    /// - [`ComponentError::ActivationFailed`] if the activation routine failed
    pub fn activate(&self) -> Result<(), ComponentError> {
        let mut inner = self.inner.lock();
        match inner.state {
            ComponentState::Active => Ok(()),
            ComponentState::Unsatisfied => {
                let missing = Self::missing(&inner);
                if !missing.is_empty() {
                    return Err(ComponentError::Unsatisfied {
                        component: self.name.clone(),
                        missing,
                    });
                }
                self.activate_locked(&mut inner)
            }
            state => Err(ComponentError::InvalidState {
                component: self.name.clone(),
                state,
            }),
        }
    }

    /// Deactivates the component for good and releases every bound reference.
    ///
    /// `valid` is cleared before the deactivation routine runs. Deactivation
    /// routine failures are logged; the component still ends up
    /// [`Deactivated`](ComponentState::Deactivated). Calling this twice is a no-op.
    pub fn deactivate(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            ComponentState::Deactivated => return,
            ComponentState::Active => self.deactivate_locked(&mut inner, ComponentState::Deactivated),
            _ => {
                inner.valid = false;
                inner.state = ComponentState::Deactivated;
            }
        }

        let ctx = self.context(&inner);
        for slot in inner.references.values() {
            if let Some(service) = slot.handle.take()
                && let Some(on_unbind) = &slot.on_unbind
            {
                on_unbind(&ctx, &service);
            }
        }

        tracing::info!(component = %self.name, "component deactivated");
    }

    /// Binds `service` to `reference`, returning the value it replaced.
    ///
    /// Binding a mandatory reference re-evaluates satisfiability and activates
    /// the component once every mandatory reference is bound. Binding a static
    /// optional reference under an active component cycles the component so
    /// the activation routine observes the new value.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::InvalidState`] if the component was deactivated
    /// - [`ComponentError::UnknownReference`] if `reference` is not declared
    /// - [`ComponentError::PolicyViolation`] when rebinding a static reference while active
    /// - [`ComponentError::ActivationFailed`] if the triggered activation failed;
    ///   the value stays bound and the component stays unsatisfied
    pub fn bind(
        &self,
        reference: &str,
        service: ServiceRef,
    ) -> Result<Option<ServiceRef>, ComponentError> {
        let mut inner = self.inner.lock();
        if inner.state == ComponentState::Deactivated {
            tracing::debug!(component = %self.name, reference, %service, "bind after deactivation rejected");
            return Err(ComponentError::InvalidState {
                component: self.name.clone(),
                state: inner.state,
            });
        }

        let active = inner.state == ComponentState::Active;
        let (previous, mandatory, policy) = {
            let slot = self.slot(&inner, reference)?;
            if slot.handle.get().as_ref() == Some(&service) {
                return Ok(None);
            }
            let previous = slot.handle.bind(service.clone(), active)?;

            let ctx = self.context(&inner);
            if let (Some(old), Some(on_unbind)) = (&previous, &slot.on_unbind) {
                on_unbind(&ctx, old);
            }
            if let Some(on_bind) = &slot.on_bind {
                on_bind(&ctx, &service);
            }
            (previous, slot.handle.is_mandatory(), slot.handle.policy())
        };

        tracing::debug!(component = %self.name, reference, %service, "reference bound");

        if mandatory {
            self.reevaluate_locked(&mut inner)?;
        } else if active && policy == Policy::Static {
            self.deactivate_locked(&mut inner, ComponentState::Unsatisfied);
            self.reevaluate_locked(&mut inner)?;
        }

        Ok(previous)
    }

    /// Unbinds `service` from `reference` if it is the bound value.
    ///
    /// Returns whether anything was unbound. Stale notifications (another
    /// value is bound, or the component is already deactivated) are no-ops.
    /// Unbinding a mandatory reference of an active component deactivates it
    /// to [`Unsatisfied`](ComponentState::Unsatisfied) while the reference is
    /// still bound, then clears the reference.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::UnknownReference`] if `reference` is not declared
    /// - [`ComponentError::ActivationFailed`] if a static optional unbind
    ///   cycled the component and reactivation failed
    pub fn unbind(&self, reference: &str, service: &ServiceRef) -> Result<bool, ComponentError> {
        let mut inner = self.inner.lock();
        if inner.state == ComponentState::Deactivated {
            tracing::debug!(component = %self.name, reference, %service, "stale unbind ignored");
            return Ok(false);
        }

        let (mandatory, policy) = {
            let slot = self.slot(&inner, reference)?;
            if slot.handle.get().as_ref() != Some(service) {
                tracing::debug!(component = %self.name, reference, %service, "stale unbind ignored");
                return Ok(false);
            }
            (slot.handle.is_mandatory(), slot.handle.policy())
        };

        let cycle = inner.state == ComponentState::Active && (mandatory || policy == Policy::Static);
        if cycle {
            self.deactivate_locked(&mut inner, ComponentState::Unsatisfied);
        }

        {
            let slot = self.slot(&inner, reference)?;
            slot.handle.unbind(service);
            if let Some(on_unbind) = &slot.on_unbind {
                on_unbind(&self.context(&inner), service);
            }
        }

        tracing::debug!(component = %self.name, reference, %service, "reference unbound");

        if cycle && !mandatory {
            self.reevaluate_locked(&mut inner)?;
        }

        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    fn context<'a>(&'a self, inner: &'a ComponentInner) -> ComponentContext<'a> {
        ComponentContext {
            id: self.id,
            name: &self.name,
            references: &inner.references,
        }
    }

    fn slot<'a>(
        &self,
        inner: &'a ComponentInner,
        reference: &str,
    ) -> Result<&'a ReferenceSlot, ComponentError> {
        inner
            .references
            .get(reference)
            .ok_or_else(|| ComponentError::UnknownReference {
                component: self.name.clone(),
                reference: reference.to_string(),
            })
    }

    fn check_valid(&self, inner: &ComponentInner) -> Result<(), ComponentError> {
        if inner.valid {
            Ok(())
        } else {
            Err(ComponentError::InvalidState {
                component: self.name.clone(),
                state: inner.state,
            })
        }
    }

    fn missing(inner: &ComponentInner) -> Vec<String> {
        let mut missing: Vec<String> = inner
            .references
            .values()
            .filter(|slot| slot.handle.is_mandatory() && !slot.handle.is_bound())
            .map(|slot| slot.handle.name().to_string())
            .collect();
        missing.sort();
        missing
    }

    /// Activates an unsatisfied component whose mandatory references are all bound.
    fn reevaluate_locked(&self, inner: &mut ComponentInner) -> Result<(), ComponentError> {
        if inner.state == ComponentState::Unsatisfied && Self::missing(inner).is_empty() {
            self.activate_locked(inner)
        } else {
            Ok(())
        }
    }

    fn activate_locked(&self, inner: &mut ComponentInner) -> Result<(), ComponentError> {
        inner.state = ComponentState::Activating;
        tracing::debug!(component = %self.name, "activating");

        let result = match &self.descriptor.on_activate {
            Some(routine) => routine(&self.context(inner)),
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                inner.state = ComponentState::Active;
                inner.valid = true;
                tracing::info!(component = %self.name, "component activated");
                Ok(())
            }
            Err(source) => {
                inner.state = ComponentState::Unsatisfied;
                inner.valid = false;
                tracing::warn!(component = %self.name, error = %source, "activation failed");
                Err(ComponentError::ActivationFailed {
                    component: self.name.clone(),
                    id: self.id,
                    source,
                })
            }
        }
    }

    fn deactivate_locked(&self, inner: &mut ComponentInner, target: ComponentState) {
        inner.valid = false;
        inner.state = ComponentState::Deactivating;
        tracing::debug!(component = %self.name, "deactivating");

        if let Some(routine) = &self.descriptor.on_deactivate
            && let Err(error) = routine(&self.context(inner))
        {
            tracing::warn!(component = %self.name, %error, "deactivation routine failed");
        }

        inner.state = target;
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn failing(_: &ComponentContext<'_>) -> Result<(), BoxError> {
        Err("boom".into())
    }

    #[test]
    fn instance_name_includes_descriptor_name() {
        let component = Component::new(ComponentDescriptor::new("ServiceC1"));
        assert!(component.name().starts_with("ServiceC1#"));
        assert_eq!(component.to_string(), component.name());
    }

    #[test]
    fn no_mandatory_references_requires_explicit_activate() {
        let component = Component::new(
            ComponentDescriptor::new("c")
                .reference(ReferenceDescriptor::optional("opt", "svc").dynamic()),
        );
        component.bind("opt", ServiceRef::new("svc", ())).unwrap();
        assert_eq!(component.state(), ComponentState::Unsatisfied);

        component.activate().unwrap();
        assert_eq!(component.state(), ComponentState::Active);
        assert!(component.is_valid());
    }

    #[test]
    fn activate_reports_missing_references() {
        let component = Component::new(
            ComponentDescriptor::new("c")
                .reference(ReferenceDescriptor::mandatory("b", "b"))
                .reference(ReferenceDescriptor::mandatory("a", "a")),
        );
        let err = component.activate().unwrap_err();
        match err {
            ComponentError::Unsatisfied { missing, .. } => assert_eq!(missing, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_activation_leaves_component_unsatisfied() {
        let component = Component::new(
            ComponentDescriptor::new("c")
                .reference(ReferenceDescriptor::mandatory("dep", "dep"))
                .on_activate(failing),
        );
        let service = ServiceRef::new("dep", ());
        let err = component.bind("dep", service.clone()).unwrap_err();

        assert!(matches!(err, ComponentError::ActivationFailed { .. }));
        assert_eq!(component.state(), ComponentState::Unsatisfied);
        assert!(!component.is_valid());
        assert_eq!(component.reference("dep"), Some(service));
    }

    #[test]
    fn deactivated_is_terminal() {
        let component = Component::new(
            ComponentDescriptor::new("c").reference(ReferenceDescriptor::mandatory("dep", "dep")),
        );
        let service = ServiceRef::new("dep", ());
        component.bind("dep", service.clone()).unwrap();
        component.deactivate();

        assert_eq!(component.state(), ComponentState::Deactivated);
        assert_eq!(component.reference("dep"), None, "references are released");
        assert!(component.bind("dep", service.clone()).unwrap_err().is_invalid_state());
        assert!(!component.unbind("dep", &service).unwrap());
        assert!(component.activate().unwrap_err().is_invalid_state());
    }

    #[test]
    fn deactivate_runs_routine_and_invalidates() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        let component = Component::new(ComponentDescriptor::new("c").on_deactivate(move |ctx| {
            *seen_clone.lock() = Some(ctx.name().to_string());
            Ok(())
        }));
        component.activate().unwrap();
        component.deactivate();

        assert_eq!(seen.lock().as_deref(), Some(component.name()));
        assert!(component.assert_valid().unwrap_err().is_invalid_state());
    }

    #[test]
    fn mandatory_unbind_deactivates_with_reference_still_bound() {
        let observed = Arc::new(Mutex::new(false));
        let observed_clone = Arc::clone(&observed);
        let component = Component::new(
            ComponentDescriptor::new("c")
                .reference(ReferenceDescriptor::mandatory("dep", "dep").dynamic())
                .on_deactivate(move |ctx| {
                    *observed_clone.lock() = ctx.reference("dep").is_some();
                    Ok(())
                }),
        );
        let service = ServiceRef::new("dep", ());
        component.bind("dep", service.clone()).unwrap();

        assert!(component.unbind("dep", &service).unwrap());
        assert_eq!(component.state(), ComponentState::Unsatisfied);
        assert!(*observed.lock());

        // Rebinding reactivates.
        component.bind("dep", ServiceRef::new("dep", ())).unwrap();
        assert_eq!(component.state(), ComponentState::Active);
    }

    #[test]
    fn dynamic_optional_churn_does_not_transition() {
        let activations = recorder();
        let activations_clone = Arc::clone(&activations);
        let component = Component::new(
            ComponentDescriptor::new("c")
                .reference(ReferenceDescriptor::optional("opt", "svc").dynamic())
                .on_activate(move |_| {
                    activations_clone.lock().push("activate".into());
                    Ok(())
                }),
        );
        component.activate().unwrap();

        let first = ServiceRef::new("svc", 1_u8);
        let second = ServiceRef::new("svc", 2_u8);
        component.bind("opt", first.clone()).unwrap();
        assert_eq!(component.bind("opt", second.clone()).unwrap(), Some(first));
        assert!(component.unbind("opt", &second).unwrap());

        assert_eq!(component.state(), ComponentState::Active);
        assert_eq!(activations.lock().len(), 1);
    }

    #[test]
    fn static_optional_unbind_cycles_component() {
        let events = recorder();
        let on_activate = Arc::clone(&events);
        let on_deactivate = Arc::clone(&events);
        let component = Component::new(
            ComponentDescriptor::new("c")
                .reference(ReferenceDescriptor::optional("opt", "svc"))
                .on_activate(move |_| {
                    on_activate.lock().push("activate".into());
                    Ok(())
                })
                .on_deactivate(move |_| {
                    on_deactivate.lock().push("deactivate".into());
                    Ok(())
                }),
        );
        component.activate().unwrap();
        let service = ServiceRef::new("svc", ());
        component.bind("opt", service.clone()).unwrap();
        component.unbind("opt", &service).unwrap();

        assert_eq!(component.state(), ComponentState::Active);
        assert_eq!(
            *events.lock(),
            vec!["activate", "deactivate", "activate", "deactivate", "activate"]
        );
    }

    #[test]
    fn bind_callbacks_see_replaced_value() {
        let events = recorder();
        let on_bind = Arc::clone(&events);
        let on_unbind = Arc::clone(&events);
        let component = Component::new(
            ComponentDescriptor::new("c").reference(
                ReferenceDescriptor::optional("opt", "svc")
                    .dynamic()
                    .on_bind(move |_, s| on_bind.lock().push(format!("bind {}", s.id())))
                    .on_unbind(move |_, s| {
                        on_unbind.lock().push(format!("unbind {}", s.id()));
                    }),
            ),
        );
        let a = ServiceRef::new("svc", ());
        let b = ServiceRef::new("svc", ());
        component.bind("opt", a.clone()).unwrap();
        component.bind("opt", b.clone()).unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                format!("bind {}", a.id()),
                format!("unbind {}", a.id()),
                format!("bind {}", b.id()),
            ]
        );
    }

    #[test]
    fn unknown_reference_is_reported() {
        let component = Component::new(ComponentDescriptor::new("c"));
        let err = component.bind("nope", ServiceRef::new("x", ())).unwrap_err();
        assert!(matches!(err, ComponentError::UnknownReference { .. }));
    }

    #[test]
    fn duplicate_reference_declaration_replaces_earlier() {
        let descriptor = ComponentDescriptor::new("c")
            .reference(ReferenceDescriptor::mandatory("dep", "one"))
            .reference(ReferenceDescriptor::optional("dep", "two"));
        assert_eq!(descriptor.references().len(), 1);
        assert_eq!(descriptor.references()[0].interface(), "two");
    }
}
