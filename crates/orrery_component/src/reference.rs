//! Single-slot service references.
//!
//! A [`ReferenceHandle`] holds zero or one bound value. It is mutated by
//! bind/unbind notifications coming from whatever discovers services and read
//! by component logic. The handle itself never calls back into its owner: it
//! only reports what changed, and the owning [`Component`](crate::Component)
//! decides whether satisfiability must be re-evaluated.

use core::fmt;

use parking_lot::Mutex;

use crate::error::ComponentError;

/// Whether a reference must be bound for its component to activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cardinality {
    /// Required for activation.
    #[default]
    Mandatory,
    /// The component activates with or without it.
    Optional,
}

/// Whether a reference may change while its component is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Policy {
    /// Fixed for the whole active lifetime; rebinding requires reactivation.
    #[default]
    Static,
    /// May be swapped under a live component.
    Dynamic,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Mandatory => f.write_str("mandatory"),
            Cardinality::Optional => f.write_str("optional"),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Static => f.write_str("static"),
            Policy::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// A thread-safe slot holding at most one bound value.
///
/// # Example
///
/// ```
/// use orrery_component::{Cardinality, Policy, ReferenceHandle};
///
/// let handle = ReferenceHandle::new("logger", Cardinality::Optional, Policy::Dynamic);
/// assert_eq!(handle.bind(1_u32, true).unwrap(), None);
/// assert_eq!(handle.bind(2_u32, true).unwrap(), Some(1));
///
/// // Stale notification for a value that is no longer bound.
/// assert!(!handle.unbind(&1));
/// assert!(handle.unbind(&2));
/// assert_eq!(handle.get(), None);
/// ```
pub struct ReferenceHandle<T> {
    name: String,
    cardinality: Cardinality,
    policy: Policy,
    bound: Mutex<Option<T>>,
}

impl<T: Clone + PartialEq> ReferenceHandle<T> {
    /// Creates an unbound handle.
    #[must_use]
    pub fn new(name: impl Into<String>, cardinality: Cardinality, policy: Policy) -> Self {
        Self {
            name: name.into(),
            cardinality,
            policy,
            bound: Mutex::new(None),
        }
    }

    /// Returns the reference name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the reference cardinality.
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Returns the reference policy.
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Returns true for mandatory references.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.cardinality == Cardinality::Mandatory
    }

    /// Binds `value`, returning the previously bound value so the caller can
    /// release it.
    ///
    /// `owner_active` tells the handle whether its component is currently
    /// active. Binding the value that is already bound is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::PolicyViolation`] when a static reference is
    /// already bound to another value and the owner is active.
    pub fn bind(&self, value: T, owner_active: bool) -> Result<Option<T>, ComponentError> {
        let mut bound = self.bound.lock();
        if let Some(current) = bound.as_ref() {
            if *current == value {
                return Ok(None);
            }
            if owner_active && self.policy == Policy::Static {
                return Err(ComponentError::PolicyViolation {
                    reference: self.name.clone(),
                });
            }
        }
        Ok(bound.replace(value))
    }

    /// Clears the slot if it currently holds `value`.
    ///
    /// Returns whether the slot was actually cleared; an unbind for a value
    /// that is not bound (a stale notification) changes nothing.
    pub fn unbind(&self, value: &T) -> bool {
        let mut bound = self.bound.lock();
        if bound.as_ref() == Some(value) {
            *bound = None;
            true
        } else {
            false
        }
    }

    /// Returns the bound value, if any.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.bound.lock().clone()
    }

    /// Returns true if a value is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound.lock().is_some()
    }

    /// Clears the slot unconditionally, returning what was bound.
    pub(crate) fn take(&self) -> Option<T> {
        self.bound.lock().take()
    }
}

impl<T> fmt::Debug for ReferenceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceHandle")
            .field("name", &self.name)
            .field("cardinality", &self.cardinality)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
