//! Error types for components and their references.

use crate::component::{ComponentId, ComponentState};

/// Boxed error returned by user-supplied callbacks.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Errors raised by [`Component`](crate::Component) and
/// [`ReferenceHandle`](crate::ReferenceHandle) operations.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// The component is not active (never activated, being torn down, or deactivated).
    #[error("component '{component}' is not valid (state: {state})")]
    InvalidState {
        /// Instance name of the component.
        component: String,
        /// State observed under the component lock.
        state: ComponentState,
    },

    /// A static reference was rebound while its component was active.
    #[error("reference '{reference}' has static policy and cannot be rebound while active")]
    PolicyViolation {
        /// Name of the offending reference.
        reference: String,
    },

    /// The named reference is not declared by the component.
    #[error("component '{component}' declares no reference named '{reference}'")]
    UnknownReference {
        /// Instance name of the component.
        component: String,
        /// The requested reference name.
        reference: String,
    },

    /// Activation was requested while mandatory references are unbound.
    #[error("component '{component}' is unsatisfied, missing: {missing:?}")]
    Unsatisfied {
        /// Instance name of the component.
        component: String,
        /// Names of the unbound mandatory references.
        missing: Vec<String>,
    },

    /// The activation routine failed; the component stays unsatisfied.
    #[error("activation of component '{component}' failed")]
    ActivationFailed {
        /// Instance name of the component.
        component: String,
        /// Id of the component.
        id: ComponentId,
        /// The error returned by the activation routine.
        #[source]
        source: BoxError,
    },
}

impl ComponentError {
    /// Returns true for [`ComponentError::InvalidState`].
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, ComponentError::InvalidState { .. })
    }

    /// Returns true for [`ComponentError::PolicyViolation`].
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, ComponentError::PolicyViolation { .. })
    }
}
