//! Components with dynamically bound service references.
//!
//! `orrery_component` provides the leaf layer of Orrery:
//!
//! - [`ServiceRef`] - Opaque service values tagged with an interface name
//! - [`ReferenceHandle`] - Thread-safe zero-or-one slot for a dependency
//! - [`Component`] - Activation state machine guarded by a single lock
//! - [`ServiceRegistry`] - Dependency source delivering bind/unbind notifications
//!
//! # Guarantees
//!
//! - No observer ever sees an active component with a mandatory reference unbound.
//! - `valid` is cleared before a deactivation routine runs; guarded calls
//!   racing with deactivation fail with [`ComponentError::InvalidState`].
//! - A deactivated component is never revived by a late notification.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use orrery_component::{
//!     Component, ComponentDescriptor, ComponentError, ReferenceDescriptor, ServiceRef, ServiceRegistry,
//! };
//!
//! struct Store(&'static str);
//!
//! let registry = ServiceRegistry::new();
//! let component = Arc::new(Component::new(
//!     ComponentDescriptor::new("reader")
//!         .reference(ReferenceDescriptor::mandatory("store", "store").dynamic()),
//! ));
//! registry.track(&component);
//! registry.register(ServiceRef::new("store", Store("primary")));
//!
//! let read = |c: &Component| -> Result<&'static str, ComponentError> {
//!     c.with_valid(|ctx| ctx.service::<Store>("store").map(|s| s.0).unwrap_or("none"))
//! };
//! assert_eq!(read(&component).unwrap(), "primary");
//!
//! component.deactivate();
//! assert!(read(&component).unwrap_err().is_invalid_state());
//! ```

/// Components and their activation lifecycle.
pub mod component;

/// Error types.
pub mod error;

/// Single-slot service references.
pub mod reference;

/// Service registry driving notifications.
pub mod registry;

/// Opaque service values.
pub mod service;

pub use component::{
    Component, ComponentContext, ComponentDescriptor, ComponentId, ComponentState,
    ReferenceDescriptor,
};
pub use error::{BoxError, ComponentError};
pub use reference::{Cardinality, Policy, ReferenceHandle};
pub use registry::{NotifyReport, ServiceRegistry};
pub use service::{ServiceId, ServiceRef};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::component::*;
    pub use crate::error::*;
    pub use crate::reference::*;
    pub use crate::registry::*;
    pub use crate::service::*;
}
