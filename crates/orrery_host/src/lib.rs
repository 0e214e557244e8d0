//! Hosting for Orrery components.
//!
//! - [`ComponentNode`] - Runs a component as a node of a dependency graph
//! - [`TracingConfig`] - Installs the `tracing` subscriber for Orrery's logs
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use orrery_component::{
//!     Component, ComponentDescriptor, ComponentState, ReferenceDescriptor, ServiceRef, ServiceRegistry,
//! };
//! use orrery_graph::{DependencyGraph, NodeDescriptor};
//! use orrery_host::ComponentNode;
//!
//! struct Clock;
//! struct Audit;
//!
//! let registry = Arc::new(ServiceRegistry::new());
//! let graph = DependencyGraph::new();
//! graph.register(NodeDescriptor::new("clock", |_| Ok(Clock))).unwrap();
//! graph
//!     .register(
//!         ComponentNode::new(
//!             ComponentDescriptor::new("scheduler")
//!                 .reference(ReferenceDescriptor::mandatory("clock", "clock"))
//!                 .reference(ReferenceDescriptor::optional("audit", "audit").dynamic()),
//!         )
//!         .with_registry(Arc::clone(&registry))
//!         .into_node(),
//!     )
//!     .unwrap();
//!
//! graph.start("scheduler").unwrap();
//! let scheduler = graph.value::<Component>("scheduler").unwrap();
//! assert!(!scheduler.is_bound("audit"));
//!
//! registry.register(ServiceRef::new("audit", Audit));
//! assert!(scheduler.is_bound("audit"));
//! assert_eq!(scheduler.state(), ComponentState::Active);
//! ```

/// Components hosted as graph nodes.
pub mod component_node;

/// Tracing subscriber setup.
pub mod tracing_setup;

pub use component_node::ComponentNode;
pub use tracing_setup::{TracingConfig, TracingFormat};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::component_node::*;
    pub use crate::tracing_setup::*;
}
