//! Dependency-ordered service graphs and dynamically bound components.
//!
//! Orrery starts and stops services in dependency order, unwinds partial
//! starts, and keeps components consistent while their references are bound
//! and unbound from other threads.
//!
//! | Crate | Provides |
//! |-------|----------|
//! | [`orrery_component`] | components, reference handles, service registry |
//! | [`orrery_graph`] | the dependency graph and its lifecycle events |
//! | [`orrery_extension`] | ordered start/stop hooks, composite services |
//! | [`orrery_host`] | components hosted in graph nodes, tracing setup |
//!
//! # Example
//!
//! ```
//! use orrery::prelude::*;
//!
//! let graph = DependencyGraph::new();
//! graph.register(NodeDescriptor::new("config", |_| Ok(8080_u16))).unwrap();
//! graph
//!     .register(
//!         ComponentNode::new(
//!             ComponentDescriptor::new("http")
//!                 .reference(ReferenceDescriptor::mandatory("port", "config")),
//!         )
//!         .into_node(),
//!     )
//!     .unwrap();
//!
//! graph.start("http").unwrap();
//! assert_eq!(graph.status("config"), Some(NodeState::Up));
//! graph.stop("config").unwrap();
//! assert_eq!(graph.status("http"), Some(NodeState::Down));
//! ```

pub use orrery_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use orrery_internal::prelude::*;
}
