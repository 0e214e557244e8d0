//! Dependency-ordered service graph for Orrery.
//!
//! A [`DependencyGraph`] holds named [`ServiceNode`]s. Each node declares the
//! names it depends on, a factory producing its value once those dependencies
//! are up, and an optional disposer.
//!
//! # Guarantees
//!
//! - Registration rejects duplicate names and dependency cycles; a rejected
//!   registration leaves the graph unchanged.
//! - `start(name)` brings dependencies up first. If a factory fails, every node
//!   started by that call is stopped again in reverse order.
//! - `stop(name)` takes every transitive dependent down before `name` itself,
//!   and keeps going when a disposer fails.
//! - An up node only ever has up dependencies, including while `start` and
//!   `stop` race on overlapping nodes.
//!
//! # Example
//!
//! ```
//! use orrery_graph::{DependencyGraph, GraphError, NodeDescriptor, NodeState};
//!
//! let graph = DependencyGraph::new();
//! graph.register(NodeDescriptor::new("config", |_| Ok(String::from("db://local")))).unwrap();
//! graph
//!     .register(
//!         NodeDescriptor::new("db", |deps| {
//!             let url = deps.get::<String>("config").ok_or("no config")?;
//!             if url.is_empty() {
//!                 return Err("empty url".into());
//!             }
//!             Ok(42_u32)
//!         })
//!         .depends_on(["config"]),
//!     )
//!     .unwrap();
//!
//! graph.start("db").unwrap();
//! assert_eq!(graph.value::<u32>("db").as_deref(), Some(&42));
//!
//! // Cycles are rejected at registration time.
//! let err = graph
//!     .register(NodeDescriptor::new("loop", |_| Ok(())).depends_on(["loop"]))
//!     .unwrap_err();
//! assert!(matches!(err, GraphError::Cycle { .. }));
//!
//! graph.stop("config").unwrap();
//! assert_eq!(graph.status("db"), Some(NodeState::Down));
//! ```

/// Error types.
pub mod error;

/// Lifecycle events and listeners.
pub mod events;

/// The dependency graph.
pub mod graph;

/// Nodes and node descriptors.
pub mod node;

mod plan;

pub use error::{BoxError, GraphError, ListenerError};
pub use events::LifecycleEvent;
pub use graph::{DependencyGraph, DisposeFailure, StopReport};
pub use node::{Dependencies, NodeDescriptor, NodeState, NodeValue, ServiceNode};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::graph::*;
    pub use crate::node::*;
}
