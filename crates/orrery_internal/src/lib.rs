//! # Orrery Internal Library
//!
//! Re-exports the core Orrery crates for convenience.

/// Layer 1: components and dynamically bound references.
pub use orrery_component;

/// Layer 1: dependency-ordered service graph.
pub use orrery_graph;

/// Layer 2: extension hooks and composite services.
pub use orrery_extension;

/// Layer 3: components hosted in graphs, tracing setup.
pub use orrery_host;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use orrery_component::prelude::*;
    pub use orrery_extension::prelude::*;
    pub use orrery_graph::prelude::*;
    pub use orrery_host::prelude::*;

    // Both layer 1 crates define the same boxed callback error.
    pub use orrery_graph::BoxError;
}
