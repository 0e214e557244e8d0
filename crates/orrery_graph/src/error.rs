//! Error types for graph registration and lifecycle operations.

/// Boxed error returned by factories and disposers.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Errors returned by [`DependencyGraph`](crate::DependencyGraph) operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A node with this name is already registered.
    #[error("node '{name}' is already registered")]
    DuplicateName {
        /// The duplicate name.
        name: String,
    },

    /// Registering the node would close a dependency cycle.
    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle {
        /// The cycle, starting and ending at the rejected node.
        path: Vec<String>,
    },

    /// No node with this name is registered.
    #[error("unknown node '{name}'")]
    UnknownNode {
        /// The requested name.
        name: String,
    },

    /// A node in the start plan depends on a name that is not registered.
    #[error("node '{node}' depends on unregistered node '{dependency}'")]
    MissingDependency {
        /// The node declaring the dependency.
        node: String,
        /// The missing dependency.
        dependency: String,
    },

    /// A dependency went down while its dependent was being started.
    #[error("node '{node}' cannot start: dependency '{dependency}' is not up")]
    DependencyDown {
        /// The node being started.
        node: String,
        /// The dependency that was not up.
        dependency: String,
    },

    /// A factory failed during `start`.
    #[error("node '{node}' failed to start")]
    StartFailure {
        /// The node whose factory failed.
        node: String,
        /// The factory error.
        #[source]
        source: BoxError,
    },

    /// The node cannot be unregistered while other nodes depend on it.
    #[error("node '{node}' is required by {dependents:?}")]
    HasDependents {
        /// The node that was to be removed.
        node: String,
        /// Registered nodes depending on it.
        dependents: Vec<String>,
    },
}

impl GraphError {
    /// Returns the node a start failure is attributed to.
    ///
    /// For [`StartFailure`](Self::StartFailure) and
    /// [`DependencyDown`](Self::DependencyDown) this is the node that could
    /// not be brought up.
    #[must_use]
    pub fn failed_node(&self) -> Option<&str> {
        match self {
            GraphError::StartFailure { node, .. } | GraphError::DependencyDown { node, .. } => {
                Some(node)
            }
            _ => None,
        }
    }
}

/// Errors that can occur during listener registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// A listener with this name already exists.
    #[error("listener '{name}' already registered")]
    DuplicateName {
        /// The duplicate listener name.
        name: String,
    },
}
