//! Lifecycle events and named listeners.
//!
//! The graph emits a [`LifecycleEvent`] for every node transition. Listeners
//! are registered by name on the graph and run in registration order, on the
//! thread performing the transition, outside any node lock.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use orrery_graph::{DependencyGraph, LifecycleEvent, NodeDescriptor};
//!
//! let graph = DependencyGraph::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! graph
//!     .register_listener("audit", move |event: &LifecycleEvent| {
//!         sink.lock().push(event.to_string());
//!     })
//!     .unwrap();
//!
//! graph.register(NodeDescriptor::new("db", |_| Ok(()))).unwrap();
//! graph.start("db").unwrap();
//! assert_eq!(seen.lock().as_slice(), ["db starting", "db up"]);
//! ```

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ListenerError;

/// A node lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The node's factory is about to run.
    Starting {
        /// Node name.
        node: String,
    },
    /// The node is up.
    Up {
        /// Node name.
        node: String,
        /// Time spent in the factory.
        duration: Duration,
    },
    /// The node failed to start and is down again.
    StartFailed {
        /// Node name.
        node: String,
        /// Rendered failure.
        error: String,
    },
    /// The node's disposer is about to run.
    Stopping {
        /// Node name.
        node: String,
    },
    /// The node is down.
    Down {
        /// Node name.
        node: String,
    },
    /// The node's disposer failed. The node still goes down.
    DisposeFailed {
        /// Node name.
        node: String,
        /// Rendered failure.
        error: String,
    },
}

impl LifecycleEvent {
    /// Returns the name of the node the event concerns.
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            LifecycleEvent::Starting { node }
            | LifecycleEvent::Up { node, .. }
            | LifecycleEvent::StartFailed { node, .. }
            | LifecycleEvent::Stopping { node }
            | LifecycleEvent::Down { node }
            | LifecycleEvent::DisposeFailed { node, .. } => node,
        }
    }
}

/// Renders as `"<node> <transition>"`, without durations or error text.
impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transition = match self {
            LifecycleEvent::Starting { .. } => "starting",
            LifecycleEvent::Up { .. } => "up",
            LifecycleEvent::StartFailed { .. } => "start failed",
            LifecycleEvent::Stopping { .. } => "stopping",
            LifecycleEvent::Down { .. } => "down",
            LifecycleEvent::DisposeFailed { .. } => "dispose failed",
        };
        write!(f, "{} {}", self.node(), transition)
    }
}

type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

struct ListenerEntry {
    name: String,
    listener: Listener,
}

/// Ordered set of named listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: RwLock<Vec<ListenerEntry>>,
}

impl Listeners {
    pub(crate) fn register(
        &self,
        name: String,
        listener: impl Fn(&LifecycleEvent) + Send + Sync + 'static,
    ) -> Result<(), ListenerError> {
        let mut entries = self.entries.write();
        if entries.iter().any(|entry| entry.name == name) {
            return Err(ListenerError::DuplicateName { name });
        }
        entries.push(ListenerEntry {
            name,
            listener: Arc::new(listener),
        });
        Ok(())
    }

    pub(crate) fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.name != name);
        entries.len() != before
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|entry| entry.name.clone()).collect()
    }

    /// Delivers an event to every listener in registration order.
    ///
    /// The event is only built when at least one listener is registered.
    pub(crate) fn emit(&self, event: impl FnOnce() -> LifecycleEvent) {
        // Snapshot so listeners may register or remove listeners themselves.
        let listeners: Vec<Listener> = self
            .entries
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.listener))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let event = event();
        for listener in listeners {
            listener(&event);
        }
    }
}
