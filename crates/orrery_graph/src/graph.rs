//! The dependency graph.
//!
//! # Locking
//!
//! The node map is guarded by a [`RwLock`] that is only held long enough to
//! clone the `Arc`s of the nodes an operation needs; it is never held while a
//! node mutex is taken. A thread holds at most one node mutex at a time and
//! never across a factory, disposer or listener call, so node mutexes cannot
//! deadlock against each other and are effectively taken in plan order.
//!
//! Blocking only happens on a node's condition variable while that node is
//! starting or stopping. A thread that holds a node in `Starting` only waits
//! on that node's dependencies, and a node only enters `Stopping` once no
//! dependent pins it, so waits always point down the acyclic dependency
//! relation and terminate.
//!
//! A dependent pins each dependency for as long as it is starting, up or
//! stopping. A pinned node refuses to stop; `stop` therefore re-plans and
//! first stops whichever dependents pinned it, which preserves the invariant
//! that an up node only has up dependencies even when `start` and `stop` race
//! on overlapping subgraphs.

use core::any::Any;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::error::{BoxError, GraphError, ListenerError};
use crate::events::{LifecycleEvent, Listeners};
use crate::node::{Dependencies, NodeDescriptor, NodeState, NodeValue, ServiceNode};
use crate::plan::{self, NodeMap};

/// A disposer failure recorded during teardown.
#[derive(Debug)]
pub struct DisposeFailure {
    /// The node whose disposer failed.
    pub node: String,
    /// The disposer error.
    pub error: BoxError,
}

/// Outcome of a `stop` or `unregister` call.
///
/// Teardown never aborts on a disposer failure; failures are collected here
/// after being logged.
#[derive(Debug, Default)]
pub struct StopReport {
    /// Nodes taken down by this call, in the order they stopped.
    pub stopped: Vec<String>,
    /// Disposer failures, in the order they occurred.
    pub failures: Vec<DisposeFailure>,
}

impl StopReport {
    /// Returns true if every disposer succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of trying to take a single node down.
enum StopOutcome {
    Stopped,
    AlreadyDown,
    /// A dependent still holds the node.
    Pinned,
}

/// Registry of [`ServiceNode`]s with transactional start and stop.
///
/// Graphs are plain values; any number of independent graphs may coexist.
///
/// # Example
///
/// ```
/// use orrery_graph::{DependencyGraph, NodeDescriptor, NodeState};
///
/// let graph = DependencyGraph::new();
/// graph.register(NodeDescriptor::new("a", |_| Ok(())).depends_on(["b"])).unwrap();
/// graph.register(NodeDescriptor::new("b", |_| Ok(())).depends_on(["c"])).unwrap();
/// graph.register(NodeDescriptor::new("c", |_| Ok(()))).unwrap();
///
/// assert_eq!(graph.start_order("a").unwrap(), ["c", "b", "a"]);
/// graph.start("a").unwrap();
/// assert_eq!(graph.status("c"), Some(NodeState::Up));
///
/// let report = graph.stop("c").unwrap();
/// assert_eq!(report.stopped, ["a", "b", "c"]);
/// ```
#[derive(Default)]
pub struct DependencyGraph {
    nodes: RwLock<NodeMap>,
    next_seq: AtomicU64,
    listeners: Listeners,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a node. The node starts out down.
    ///
    /// Dependencies may name nodes that are not registered yet.
    ///
    /// # Errors
    ///
    /// - [`GraphError::DuplicateName`] if the name is taken
    /// - [`GraphError::Cycle`] if the new edges would close a cycle
    ///
    /// On error the graph is unchanged.
    pub fn register(&self, descriptor: NodeDescriptor) -> Result<(), GraphError> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(descriptor.name()) {
            return Err(GraphError::DuplicateName {
                name: descriptor.name().to_string(),
            });
        }
        if let Some(path) = plan::find_cycle(&nodes, descriptor.name(), descriptor.dependencies()) {
            tracing::debug!(node = descriptor.name(), cycle = ?path, "registration rejected");
            return Err(GraphError::Cycle { path });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let node = ServiceNode::new(descriptor, seq);
        tracing::debug!(node = node.name(), dependencies = ?node.dependencies(), "node registered");
        nodes.insert(node.name().to_string(), Arc::new(node));
        Ok(())
    }

    /// Stops and removes a node.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownNode`] if no such node is registered
    /// - [`GraphError::HasDependents`] while any registered node depends on it
    pub fn unregister(&self, name: &str) -> Result<StopReport, GraphError> {
        let node = {
            let mut nodes = self.nodes.write();
            if !nodes.contains_key(name) {
                return Err(GraphError::UnknownNode {
                    name: name.to_string(),
                });
            }
            let dependents = direct_dependents(&nodes, name);
            if !dependents.is_empty() {
                return Err(GraphError::HasDependents {
                    node: name.to_string(),
                    dependents,
                });
            }
            nodes.remove(name)
        };

        let mut report = StopReport::default();
        if let Some(node) = node {
            // No new dependent can pin it; wait out the pins of dependents
            // that are still stopping.
            loop {
                match self.stop_one(&node, &mut report) {
                    StopOutcome::Stopped | StopOutcome::AlreadyDown => break,
                    StopOutcome::Pinned => node.wait_unpinned(),
                }
            }
            tracing::debug!(node = name, "node unregistered");
        }
        Ok(report)
    }

    /// Registers a named lifecycle listener.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::DuplicateName`] if the name is taken.
    pub fn register_listener<F>(
        &self,
        name: impl Into<String>,
        listener: F,
    ) -> Result<&Self, ListenerError>
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.listeners.register(name.into(), listener)?;
        Ok(self)
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn unregister_listener(&self, name: &str) -> bool {
        self.listeners.unregister(name)
    }

    /// Returns listener names in registration order.
    #[must_use]
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.names()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts `name` and every node it transitively depends on.
    ///
    /// Nodes already up are left alone. If any node fails to start, the nodes
    /// started by this call are stopped again in reverse start order before
    /// the error is returned.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownNode`] / [`GraphError::MissingDependency`] before anything starts
    /// - [`GraphError::StartFailure`] if a factory failed
    /// - [`GraphError::DependencyDown`] if a concurrent `stop` took a dependency down mid-start
    pub fn start(&self, name: &str) -> Result<(), GraphError> {
        let plan = {
            let nodes = self.nodes.read();
            plan::start_plan(&nodes, name)?
        };

        let mut started: Vec<Arc<ServiceNode>> = Vec::new();
        for node in plan {
            match self.start_one(&node) {
                Ok(true) => started.push(node),
                Ok(false) => {}
                Err(error) => {
                    self.roll_back(&started);
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Stops `name` after every node that transitively depends on it.
    ///
    /// Disposer failures do not abort teardown; they are logged and returned
    /// in the report.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] if no such node is registered.
    pub fn stop(&self, name: &str) -> Result<StopReport, GraphError> {
        let target = self.node(name).ok_or_else(|| GraphError::UnknownNode {
            name: name.to_string(),
        })?;

        let mut report = StopReport::default();
        loop {
            let plan = {
                let nodes = self.nodes.read();
                plan::stop_plan(&nodes, &target)
            };

            let mut pinned = false;
            for node in &plan {
                if let StopOutcome::Pinned = self.stop_one(node, &mut report) {
                    pinned = true;
                }
            }
            if !pinned {
                return Ok(report);
            }
            // A concurrent start brought a new dependent up; stop it too.
            tracing::trace!(node = name, "stop re-planning around a new dependent");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the state of `name`, or `None` if not registered.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<NodeState> {
        self.node(name).map(|node| node.state())
    }

    /// Returns the value of an up node as `T`.
    #[must_use]
    pub fn value<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let node = self.node(name)?;
        let value = node.lock().value.clone()?;
        value.downcast::<T>().ok()
    }

    /// Returns the registered node called `name`.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<Arc<ServiceNode>> {
        self.nodes.read().get(name).cloned()
    }

    /// Returns `(name, state)` for every node, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, NodeState)> {
        let nodes: Vec<Arc<ServiceNode>> = self.nodes.read().values().cloned().collect();
        let mut snapshot: Vec<(String, NodeState)> = nodes
            .iter()
            .map(|node| (node.name().to_string(), node.state()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Returns the registered nodes that directly depend on `name`, sorted.
    #[must_use]
    pub fn dependents(&self, name: &str) -> Vec<String> {
        direct_dependents(&self.nodes.read(), name)
    }

    /// Returns the order `start(name)` would follow, including nodes already up.
    ///
    /// # Errors
    ///
    /// Same planning errors as [`start`](Self::start).
    pub fn start_order(&self, name: &str) -> Result<Vec<String>, GraphError> {
        let nodes = self.nodes.read();
        let plan = plan::start_plan(&nodes, name)?;
        Ok(plan.iter().map(|node| node.name().to_string()).collect())
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.read().contains_key(name)
    }

    /// Returns the number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns true if no node is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal: Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Brings one node up, assuming its dependencies were handled earlier in
    /// the plan. Returns `Ok(false)` if it was already up.
    fn start_one(&self, node: &Arc<ServiceNode>) -> Result<bool, GraphError> {
        {
            let mut slot = node.lock_settled();
            if slot.state == NodeState::Up {
                return Ok(false);
            }
            slot.state = NodeState::Starting;
        }
        tracing::debug!(node = node.name(), "starting");
        self.listeners.emit(|| LifecycleEvent::Starting {
            node: node.name().to_string(),
        });

        let mut held: Vec<Arc<ServiceNode>> = Vec::with_capacity(node.dependencies().len());
        let mut values: Vec<(String, NodeValue)> = Vec::with_capacity(node.dependencies().len());
        for dependency in node.dependencies() {
            match self.pin(node.name(), dependency) {
                Ok((dep_node, value)) => {
                    held.push(dep_node);
                    values.push((dependency.clone(), value));
                }
                Err(error) => {
                    self.abort_start(node, held, &error);
                    return Err(error);
                }
            }
        }

        let began = Instant::now();
        let produced = node.produce(&Dependencies::new(&values));
        drop(values);

        match produced {
            Ok(value) => {
                {
                    let mut slot = node.lock();
                    slot.state = NodeState::Up;
                    slot.value = Some(value);
                    slot.held = held;
                }
                node.notify_settled();
                let duration = began.elapsed();
                tracing::info!(node = node.name(), ?duration, "node up");
                self.listeners.emit(|| LifecycleEvent::Up {
                    node: node.name().to_string(),
                    duration,
                });
                Ok(true)
            }
            Err(source) => {
                let error = GraphError::StartFailure {
                    node: node.name().to_string(),
                    source,
                };
                self.abort_start(node, held, &error);
                Err(error)
            }
        }
    }

    /// Pins an up dependency and returns it with its value.
    fn pin(&self, dependent: &str, dependency: &str) -> Result<(Arc<ServiceNode>, NodeValue), GraphError> {
        let down = || GraphError::DependencyDown {
            node: dependent.to_string(),
            dependency: dependency.to_string(),
        };
        let dep_node = self.node(dependency).ok_or_else(|| GraphError::MissingDependency {
            node: dependent.to_string(),
            dependency: dependency.to_string(),
        })?;

        let mut slot = dep_node.lock_settled();
        if slot.state != NodeState::Up {
            return Err(down());
        }
        let value = slot.value.clone().ok_or_else(down)?;
        slot.pins += 1;
        drop(slot);
        Ok((dep_node, value))
    }

    /// Returns a node that failed to start to `Down` and releases its pins.
    fn abort_start(&self, node: &Arc<ServiceNode>, held: Vec<Arc<ServiceNode>>, error: &GraphError) {
        node.lock().state = NodeState::Down;
        node.notify_settled();
        for dependency in held {
            dependency.unpin();
        }
        tracing::warn!(node = node.name(), %error, "start failed");
        self.listeners.emit(|| LifecycleEvent::StartFailed {
            node: node.name().to_string(),
            error: render(error),
        });
    }

    /// Stops the nodes this call started, most recent first.
    fn roll_back(&self, started: &[Arc<ServiceNode>]) {
        let mut report = StopReport::default();
        for node in started.iter().rev() {
            if let StopOutcome::Pinned = self.stop_one(node, &mut report) {
                // Another caller's node started on top of it in the meantime.
                tracing::debug!(node = node.name(), "rollback left node up; in use by a concurrent start");
            }
        }
    }

    /// Takes one node down if nothing pins it.
    fn stop_one(&self, node: &Arc<ServiceNode>, report: &mut StopReport) -> StopOutcome {
        let (value, held) = {
            let mut slot = node.lock_settled();
            if slot.state == NodeState::Down {
                return StopOutcome::AlreadyDown;
            }
            if slot.pins > 0 {
                return StopOutcome::Pinned;
            }
            slot.state = NodeState::Stopping;
            (slot.value.take(), core::mem::take(&mut slot.held))
        };
        tracing::debug!(node = node.name(), "stopping");
        self.listeners.emit(|| LifecycleEvent::Stopping {
            node: node.name().to_string(),
        });

        if let Some(value) = value
            && let Err(error) = node.dispose(&value)
        {
            tracing::warn!(node = node.name(), %error, "disposer failed");
            self.listeners.emit(|| LifecycleEvent::DisposeFailed {
                node: node.name().to_string(),
                error: error.to_string(),
            });
            report.failures.push(DisposeFailure {
                node: node.name().to_string(),
                error,
            });
        }

        node.lock().state = NodeState::Down;
        node.notify_settled();
        for dependency in held {
            dependency.unpin();
        }

        tracing::debug!(node = node.name(), "node down");
        self.listeners.emit(|| LifecycleEvent::Down {
            node: node.name().to_string(),
        });
        report.stopped.push(node.name().to_string());
        StopOutcome::Stopped
    }
}

impl core::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("nodes", &self.snapshot())
            .field("listeners", &self.listeners.names())
            .finish()
    }
}

fn direct_dependents(nodes: &NodeMap, name: &str) -> Vec<String> {
    let mut dependents: Vec<String> = nodes
        .values()
        .filter(|node| node.dependencies().iter().any(|dependency| dependency == name))
        .map(|node| node.name().to_string())
        .collect();
    dependents.sort();
    dependents
}

/// Renders an error with its source chain.
fn render(error: &GraphError) -> String {
    let mut rendered = error.to_string();
    let mut source = core::error::Error::source(error);
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = core::error::Error::source(cause);
    }
    rendered
}
