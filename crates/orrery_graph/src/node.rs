//! Service nodes and their descriptors.
//!
//! A [`NodeDescriptor`] is the registration-time description of a node: its
//! name, the names it depends on, a factory producing its value and an
//! optional disposer releasing it. Once registered, the graph wraps it in a
//! [`ServiceNode`] that tracks the node's state.

use core::any::{Any, type_name};
use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::BoxError;

/// Type-erased value produced by a node factory.
pub type NodeValue = Arc<dyn Any + Send + Sync>;

type Factory = Box<dyn Fn(&Dependencies<'_>) -> Result<NodeValue, BoxError> + Send + Sync>;
type Disposer = Box<dyn Fn(&NodeValue) -> Result<(), BoxError> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// NodeState
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`ServiceNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    /// Not running; holds no value.
    #[default]
    Down,
    /// Factory in progress.
    Starting,
    /// Running; the value is available.
    Up,
    /// Disposer in progress.
    Stopping,
}

impl NodeState {
    /// Returns true for `Starting` and `Stopping`.
    #[must_use]
    pub fn is_transitional(self) -> bool {
        matches!(self, NodeState::Starting | NodeState::Stopping)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Down => "down",
            NodeState::Starting => "starting",
            NodeState::Up => "up",
            NodeState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependencies
// ─────────────────────────────────────────────────────────────────────────────

/// Values of a node's dependencies, handed to its factory.
///
/// Every dependency is guaranteed to be up while the factory runs.
pub struct Dependencies<'a> {
    values: &'a [(String, NodeValue)],
}

impl<'a> Dependencies<'a> {
    pub(crate) fn new(values: &'a [(String, NodeValue)]) -> Self {
        Self { values }
    }

    /// Returns the value of dependency `name` as `T`.
    ///
    /// Returns `None` if `name` is not a dependency or its value is not a `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.value(name)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Returns the type-erased value of dependency `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&NodeValue> {
        self.values
            .iter()
            .find(|(dependency, _)| dependency == name)
            .map(|(_, value)| value)
    }

    /// Iterates over dependency names and values in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the number of dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the node has no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Dependencies<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.iter().map(|(name, _)| name))
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NodeDescriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Registration-time description of a node.
///
/// # Example
///
/// ```
/// use orrery_graph::NodeDescriptor;
///
/// struct Pool(u32);
/// struct Repo { size: u32 }
///
/// let pool = NodeDescriptor::new("pool", |_| Ok(Pool(4)));
/// let repo = NodeDescriptor::new("repo", |deps| {
///     let pool = deps.get::<Pool>("pool").ok_or("pool missing")?;
///     Ok(Repo { size: pool.0 })
/// })
/// .depends_on(["pool"])
/// .with_disposer(|repo: &Repo| {
///     assert_eq!(repo.size, 4);
///     Ok(())
/// });
///
/// assert_eq!(repo.dependencies(), ["pool"]);
/// # let _ = pool;
/// ```
pub struct NodeDescriptor {
    name: String,
    dependencies: Vec<String>,
    factory: Factory,
    disposer: Option<Disposer>,
}

impl NodeDescriptor {
    /// Creates a descriptor whose factory produces a `T`.
    #[must_use]
    pub fn new<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_shared(name, move |deps| factory(deps).map(Arc::new))
    }

    /// Creates a descriptor whose factory produces an already shared `T`.
    ///
    /// Useful when the factory must keep a handle to the value it returns.
    #[must_use]
    pub fn from_shared<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            factory: Box::new(move |deps| factory(deps).map(|value| value as NodeValue)),
            disposer: None,
        }
    }

    /// Adds dependencies by node name. Duplicates are ignored.
    #[must_use]
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            let dependency = dependency.into();
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        self
    }

    /// Sets the disposer run when the node stops.
    ///
    /// The disposer receives the value produced by the factory. If the value
    /// is not a `T`, the disposer is skipped and a dispose failure reported.
    #[must_use]
    pub fn with_disposer<T, F>(mut self, disposer: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.disposer = Some(Box::new(move |value: &NodeValue| {
            match (**value).downcast_ref::<T>() {
                Some(value) => disposer(value),
                None => Err(format!("disposer expects a value of type {}", type_name::<T>()).into()),
            }
        }));
        self
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared dependency names.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("disposer", &self.disposer.is_some())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ServiceNode
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable part of a node, guarded by the node mutex.
pub(crate) struct NodeSlot {
    pub(crate) state: NodeState,
    /// Present only while `Up` (taken when stopping begins).
    pub(crate) value: Option<NodeValue>,
    /// Number of dependents currently starting, up or stopping.
    pub(crate) pins: usize,
    /// Dependencies this node pinned when it started.
    pub(crate) held: Vec<Arc<ServiceNode>>,
}

/// A registered node.
///
/// Each node owns one mutex guarding its state and value, and a condition
/// variable signalled whenever it leaves a transitional state.
pub struct ServiceNode {
    name: String,
    dependencies: Vec<String>,
    seq: u64,
    factory: Factory,
    disposer: Option<Disposer>,
    slot: Mutex<NodeSlot>,
    settled: Condvar,
}

impl ServiceNode {
    pub(crate) fn new(descriptor: NodeDescriptor, seq: u64) -> Self {
        Self {
            name: descriptor.name,
            dependencies: descriptor.dependencies,
            seq,
            factory: descriptor.factory,
            disposer: descriptor.disposer,
            slot: Mutex::new(NodeSlot {
                state: NodeState::Down,
                value: None,
                pins: 0,
                held: Vec::new(),
            }),
            settled: Condvar::new(),
        }
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared dependency names.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.slot.lock().state
    }

    /// Registration sequence number, used to break ordering ties.
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, NodeSlot> {
        self.slot.lock()
    }

    /// Locks the node once it is neither starting nor stopping.
    pub(crate) fn lock_settled(&self) -> MutexGuard<'_, NodeSlot> {
        let mut slot = self.slot.lock();
        while slot.state.is_transitional() {
            self.settled.wait(&mut slot);
        }
        slot
    }

    pub(crate) fn notify_settled(&self) {
        self.settled.notify_all();
    }

    /// Blocks until no dependent pins the node and it is not transitional.
    pub(crate) fn wait_unpinned(&self) {
        let mut slot = self.slot.lock();
        while slot.pins > 0 || slot.state.is_transitional() {
            self.settled.wait(&mut slot);
        }
    }

    /// Runs the factory. A panic is returned as an error so the caller can
    /// still settle the node.
    pub(crate) fn produce(&self, deps: &Dependencies<'_>) -> Result<NodeValue, BoxError> {
        panic::catch_unwind(AssertUnwindSafe(|| (self.factory)(deps)))
            .unwrap_or_else(|payload| Err(panicked("factory", payload)))
    }

    /// Runs the disposer, if any. A panic is returned as an error.
    pub(crate) fn dispose(&self, value: &NodeValue) -> Result<(), BoxError> {
        let Some(disposer) = &self.disposer else {
            return Ok(());
        };
        panic::catch_unwind(AssertUnwindSafe(|| disposer(value)))
            .unwrap_or_else(|payload| Err(panicked("disposer", payload)))
    }

    /// Releases one pin taken by a dependent.
    pub(crate) fn unpin(&self) {
        let mut slot = self.slot.lock();
        slot.pins = slot.pins.saturating_sub(1);
        if slot.pins == 0 {
            self.settled.notify_all();
        }
    }
}

fn panicked(what: &str, payload: Box<dyn Any + Send>) -> BoxError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("{what} panicked: {message}").into()
}

impl fmt::Debug for ServiceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceNode")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
