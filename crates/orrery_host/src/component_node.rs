//! Components hosted as dependency graph nodes.
//!
//! A [`ComponentNode`] wires a [`ComponentDescriptor`] into a
//! [`DependencyGraph`](orrery_graph::DependencyGraph):
//!
//! | Graph event | Component effect |
//! |-------------|------------------|
//! | node starts | a fresh [`Component`] is built, its mandatory references bound from the dependency values, then activated |
//! | node stops | the component is untracked and deactivated |
//!
//! Each mandatory reference depends on the node named after its interface.
//! Optional references are left to an attached [`ServiceRegistry`].

use core::fmt;
use std::sync::Arc;

use orrery_component::{Component, ComponentDescriptor, ServiceRef, ServiceRegistry};
use orrery_graph::{BoxError, Dependencies, NodeDescriptor};

/// Builder turning a component declaration into a graph node.
///
/// The node's value is the running [`Component`].
///
/// # Example
///
/// ```
/// use orrery_component::{ComponentDescriptor, ComponentState, ReferenceDescriptor, Component};
/// use orrery_graph::{DependencyGraph, NodeDescriptor};
/// use orrery_host::ComponentNode;
///
/// struct Store;
///
/// let graph = DependencyGraph::new();
/// graph.register(NodeDescriptor::new("store", |_| Ok(Store))).unwrap();
/// graph
///     .register(
///         ComponentNode::new(
///             ComponentDescriptor::new("reader")
///                 .reference(ReferenceDescriptor::mandatory("store", "store")),
///         )
///         .into_node(),
///     )
///     .unwrap();
///
/// graph.start("reader").unwrap();
/// let reader = graph.value::<Component>("reader").unwrap();
/// assert_eq!(reader.state(), ComponentState::Active);
///
/// graph.stop("store").unwrap();
/// assert_eq!(reader.state(), ComponentState::Deactivated);
/// ```
#[derive(Clone)]
pub struct ComponentNode {
    name: String,
    descriptor: ComponentDescriptor,
    registry: Option<Arc<ServiceRegistry>>,
}

impl ComponentNode {
    /// Hosts `descriptor` in a node named after it.
    #[must_use]
    pub fn new(descriptor: ComponentDescriptor) -> Self {
        Self {
            name: descriptor.name().to_string(),
            descriptor,
            registry: None,
        }
    }

    /// Overrides the node name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Tracks the component in `registry` while the node is up.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the node dependencies: the interfaces of the mandatory references.
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        let mut dependencies: Vec<String> = Vec::new();
        for reference in self.descriptor.references() {
            if reference.is_mandatory() && !dependencies.iter().any(|d| d == reference.interface()) {
                dependencies.push(reference.interface().to_string());
            }
        }
        dependencies
    }

    /// Builds the graph node.
    #[must_use]
    pub fn into_node(self) -> NodeDescriptor {
        let dependencies = self.dependencies();
        let Self {
            name,
            descriptor,
            registry,
        } = self;
        let stop_registry = registry.clone();

        NodeDescriptor::from_shared(name, move |deps| {
            start_component(&descriptor, registry.as_deref(), deps)
        })
        .depends_on(dependencies)
        .with_disposer(move |component: &Component| {
            if let Some(registry) = &stop_registry {
                registry.untrack(component.id());
            }
            component.deactivate();
            Ok(())
        })
    }
}

fn start_component(
    descriptor: &ComponentDescriptor,
    registry: Option<&ServiceRegistry>,
    deps: &Dependencies<'_>,
) -> Result<Arc<Component>, BoxError> {
    let component = Arc::new(Component::new(descriptor.clone()));

    for reference in descriptor.references().iter().filter(|r| r.is_mandatory()) {
        let value = deps
            .value(reference.interface())
            .ok_or_else(|| format!("no value for dependency '{}'", reference.interface()))?;
        let service = ServiceRef::from_arc(reference.interface(), Arc::clone(value));
        if let Err(error) = component.bind(reference.name(), service) {
            component.deactivate();
            return Err(error.into());
        }
    }

    if let Err(error) = component.activate() {
        component.deactivate();
        return Err(error.into());
    }

    if let Some(registry) = registry {
        let report = registry.track(&component);
        if !report.is_clean() {
            tracing::warn!(
                component = %component,
                failures = report.failures.len(),
                "registry bindings failed for hosted component"
            );
        }
    }

    tracing::debug!(component = %component, "hosted component started");
    Ok(component)
}

impl fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentNode")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}
