//! Composite services: a graph node whose value carries extension hooks.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use orrery_graph::{Dependencies, NodeDescriptor};

use crate::error::{BoxError, ExtensionError, HookFailure};
use crate::pipeline::{Extension, ExtensionPipeline};

type Factory<T> = Box<dyn Fn(&Dependencies<'_>) -> Result<T, BoxError> + Send + Sync>;
type Disposer<T> = Arc<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>;

/// Builder for a node assembled from a value factory and an extension pipeline.
///
/// When the node starts, the factory runs first and the pipeline's start-actions
/// run last, against the freshly built value. When it stops, the pipeline's
/// stop-actions run first and the disposer last. Stop-action and disposer
/// failures are reported together as one [`ExtensionError::StopFailed`], the
/// disposer's under the hook name `disposer`.
///
/// # Example
///
/// ```
/// use orrery_extension::CompositeService;
/// use orrery_graph::{DependencyGraph, NodeDescriptor, NodeState};
///
/// struct Server { port: u16 }
///
/// let graph = DependencyGraph::new();
/// graph.register(NodeDescriptor::new("port", |_| Ok(8080_u16))).unwrap();
/// graph
///     .register(
///         CompositeService::new("server", |deps| {
///             let port = deps.get::<u16>("port").ok_or("no port")?;
///             Ok(Server { port: *port })
///         })
///         .depends_on(["port"])
///         .hook(
///             "bind",
///             |s: &Server| if s.port == 0 { Err("port 0".into()) } else { Ok(()) },
///             |_| Ok(()),
///         )
///         .into_node(),
///     )
///     .unwrap();
///
/// graph.start("server").unwrap();
/// assert_eq!(graph.status("server"), Some(NodeState::Up));
/// ```
pub struct CompositeService<T> {
    name: String,
    dependencies: Vec<String>,
    factory: Factory<T>,
    disposer: Option<Disposer<T>>,
    pipeline: ExtensionPipeline<T>,
}

impl<T: Any + Send + Sync> CompositeService<T> {
    /// Creates a composite service producing its value with `factory`.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Dependencies<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            factory: Box::new(factory),
            disposer: None,
            pipeline: ExtensionPipeline::new(),
        }
    }

    /// Adds node dependencies by name.
    #[must_use]
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Sets the disposer run after every stop-action.
    #[must_use]
    pub fn with_disposer<F>(mut self, disposer: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.disposer = Some(Arc::new(disposer));
        self
    }

    /// Appends an extension. Its declared dependencies become node dependencies.
    #[must_use]
    pub fn extension(mut self, extension: impl Extension<T>) -> Self {
        self.pipeline.add_extension(extension);
        self
    }

    /// Appends a hook built from a start-action and a stop-action.
    #[must_use]
    pub fn hook<S, P>(mut self, name: impl Into<String>, start: S, stop: P) -> Self
    where
        S: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
        P: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.pipeline.add_hook(name, start, stop);
        self
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the node dependencies, including those declared by extensions.
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        let mut dependencies = self.dependencies.clone();
        for dependency in self.pipeline.dependencies() {
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }
        dependencies
    }

    /// Builds the graph node.
    #[must_use]
    pub fn into_node(self) -> NodeDescriptor {
        let dependencies = self.dependencies();
        let name = self.name;
        let pipeline = Arc::new(self.pipeline);
        let disposer = self.disposer;
        let factory = self.factory;

        let start_pipeline = Arc::clone(&pipeline);
        let start_disposer = disposer.clone();
        let service = name.clone();

        NodeDescriptor::new(name, move |deps| {
            let value = factory(deps)?;
            if let Err(error) = start_pipeline.run_start(&value) {
                if let Some(disposer) = &start_disposer
                    && let Err(dispose_error) = disposer(&value)
                {
                    tracing::warn!(
                        service = %service,
                        error = %dispose_error,
                        "dispose after failed extension start failed"
                    );
                }
                return Err(error.into());
            }
            Ok(value)
        })
        .depends_on(dependencies)
        .with_disposer(move |value: &T| {
            let mut failures = pipeline.run_stop(value);
            if let Some(disposer) = &disposer
                && let Err(error) = disposer(value)
            {
                failures.push(HookFailure {
                    hook: "disposer".to_string(),
                    error,
                });
            }
            if failures.is_empty() {
                Ok(())
            } else {
                Err(ExtensionError::StopFailed { failures }.into())
            }
        })
    }
}

impl<T: 'static> fmt::Debug for CompositeService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeService")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
