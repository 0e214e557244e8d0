//! Ordered start/stop hooks with exact-reverse unwind.
//!
//! An [`ExtensionPipeline`] is assembled once, then run any number of times:
//!
//! 1. **Start** - start-actions run in registration order; each success is
//!    recorded as executed
//! 2. **Unwind** - if a start-action fails, the executed hooks are stopped in
//!    reverse order and the failure is returned
//! 3. **Stop** - stop-actions of the executed hooks run in reverse order; every
//!    hook gets its turn even when an earlier one fails
//!
//! Hooks run on the caller's thread while the pipeline's run lock is held, so
//! a hook must not call back into its own pipeline.

use core::any::type_name;
use core::fmt;
use core::marker::PhantomData;

use parking_lot::Mutex;

use crate::error::{BoxError, ExtensionError, HookFailure};

/// A start/stop action pair attached to a pipeline.
///
/// # Example
///
/// ```
/// use orrery_extension::{BoxError, Extension};
///
/// struct Warmup;
///
/// impl Extension<Vec<u32>> for Warmup {
///     fn start(&self, cache: &Vec<u32>) -> Result<(), BoxError> {
///         if cache.is_empty() {
///             return Err("nothing to warm".into());
///         }
///         Ok(())
///     }
///
///     fn dependencies(&self) -> Vec<String> {
///         vec!["metrics".to_string()]
///     }
/// }
/// ```
pub trait Extension<C>: Send + Sync + 'static {
    /// Runs when the owning service starts.
    ///
    /// # Errors
    ///
    /// A failure aborts the start and unwinds the hooks that already ran.
    fn start(&self, ctx: &C) -> Result<(), BoxError>;

    /// Runs when the owning service stops, in reverse start order.
    ///
    /// # Errors
    ///
    /// Failures are collected; the remaining hooks still stop.
    fn stop(&self, _ctx: &C) -> Result<(), BoxError> {
        Ok(())
    }

    /// Returns the hook's name for logs and errors.
    ///
    /// Default implementation returns the type name.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Names of graph nodes the owning service must depend on for this hook
    /// to work.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Extension built from a pair of closures.
struct FnExtension<C, S, T> {
    name: String,
    start: S,
    stop: T,
    _ctx: PhantomData<fn(&C)>,
}

impl<C, S, T> Extension<C> for FnExtension<C, S, T>
where
    C: 'static,
    S: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    T: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn start(&self, ctx: &C) -> Result<(), BoxError> {
        (self.start)(ctx)
    }

    fn stop(&self, ctx: &C) -> Result<(), BoxError> {
        (self.stop)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
struct RunState {
    started: bool,
    /// Indices of hooks whose start-action succeeded, in start order.
    executed: Vec<usize>,
}

/// Ordered list of extension hooks run against a context `C`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use orrery_extension::ExtensionPipeline;
///
/// let calls = Arc::new(Mutex::new(Vec::new()));
/// let mut pipeline = ExtensionPipeline::<()>::new();
/// for name in ["h1", "h2", "h3"] {
///     let (on_start, on_stop) = (Arc::clone(&calls), Arc::clone(&calls));
///     pipeline.add_hook(
///         name,
///         move |_| {
///             if name == "h2" {
///                 return Err("h2 failed".into());
///             }
///             on_start.lock().push(format!("{name}.start"));
///             Ok(())
///         },
///         move |_| {
///             on_stop.lock().push(format!("{name}.stop"));
///             Ok(())
///         },
///     );
/// }
///
/// assert!(pipeline.run_start(&()).is_err());
/// assert_eq!(*calls.lock(), ["h1.start", "h1.stop"]);
/// assert!(!pipeline.is_started());
/// ```
pub struct ExtensionPipeline<C> {
    hooks: Vec<Box<dyn Extension<C>>>,
    state: Mutex<RunState>,
}

impl<C: 'static> Default for ExtensionPipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> ExtensionPipeline<C> {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            state: Mutex::new(RunState::default()),
        }
    }

    /// Appends a hook built from a start-action and a stop-action.
    pub fn add_hook<S, T>(&mut self, name: impl Into<String>, start: S, stop: T) -> &mut Self
    where
        S: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
        T: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_extension(FnExtension {
            name: name.into(),
            start,
            stop,
            _ctx: PhantomData,
        })
    }

    /// Appends an [`Extension`].
    pub fn add_extension(&mut self, extension: impl Extension<C>) -> &mut Self {
        self.hooks.push(Box::new(extension));
        self
    }

    /// Runs every start-action in registration order.
    ///
    /// On failure, the hooks that already started are stopped in reverse order
    /// and the pipeline is left as if it had never started.
    ///
    /// # Errors
    ///
    /// - [`ExtensionError::StartFailed`] naming the failing hook
    /// - [`ExtensionError::AlreadyStarted`] if the pipeline is running
    pub fn run_start(&self, ctx: &C) -> Result<(), ExtensionError> {
        let mut state = self.state.lock();
        if state.started {
            return Err(ExtensionError::AlreadyStarted);
        }

        for (index, hook) in self.hooks.iter().enumerate() {
            tracing::debug!(hook = hook.name(), "starting extension");
            if let Err(source) = hook.start(ctx) {
                tracing::warn!(hook = hook.name(), error = %source, "extension failed to start");
                let unwind_failures = self.unwind(&mut state.executed, ctx);
                return Err(ExtensionError::StartFailed {
                    hook: hook.name().to_string(),
                    source,
                    unwind_failures,
                });
            }
            state.executed.push(index);
        }

        state.started = true;
        Ok(())
    }

    /// Runs the stop-action of every executed hook in reverse order.
    ///
    /// Failures do not stop the remaining hooks; they are logged and returned.
    /// Stopping a pipeline that is not started does nothing.
    pub fn run_stop(&self, ctx: &C) -> Vec<HookFailure> {
        let mut state = self.state.lock();
        state.started = false;
        self.unwind(&mut state.executed, ctx)
    }

    /// Returns true between a successful `run_start` and the next `run_stop`.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Returns the names of the hooks whose start-action has run, in start order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.state
            .lock()
            .executed
            .iter()
            .map(|&index| self.hooks[index].name().to_string())
            .collect()
    }

    /// Returns hook names in registration order.
    #[must_use]
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    /// Returns the union of the hooks' declared dependencies, in first-seen order.
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        let mut dependencies: Vec<String> = Vec::new();
        for dependency in self.hooks.iter().flat_map(|hook| hook.dependencies()) {
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }
        dependencies
    }

    /// Returns the number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if the pipeline has no hooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Stops `executed` hooks most recent first and clears the record.
    fn unwind(&self, executed: &mut Vec<usize>, ctx: &C) -> Vec<HookFailure> {
        let mut failures = Vec::new();
        while let Some(index) = executed.pop() {
            let hook = &self.hooks[index];
            tracing::debug!(hook = hook.name(), "stopping extension");
            if let Err(error) = hook.stop(ctx) {
                tracing::warn!(hook = hook.name(), %error, "extension failed to stop");
                failures.push(HookFailure {
                    hook: hook.name().to_string(),
                    error,
                });
            }
        }
        failures
    }
}

impl<C: 'static> fmt::Debug for ExtensionPipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|hook| hook.name()).collect();
        f.debug_struct("ExtensionPipeline")
            .field("hooks", &names)
            .field("started", &self.state.lock().started)
            .finish()
    }
}
