//! Error types for extension pipelines.

use core::fmt;

pub use orrery_graph::BoxError;

/// A stop-action failure collected during teardown.
pub struct HookFailure {
    /// Name of the hook whose stop-action failed.
    pub hook: String,
    /// The stop-action error.
    pub error: BoxError,
}

impl fmt::Debug for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookFailure")
            .field("hook", &self.hook)
            .field("error", &self.error.to_string())
            .finish()
    }
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.hook, self.error)
    }
}

/// Errors returned by [`ExtensionPipeline`](crate::ExtensionPipeline) runs.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// A start-action failed. The hooks that had already started were
    /// stopped again in reverse order before this error was returned.
    #[error("extension '{hook}' failed to start")]
    StartFailed {
        /// The hook whose start-action failed.
        hook: String,
        /// The start-action error.
        #[source]
        source: BoxError,
        /// Stop-actions that failed while unwinding.
        unwind_failures: Vec<HookFailure>,
    },

    /// `run_start` was called on a pipeline that is already started.
    #[error("extension pipeline is already started")]
    AlreadyStarted,

    /// One or more stop-actions failed. Every hook was still stopped.
    #[error("{} extension stop action(s) failed: {}", .failures.len(), render(.failures))]
    StopFailed {
        /// The collected failures, in the order they occurred.
        failures: Vec<HookFailure>,
    },
}

fn render(failures: &[HookFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
