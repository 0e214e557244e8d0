//! Extension hooks for Orrery services.
//!
//! An [`ExtensionPipeline`] runs an ordered list of [`Extension`]s against a
//! context value. Start-actions run in registration order; stop-actions run in
//! exact reverse order, and only for the hooks that actually started. A failed
//! start unwinds what already ran before the error is returned.
//!
//! [`CompositeService`] ties a pipeline to a graph node: the node's value is
//! built by its factory, then handed to the pipeline as the context.
//!
//! # Example
//!
//! ```
//! use orrery_extension::{ExtensionError, ExtensionPipeline};
//!
//! let mut pipeline = ExtensionPipeline::<String>::new();
//! pipeline
//!     .add_hook("open", |_| Ok(()), |_| Ok(()))
//!     .add_hook(
//!         "check",
//!         |s: &String| if s.is_empty() { Err("empty".into()) } else { Ok(()) },
//!         |_| Ok(()),
//!     );
//!
//! let err = pipeline.run_start(&String::new()).unwrap_err();
//! assert!(matches!(err, ExtensionError::StartFailed { ref hook, .. } if hook == "check"));
//! assert!(pipeline.executed().is_empty());
//!
//! pipeline.run_start(&String::from("ready")).unwrap();
//! assert_eq!(pipeline.executed(), ["open", "check"]);
//! assert!(pipeline.run_stop(&String::from("ready")).is_empty());
//! ```

/// Composite services built from a factory and an extension pipeline.
pub mod composite;

/// Error types.
pub mod error;

/// Extensions and the pipeline that runs them.
pub mod pipeline;

pub use composite::CompositeService;
pub use error::{BoxError, ExtensionError, HookFailure};
pub use pipeline::{Extension, ExtensionPipeline};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::composite::*;
    pub use crate::error::*;
    pub use crate::pipeline::*;
}
