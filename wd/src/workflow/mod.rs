//! Workflow subsystem: declarative definitions, step registry and the
//! executor that drives steps with injected context
//!
//! A workflow is an ordered list of step entries loaded from JSON
//! (with `extends` inheritance); a step is a registered executor keyed
//! `category.name`. Framework plug-ins extend the registry through
//! manifests under `<framework>.<step>` keys.

pub mod builtin;
mod context;
mod error;
mod executor;
mod loader;
mod registry;
mod step;

pub use builtin::{BuiltinDeps, register_builtin_steps};
pub use context::{CancelToken, StepContext};
pub use error::{StepError, WorkflowError};
pub use executor::{DEFAULT_STEP_TIMEOUT, ExecuteOptions, StepExecutor};
pub use loader::{ResolvedWorkflow, StepEntry, WorkflowDef, WorkflowLoader};
pub use registry::{RegisteredStep, StepRegistry};
pub use step::{Step, StepConfig, merge_options};
