//! Analysis subsystem: memory-budgeted per-project queue for
//! long-running project analyses with streaming partial results
//!
//! Analyses bypass the task queue entirely; their resource profile
//! (heap-bound scans over whole project trees) gets its own admission
//! path, progressive degradation and partial-result fallback.

mod analyzers;
mod config;
mod error;
mod executor;
mod job;
mod memory;
mod queue;
mod scanner;

pub use analyzers::{Analyzer, analyzer_for, recommendations_from};
pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use executor::AnalysisExecutor;
pub use job::{AnalysisJob, AnalysisOutcome, AnalysisState, AnalysisSubmission, AnalysisType, PartialReason};
pub use memory::{DegradationState, MemoryProbe, ProcessMemoryProbe, mock::ScriptedProbe};
pub use queue::{AnalysisOptions, AnalysisQueue, ResourceCell};
pub use scanner::{FileScanner, ScanEvent, ScanLimits, ScannedFile, Violation};
