//! Task queue subsystem: per-project priority queues and the worker
//! loop that drains them into the step engine

mod config;
mod core;
mod error;
mod item;
mod processor;
mod retry;

pub use config::QueueConfig;
pub use core::{
    BulkOp, BulkOutcome, Dispatch, EnqueueRequest, QueueItemView, QueueStatus, RunOutcome, TaskQueue,
};
pub use error::QueueError;
pub use item::{QueueItem, QueueItemState, QueueSubmission};
pub use processor::{ProcessorConfig, TaskProcessor};
pub use retry::{ErrorKind, RetryDecision, RetryPolicy};
