//! Retry policy - one decision point for queue and analysis retries
//!
//! Failures are classified into behavioral kinds; the policy decides
//! whether another attempt is worthwhile and how long to back off.

use std::time::Duration;

use rand::Rng;

use crate::workflow::StepError;

/// Behavioral error categories (not exceptions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-supplied data rejected before side effects
    Validation,
    /// Referenced entity absent
    NotFound,
    /// State conflict (queue full, duplicate, already terminal)
    Conflict,
    /// Service-container failure
    Dependency,
    /// Per-step / per-item deadline exceeded
    Timeout,
    /// Memory threshold or resource cell exhausted
    ResourceExhaustion,
    /// External collaborator call errored
    Collaborator,
    /// Event-handler or broadcast hiccup
    Transient,
}

impl ErrorKind {
    /// Classify a step failure for the retry decision
    pub fn from_step_error(error: &StepError) -> Self {
        match error {
            StepError::Timeout { .. } => Self::Timeout,
            StepError::Cancelled { .. } => Self::Conflict,
            StepError::InvalidOptions { .. } => Self::Validation,
            StepError::NotRegistered(_) | StepError::Duplicate(_) | StepError::DependencyCycle { .. } => {
                Self::Dependency
            }
            StepError::ArtifactOverwrite { .. } => Self::Validation,
            StepError::Manifest { .. } => Self::Dependency,
            StepError::Failed { .. } => Self::Collaborator,
        }
    }
}

/// Outcome of a retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { backoff: Duration },
    GiveUp,
}

/// Centralised retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total executions allowed, first attempt included
    pub max_attempts: u32,
    /// Backoff before attempt n+1; the last entry repeats
    pub backoff_schedule: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_schedule: vec![Duration::from_millis(500), Duration::from_secs(2)],
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately (used by tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_schedule: vec![Duration::ZERO],
        }
    }

    /// Whether this kind of failure can succeed on another attempt
    pub fn retryable(&self, kind: ErrorKind) -> bool {
        matches!(kind, ErrorKind::Timeout | ErrorKind::Collaborator | ErrorKind::Transient)
    }

    /// Decide the fate of a failed attempt
    ///
    /// `attempts` counts executions already made. Backoff carries up
    /// to 10% jitter so synchronized retries spread out.
    pub fn decide(&self, attempts: u32, kind: ErrorKind) -> RetryDecision {
        if attempts >= self.max_attempts || !self.retryable(kind) {
            return RetryDecision::GiveUp;
        }

        let index = (attempts.saturating_sub(1)) as usize;
        let base = self
            .backoff_schedule
            .get(index)
            .or_else(|| self.backoff_schedule.last())
            .copied()
            .unwrap_or(Duration::ZERO);

        let jitter = 1.0 + rand::rng().random_range(0.0..0.1);
        RetryDecision::Retry {
            backoff: base.mul_f64(jitter),
        }
    }
}
