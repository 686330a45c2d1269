//! Analysis queue - per-project admission with resource accounting
//!
//! One analysis runs per project at a time; further requests wait in
//! FIFO order and start automatically as slots free up. Every start
//! and finish goes through the project's resource cell so the
//! memory/concurrency invariants hold by construction.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use projectstore::{AnalysisState, Priority};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::events::{EventBus, topics};
use crate::workflow::CancelToken;

use super::config::AnalysisConfig;
use super::error::AnalysisError;
use super::executor::AnalysisExecutor;
use super::job::{AnalysisJob, AnalysisSubmission, AnalysisType};

/// Per-project resource accounting
///
/// Mutated only through `allocate`/`release`; the invariants
/// `memory_bytes_in_use <= max_memory` and `concurrent_running <=
/// max_concurrent` hold at every exit.
#[derive(Debug, Default, Clone)]
pub struct ResourceCell {
    pub memory_bytes_in_use: u64,
    pub concurrent_running: usize,
}

impl ResourceCell {
    fn allocate(&mut self, memory: u64, max_memory: u64, max_concurrent: usize) -> bool {
        if self.concurrent_running >= max_concurrent || self.memory_bytes_in_use + memory > max_memory {
            return false;
        }
        self.memory_bytes_in_use += memory;
        self.concurrent_running += 1;
        true
    }

    fn release(&mut self, memory: u64) {
        self.memory_bytes_in_use = self.memory_bytes_in_use.saturating_sub(memory);
        self.concurrent_running = self.concurrent_running.saturating_sub(1);
    }
}

struct ActiveJob {
    job_id: String,
    memory: u64,
    token: CancelToken,
}

#[derive(Default)]
struct Inner {
    active: HashMap<String, ActiveJob>,
    waiting: HashMap<String, VecDeque<AnalysisJob>>,
    cells: HashMap<String, ResourceCell>,
}

/// Analysis request options
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub priority: Priority,
    pub timeout_ms: Option<u64>,
}

/// Memory-budgeted, per-project analysis queue
pub struct AnalysisQueue {
    config: AnalysisConfig,
    bus: Arc<EventBus>,
    executor: Arc<AnalysisExecutor>,
    inner: Mutex<Inner>,
}

impl AnalysisQueue {
    pub fn new(config: AnalysisConfig, bus: Arc<EventBus>, executor: Arc<AnalysisExecutor>) -> Arc<Self> {
        Arc::new(Self {
            config,
            bus,
            executor,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Submit an analysis request
    ///
    /// When the project is idle the job starts immediately and is
    /// reported `running` at position 1; otherwise it joins the
    /// project's waiting line.
    pub async fn process_analysis_request(
        self: &Arc<Self>,
        project_id: &str,
        project_path: impl Into<PathBuf>,
        types: Vec<AnalysisType>,
        options: AnalysisOptions,
    ) -> Result<AnalysisSubmission, AnalysisError> {
        if types.is_empty() {
            return Err(AnalysisError::NoTypes);
        }

        let job = AnalysisJob::new(
            project_id,
            project_path,
            types,
            options.priority,
            options.timeout_ms.unwrap_or(self.config.analysis_timeout_ms),
            self.config.max_memory_per_analysis,
        );
        let job_id = job.job_id.clone();

        let started = {
            let mut inner = self.inner.lock().await;
            if inner.active.contains_key(project_id) {
                let waiting = inner.waiting.entry(project_id.to_string()).or_default();
                waiting.push_back(job);
                let position = waiting.len() + 1;
                debug!(job_id = %job_id, position, "Analysis queued");
                return Ok(AnalysisSubmission {
                    job_id,
                    state: AnalysisState::Queued,
                    position,
                    estimated_wait_ms: position as u64 * self.config.analysis_timeout_ms / 2,
                });
            }
            self.activate_locked(&mut inner, job)
        };

        if !started {
            // The resource cell refused; the job went to the line
            return Ok(AnalysisSubmission {
                job_id,
                state: AnalysisState::Queued,
                position: 2,
                estimated_wait_ms: self.config.analysis_timeout_ms / 2,
            });
        }

        Ok(AnalysisSubmission {
            job_id,
            state: AnalysisState::Running,
            position: 1,
            estimated_wait_ms: 0,
        })
    }

    /// Mark active and spawn the executor; falls back to the waiting
    /// line when the resource cell refuses. Returns whether it started.
    fn activate_locked(self: &Arc<Self>, inner: &mut Inner, job: AnalysisJob) -> bool {
        let project_id = job.project_id.clone();
        let cell = inner.cells.entry(project_id.clone()).or_default();
        if !cell.allocate(
            job.memory_budget_bytes,
            self.config.max_memory_per_analysis * self.config.max_concurrent_per_project as u64,
            self.config.max_concurrent_per_project,
        ) {
            warn!(%project_id, "Resource cell refused analysis, queueing");
            inner.waiting.entry(project_id).or_default().push_back(job);
            return false;
        }

        let token = CancelToken::new();
        inner.active.insert(
            project_id.clone(),
            ActiveJob {
                job_id: job.job_id.clone(),
                memory: job.memory_budget_bytes,
                token: token.clone(),
            },
        );

        let queue = self.clone();
        tokio::spawn(async move {
            let _ = queue.executor.run(&job, token).await;
            queue.on_job_finished(&job.project_id).await;
        });
        true
    }

    async fn on_job_finished(self: &Arc<Self>, project_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.active.remove(project_id) {
            if let Some(cell) = inner.cells.get_mut(project_id) {
                cell.release(active.memory);
            }
        }

        // Promote the next waiting job for this project
        let next = inner.waiting.get_mut(project_id).and_then(|w| w.pop_front());
        if let Some(job) = next {
            info!(project_id, job_id = %job.job_id, "Promoting queued analysis");
            self.activate_locked(&mut inner, job);
        }
    }

    /// Cancel an active or waiting job
    pub async fn cancel(&self, job_id: &str) -> Result<(), AnalysisError> {
        let cancelled_waiting = {
            let mut inner = self.inner.lock().await;

            if let Some(active) = inner.active.values().find(|a| a.job_id == job_id) {
                active.token.cancel();
                debug!(job_id, "Requested analysis cancellation");
                return Ok(());
            }

            let mut found = None;
            for (project_id, waiting) in inner.waiting.iter_mut() {
                if let Some(index) = waiting.iter().position(|j| j.job_id == job_id) {
                    let job = waiting.remove(index).unwrap();
                    found = Some((project_id.clone(), job));
                    break;
                }
            }
            found
        };

        match cancelled_waiting {
            Some((project_id, job)) => {
                self.bus
                    .publish(
                        topics::ANALYSIS_COMPLETED,
                        json!({
                            "jobId": job.job_id,
                            "projectId": project_id,
                            "state": "cancelled",
                            "reason": "cancelled",
                        }),
                    )
                    .await;
                Ok(())
            }
            None => Err(AnalysisError::JobNotFound(job_id.to_string())),
        }
    }

    /// Snapshot of a project's analysis pipeline
    pub async fn status(&self, project_id: &str) -> (Option<String>, Vec<String>) {
        let inner = self.inner.lock().await;
        let active = inner.active.get(project_id).map(|a| a.job_id.clone());
        let waiting = inner
            .waiting
            .get(project_id)
            .map(|w| w.iter().map(|j| j.job_id.clone()).collect())
            .unwrap_or_default();
        (active, waiting)
    }

    /// Current resource cell for a project (test/metrics aid)
    pub async fn resource_cell(&self, project_id: &str) -> ResourceCell {
        self.inner.lock().await.cells.get(project_id).cloned().unwrap_or_default()
    }
}
