//! Analysis executor - sequential per-type runs with degradation
//!
//! Types run one after another to bound peak memory. Before each type
//! the heap is probed: above the threshold the run degrades (smaller
//! batches, relaxed threshold); at or over the full budget the job
//! ends `partial` with reason `memory`. Each type has its own
//! deadline from the timeout table; partial results accumulated so
//! far always survive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use projectstore::{AnalysisRecord, AnalysisRepository, AnalysisState};
use serde_json::{Value, json};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::events::{EventBus, topics};
use crate::workflow::CancelToken;

use super::analyzers::{analyzer_for, recommendations_from};
use super::config::AnalysisConfig;
use super::job::{AnalysisJob, AnalysisOutcome, AnalysisType, PartialReason};
use super::memory::{DegradationState, MemoryProbe};
use super::scanner::{FileScanner, ScanEvent};

/// Runs one analysis job to completion or partial
pub struct AnalysisExecutor {
    config: AnalysisConfig,
    bus: Arc<EventBus>,
    scanner: FileScanner,
    probe: Arc<dyn MemoryProbe>,
    repo: Arc<dyn AnalysisRepository>,
}

impl AnalysisExecutor {
    pub fn new(
        config: AnalysisConfig,
        bus: Arc<EventBus>,
        scanner: FileScanner,
        probe: Arc<dyn MemoryProbe>,
        repo: Arc<dyn AnalysisRepository>,
    ) -> Self {
        Self {
            config,
            bus,
            scanner,
            probe,
            repo,
        }
    }

    pub async fn run(&self, job: &AnalysisJob, token: CancelToken) -> AnalysisOutcome {
        let started = Instant::now();
        let started_at = Utc::now();
        info!(job_id = %job.job_id, types = job.types.len(), "Analysis started");

        self.bus
            .publish(
                topics::ANALYSIS_STARTED,
                json!({
                    "jobId": job.job_id,
                    "projectId": job.project_id,
                    "types": job.types,
                }),
            )
            .await;

        let _ = self
            .repo
            .save(AnalysisRecord {
                job_id: job.job_id.clone(),
                project_id: job.project_id.clone(),
                types: job.types.iter().map(|t| t.to_string()).collect(),
                state: AnalysisState::Running,
                started_at,
                finished_at: None,
                result: None,
                partial: false,
                reason: None,
            })
            .await;

        let mut degradation = DegradationState::new(self.config.streaming_batch_size, self.config.memory_threshold);
        let mut results: HashMap<AnalysisType, Value> = HashMap::new();
        let mut violations: Vec<Value> = Vec::new();
        let mut reason: Option<PartialReason> = None;

        // Recommendations derives from the others, so it always goes last
        let mut ordered: Vec<AnalysisType> = job
            .types
            .iter()
            .copied()
            .filter(|t| *t != AnalysisType::Recommendations)
            .collect();
        if job.types.contains(&AnalysisType::Recommendations) {
            ordered.push(AnalysisType::Recommendations);
        }

        for analysis_type in ordered {
            if token.is_cancelled() {
                reason = Some(PartialReason::Cancelled);
                break;
            }
            if started.elapsed().as_millis() as u64 >= job.timeout_ms {
                reason = Some(PartialReason::Timeout);
                break;
            }

            let heap = self.probe.heap_bytes();
            let ratio = heap as f64 / job.memory_budget_bytes as f64;
            if ratio > degradation.threshold {
                warn!(job_id = %job.job_id, ratio, "Memory pressure, degrading");
                degradation.degrade();
            }
            if heap >= job.memory_budget_bytes {
                reason = Some(PartialReason::Memory);
                break;
            }

            match self
                .run_type(job, analysis_type, degradation.batch_size, &token, &results, &mut violations)
                .await
            {
                TypeRun::Finished(value) => {
                    results.insert(analysis_type, value);
                }
                TypeRun::Partial(value, r) => {
                    results.insert(analysis_type, value);
                    reason = Some(r);
                    break;
                }
            }
        }

        let state = match reason {
            None => AnalysisState::Completed,
            Some(_) => AnalysisState::Partial,
        };

        let results_json: HashMap<String, Value> =
            results.iter().map(|(t, v)| (t.to_string(), v.clone())).collect();

        let _ = self
            .repo
            .save(AnalysisRecord {
                job_id: job.job_id.clone(),
                project_id: job.project_id.clone(),
                types: job.types.iter().map(|t| t.to_string()).collect(),
                state,
                started_at,
                finished_at: Some(Utc::now()),
                result: Some(json!(results_json)),
                partial: state == AnalysisState::Partial,
                reason: reason.map(|r| r.to_string()),
            })
            .await;

        self.bus
            .publish(
                topics::ANALYSIS_COMPLETED,
                json!({
                    "jobId": job.job_id,
                    "projectId": job.project_id,
                    "state": state.to_string(),
                    "reason": reason.map(|r| r.to_string()),
                    "completedTypes": results_json.keys().collect::<Vec<_>>(),
                    "fallbackTriggers": degradation.fallback_triggers,
                }),
            )
            .await;

        info!(job_id = %job.job_id, state = %state, "Analysis finished");
        AnalysisOutcome {
            job_id: job.job_id.clone(),
            project_id: job.project_id.clone(),
            state,
            results: results_json,
            reason,
            fallback_triggers: degradation.fallback_triggers,
            violations,
        }
    }

    async fn run_type(
        &self,
        job: &AnalysisJob,
        analysis_type: AnalysisType,
        batch_size: usize,
        token: &CancelToken,
        results: &HashMap<AnalysisType, Value>,
        violations: &mut Vec<Value>,
    ) -> TypeRun {
        debug!(job_id = %job.job_id, %analysis_type, batch_size, "Running analysis type");

        let Some(mut analyzer) = analyzer_for(analysis_type) else {
            // Recommendations: derived, no scan
            let value = recommendations_from(results);
            self.publish_progress(job, analysis_type, 0, true).await;
            return TypeRun::Finished(value);
        };

        let deadline = self.config.type_timeout(analysis_type);
        let type_started = Instant::now();
        let mut rx = self.scanner.spawn_scan(&job.project_path, batch_size, token.child());
        let mut files_seen = 0usize;

        loop {
            if token.is_cancelled() {
                return TypeRun::Partial(partial(analyzer.finish()), PartialReason::Cancelled);
            }

            let remaining = deadline.saturating_sub(type_started.elapsed());
            if remaining.is_zero() {
                return TypeRun::Partial(partial(analyzer.finish()), PartialReason::Timeout);
            }

            match timeout(remaining, rx.recv()).await {
                Err(_) => {
                    warn!(job_id = %job.job_id, %analysis_type, "Analysis type timed out");
                    return TypeRun::Partial(partial(analyzer.finish()), PartialReason::Timeout);
                }
                Ok(None) => {
                    // Producer stopped without a Done marker: cancelled scan
                    return TypeRun::Partial(partial(analyzer.finish()), PartialReason::Cancelled);
                }
                Ok(Some(ScanEvent::Batch(batch))) => {
                    files_seen += batch.len();
                    for file in &batch {
                        analyzer.ingest(file);
                    }
                    self.publish_progress(job, analysis_type, files_seen, false).await;
                }
                Ok(Some(ScanEvent::Violation(violation))) => {
                    violations.push(json!(violation));
                }
                Ok(Some(ScanEvent::Done(total))) => {
                    self.publish_progress(job, analysis_type, total, true).await;
                    return TypeRun::Finished(analyzer.finish());
                }
            }
        }
    }

    async fn publish_progress(&self, job: &AnalysisJob, analysis_type: AnalysisType, files: usize, done: bool) {
        self.bus
            .publish(
                topics::ANALYSIS_PROGRESS,
                json!({
                    "jobId": job.job_id,
                    "projectId": job.project_id,
                    "type": analysis_type.to_string(),
                    "filesScanned": files,
                    "done": done,
                }),
            )
            .await;
    }
}

enum TypeRun {
    Finished(Value),
    Partial(Value, PartialReason),
}

/// Tag a truncated per-type result
fn partial(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("partial".to_string(), Value::Bool(true));
    }
    value
}
