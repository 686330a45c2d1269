//! Task queue core - per-project FIFO with priority override
//!
//! The queue exclusively owns queue-item mutation; everything else
//! observes snapshots and events. Higher priorities slot ahead of
//! strictly-lower ones in the queued band but never pre-empt a running
//! item; within a band order is FIFO by enqueue time. Terminal items
//! move to the bounded per-project history.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use projectstore::{Priority, QueueHistoryEntry, QueueHistoryRepository, TaskRepository};
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::events::{EventBus, topics};
use crate::workflow::CancelToken;

use super::config::QueueConfig;
use super::error::QueueError;
use super::item::{QueueItem, QueueItemState, QueueSubmission};
use super::retry::{ErrorKind, RetryDecision, RetryPolicy};

/// A dequeued item handed to the processor
pub struct Dispatch {
    pub item: QueueItem,
    pub token: CancelToken,
}

/// Terminal outcome reported back by the processor
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed,
    Failed { kind: ErrorKind, reason: String },
    Cancelled,
}

/// Bulk operation selector
#[derive(Debug, Clone, Copy)]
pub enum BulkOp {
    Pause,
    Resume,
    Cancel,
    Reprioritize(Priority),
}

/// Per-id outcome of a bulk call
#[derive(Debug)]
pub struct BulkOutcome {
    pub queue_item_id: String,
    pub result: Result<(), QueueError>,
}

/// Snapshot entry with its derived position
#[derive(Debug, Clone)]
pub struct QueueItemView {
    pub item: QueueItem,
    /// 1 = next to run, 0 = running, -1 = history
    pub position: i64,
}

/// Snapshot of one project's queue
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub active: Vec<QueueItemView>,
    pub queued: Vec<QueueItemView>,
    pub history: Vec<QueueHistoryEntry>,
}

struct RunningEntry {
    item: QueueItem,
    token: CancelToken,
}

#[derive(Default)]
struct ProjectQueue {
    /// Queued and paused items in dequeue order
    queued: Vec<QueueItem>,
    running: HashMap<String, RunningEntry>,
    total_duration_ms: u64,
    completed_runs: u64,
}

impl ProjectQueue {
    fn size(&self) -> usize {
        self.queued.len() + self.running.len()
    }

    fn avg_duration_ms(&self, default: u64) -> u64 {
        if self.completed_runs == 0 {
            default
        } else {
            self.total_duration_ms / self.completed_runs
        }
    }

    /// Insert ahead of strictly-lower priorities, behind its own band
    fn insert_by_priority(&mut self, item: QueueItem) -> usize {
        let index = self
            .queued
            .iter()
            .position(|queued| queued.priority < item.priority)
            .unwrap_or(self.queued.len());
        self.queued.insert(index, item);
        index
    }
}

/// Per-project priority queues with admission, retries and history
pub struct TaskQueue {
    config: QueueConfig,
    retry: RetryPolicy,
    bus: Arc<EventBus>,
    tasks: Arc<dyn TaskRepository>,
    history: Arc<dyn QueueHistoryRepository>,
    projects: Mutex<HashMap<String, ProjectQueue>>,
    notify: Notify,
}

/// Admission request
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub project_id: String,
    pub user_id: String,
    pub task_id: Option<String>,
    pub task_mode: String,
    pub workflow_id: Option<String>,
    pub priority: Priority,
    pub options: Value,
}

impl TaskQueue {
    pub fn new(
        config: QueueConfig,
        retry: RetryPolicy,
        bus: Arc<EventBus>,
        tasks: Arc<dyn TaskRepository>,
        history: Arc<dyn QueueHistoryRepository>,
    ) -> Self {
        Self {
            config,
            retry,
            bus,
            tasks,
            history,
            projects: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Admit a task (or task-create workflow) into its project queue
    ///
    /// Task existence and non-terminal status are validated unless the
    /// request is a create-workflow (no `task_id`). Emits
    /// `queue:item:added` with the derived position.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<QueueSubmission, QueueError> {
        if let Some(task_id) = &request.task_id {
            let task = self
                .tasks
                .find_by_id(task_id)
                .await
                .ok_or_else(|| QueueError::TaskNotFound(task_id.clone()))?;
            if task.status.is_terminal() {
                return Err(QueueError::TaskAlreadyTerminal {
                    task_id: task_id.clone(),
                    status: task.status.to_string(),
                });
            }
        }

        let mut item = QueueItem::new(
            request.project_id.clone(),
            request.user_id,
            request.task_id,
            request.task_mode,
            request.priority,
            request.options,
            self.config.max_attempts,
        );
        item.workflow_id = request.workflow_id;

        let (submission, payload) = {
            let mut projects = self.projects.lock().await;
            let project = projects.entry(request.project_id.clone()).or_default();

            if project.size() >= self.config.max_size {
                return Err(QueueError::QueueFull {
                    project_id: request.project_id,
                    max_size: self.config.max_size,
                });
            }

            let queue_item_id = item.queue_item_id.clone();
            let priority = item.priority;
            let task_id = item.task_id.clone();
            let index = project.insert_by_priority(item);
            let position = index + 1;

            let avg = project.avg_duration_ms(self.config.default_eta_ms);
            let estimated_start = Utc::now() + chrono::Duration::milliseconds((position as u64 * avg) as i64);

            let submission = QueueSubmission {
                queue_item_id: queue_item_id.clone(),
                position,
                estimated_start,
            };
            let payload = json!({
                "queueItemId": queue_item_id,
                "projectId": request.project_id,
                "taskId": task_id,
                "priority": priority,
                "state": "queued",
                "position": position,
                "estimatedStart": estimated_start,
            });
            (submission, payload)
        };

        info!(
            queue_item_id = %submission.queue_item_id,
            position = submission.position,
            "Enqueued"
        );
        self.bus.publish(topics::QUEUE_ITEM_ADDED, payload).await;
        self.notify.notify_one();
        Ok(submission)
    }

    /// Snapshot of one project's queue
    pub async fn status(&self, project_id: &str) -> QueueStatus {
        let (active, queued) = {
            let projects = self.projects.lock().await;
            match projects.get(project_id) {
                Some(project) => {
                    let active = project
                        .running
                        .values()
                        .map(|entry| QueueItemView {
                            item: entry.item.clone(),
                            position: 0,
                        })
                        .collect();
                    let queued = project
                        .queued
                        .iter()
                        .enumerate()
                        .map(|(index, item)| QueueItemView {
                            item: item.clone(),
                            position: (index + 1) as i64,
                        })
                        .collect();
                    (active, queued)
                }
                None => (Vec::new(), Vec::new()),
            }
        };

        QueueStatus {
            active,
            queued,
            history: self.history.for_project(project_id).await,
        }
    }

    /// Pause a queued item; it keeps its position but is skipped by
    /// the processor
    pub async fn pause(&self, queue_item_id: &str) -> Result<(), QueueError> {
        self.toggle_pause(queue_item_id, true).await
    }

    /// Resume a paused item
    pub async fn resume(&self, queue_item_id: &str) -> Result<(), QueueError> {
        self.toggle_pause(queue_item_id, false).await
    }

    async fn toggle_pause(&self, queue_item_id: &str, pause: bool) -> Result<(), QueueError> {
        let payload = {
            let mut projects = self.projects.lock().await;
            let (project, index) = find_queued(&mut projects, queue_item_id)?;
            let item = &mut project.queued[index];

            let (from, to, operation) = if pause {
                (QueueItemState::Queued, QueueItemState::Paused, "pause")
            } else {
                (QueueItemState::Paused, QueueItemState::Queued, "resume")
            };
            if item.state != from {
                return Err(QueueError::InvalidState {
                    queue_item_id: queue_item_id.to_string(),
                    state: item.state.to_string(),
                    operation,
                });
            }
            item.state = to;
            json!({
                "queueItemId": item.queue_item_id,
                "projectId": item.project_id,
                "state": to.to_string(),
                "position": index + 1,
            })
        };

        self.bus.publish(topics::QUEUE_ITEM_UPDATED, payload).await;
        if !pause {
            self.notify.notify_one();
        }
        Ok(())
    }

    /// Cancel an item
    ///
    /// Queued and paused items are removed immediately and produce
    /// their terminal `queue:item:completed`. A running item gets its
    /// token cancelled; the terminal event follows when the processor
    /// observes the cancellation.
    pub async fn cancel(&self, queue_item_id: &str) -> Result<(), QueueError> {
        enum Found {
            Removed(QueueItem),
            RunningCancelled,
            Missing,
        }

        let found = {
            let mut projects = self.projects.lock().await;
            let mut found = Found::Missing;
            for project in projects.values_mut() {
                if let Some(index) = project.queued.iter().position(|i| i.queue_item_id == queue_item_id) {
                    found = Found::Removed(project.queued.remove(index));
                    break;
                }
                if let Some(entry) = project.running.get(queue_item_id) {
                    entry.token.cancel();
                    found = Found::RunningCancelled;
                    break;
                }
            }
            found
        };

        match found {
            Found::Removed(item) => {
                self.finalize(item, QueueItemState::Cancelled, None).await;
                Ok(())
            }
            Found::RunningCancelled => {
                debug!(queue_item_id, "Requested cooperative cancellation");
                Ok(())
            }
            Found::Missing => Err(QueueError::ItemNotFound(queue_item_id.to_string())),
        }
    }

    /// Re-slot a queued item to a 1-based position in the queued band
    pub async fn reorder(&self, queue_item_id: &str, new_position: usize) -> Result<(), QueueError> {
        let payload = {
            let mut projects = self.projects.lock().await;
            let (project, index) = find_queued(&mut projects, queue_item_id)?;

            if new_position == 0 || new_position > project.queued.len() {
                return Err(QueueError::InvalidPosition {
                    position: new_position,
                    len: project.queued.len(),
                });
            }

            let item = project.queued.remove(index);
            let payload = json!({
                "queueItemId": item.queue_item_id,
                "projectId": item.project_id,
                "state": item.state.to_string(),
                "position": new_position,
            });
            project.queued.insert(new_position - 1, item);
            payload
        };

        self.bus.publish(topics::QUEUE_ITEM_UPDATED, payload).await;
        Ok(())
    }

    /// Change a queued item's priority and re-slot it into its band
    pub async fn reprioritize(&self, queue_item_id: &str, priority: Priority) -> Result<(), QueueError> {
        let payload = {
            let mut projects = self.projects.lock().await;
            let (project, index) = find_queued(&mut projects, queue_item_id)?;

            let mut item = project.queued.remove(index);
            item.priority = priority;
            let new_index = project.insert_by_priority(item);
            let item = &project.queued[new_index];
            json!({
                "queueItemId": item.queue_item_id,
                "projectId": item.project_id,
                "state": item.state.to_string(),
                "priority": priority,
                "position": new_index + 1,
            })
        };

        self.bus.publish(topics::QUEUE_ITEM_UPDATED, payload).await;
        Ok(())
    }

    /// Apply one operation to many items, reporting per-id outcomes
    pub async fn bulk(&self, op: BulkOp, queue_item_ids: &[String]) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(queue_item_ids.len());
        for queue_item_id in queue_item_ids {
            let result = match op {
                BulkOp::Pause => self.pause(queue_item_id).await,
                BulkOp::Resume => self.resume(queue_item_id).await,
                BulkOp::Cancel => self.cancel(queue_item_id).await,
                BulkOp::Reprioritize(priority) => self.reprioritize(queue_item_id, priority).await,
            };
            outcomes.push(BulkOutcome {
                queue_item_id: queue_item_id.clone(),
                result,
            });
        }
        outcomes
    }

    /// Pull the next runnable item across all projects
    ///
    /// Skips paused items and projects at their concurrency cap. The
    /// returned item has been marked running (with `attempts`
    /// incremented) and `queue:item:updated` published.
    pub async fn take_next(&self) -> Option<Dispatch> {
        let (dispatch, payload) = {
            let mut projects = self.projects.lock().await;

            let mut found = None;
            for (project_id, project) in projects.iter_mut() {
                if project.running.len() >= self.config.max_concurrent_per_project {
                    continue;
                }
                if let Some(index) = project.queued.iter().position(|item| item.state == QueueItemState::Queued) {
                    found = Some((project_id.clone(), index));
                    break;
                }
            }

            let (project_id, index) = found?;
            let project = projects.get_mut(&project_id).unwrap();
            let mut item = project.queued.remove(index);
            item.state = QueueItemState::Running;
            item.started_at = Some(Utc::now());
            item.attempts += 1;

            let token = CancelToken::new();
            let payload = json!({
                "queueItemId": item.queue_item_id,
                "projectId": item.project_id,
                "taskId": item.task_id,
                "state": "running",
                "attempts": item.attempts,
                "position": 0,
            });
            project.running.insert(
                item.queue_item_id.clone(),
                RunningEntry {
                    item: item.clone(),
                    token: token.clone(),
                },
            );
            (Some(Dispatch { item, token }), payload)
        };

        self.bus.publish(topics::QUEUE_ITEM_UPDATED, payload).await;
        dispatch
    }

    /// Report the outcome of a dispatched item
    ///
    /// Failures consult the retry policy: a retryable failure with
    /// attempts remaining re-enters the queued band at its priority
    /// tail after the policy's backoff; anything else is terminal.
    /// Returns the terminal state, or `None` when the item was
    /// requeued for another attempt.
    pub async fn complete_item(self: &Arc<Self>, queue_item_id: &str, outcome: RunOutcome) -> Option<QueueItemState> {
        let entry = {
            let mut projects = self.projects.lock().await;
            find_running_owned(&mut projects, queue_item_id)
        };
        let Some(mut item) = entry else {
            warn!(queue_item_id, "complete_item: not running, ignoring");
            return None;
        };

        match outcome {
            RunOutcome::Completed => {
                self.record_duration(&item).await;
                self.finalize(item, QueueItemState::Completed, None).await;
                Some(QueueItemState::Completed)
            }
            RunOutcome::Cancelled => {
                self.finalize(item, QueueItemState::Cancelled, Some("cancelled".to_string())).await;
                Some(QueueItemState::Cancelled)
            }
            RunOutcome::Failed { kind, reason } => match self.retry.decide(item.attempts, kind) {
                RetryDecision::Retry { backoff } => {
                    item.state = QueueItemState::Queued;
                    item.started_at = None;
                    info!(
                        queue_item_id = %item.queue_item_id,
                        attempts = item.attempts,
                        ?backoff,
                        "Retrying"
                    );
                    self.requeue_after(item, backoff);
                    None
                }
                RetryDecision::GiveUp => {
                    self.finalize(item, QueueItemState::Failed, Some(reason)).await;
                    Some(QueueItemState::Failed)
                }
            },
        }
    }

    fn requeue_after(self: &Arc<Self>, item: QueueItem, backoff: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            let payload = {
                let mut projects = queue.projects.lock().await;
                let project = projects.entry(item.project_id.clone()).or_default();
                let payload = json!({
                    "queueItemId": item.queue_item_id,
                    "projectId": item.project_id,
                    "state": "queued",
                    "attempts": item.attempts,
                });
                project.insert_by_priority(item);
                payload
            };
            queue.bus.publish(topics::QUEUE_ITEM_UPDATED, payload).await;
            queue.notify.notify_one();
        });
    }

    async fn record_duration(&self, item: &QueueItem) {
        if let Some(started_at) = item.started_at {
            let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
            let mut projects = self.projects.lock().await;
            if let Some(project) = projects.get_mut(&item.project_id) {
                project.total_duration_ms += duration_ms;
                project.completed_runs += 1;
            }
        }
    }

    /// Terminal transition: history entry + exactly one completed event
    async fn finalize(&self, mut item: QueueItem, state: QueueItemState, reason: Option<String>) {
        item.state = state;
        item.finished_at = Some(Utc::now());

        self.history
            .record(QueueHistoryEntry {
                queue_item_id: item.queue_item_id.clone(),
                project_id: item.project_id.clone(),
                task_id: item.task_id.clone(),
                state: state.to_string(),
                reason: reason.clone(),
                attempts: item.attempts,
                enqueued_at: item.enqueued_at,
                finished_at: item.finished_at.unwrap_or_else(Utc::now),
            })
            .await;

        let payload = json!({
            "queueItemId": item.queue_item_id,
            "projectId": item.project_id,
            "taskId": item.task_id,
            "state": state.to_string(),
            "reason": reason,
            "attempts": item.attempts,
            "position": -1,
        });
        info!(queue_item_id = %item.queue_item_id, state = %state, "Queue item finished");
        self.bus.publish(topics::QUEUE_ITEM_COMPLETED, payload).await;
        self.notify.notify_one();
    }

    /// Request cooperative cancellation of every running item
    pub async fn cancel_all_running(&self) {
        let projects = self.projects.lock().await;
        for project in projects.values() {
            for entry in project.running.values() {
                entry.token.cancel();
            }
        }
    }

    /// Wait until the queue may have runnable work
    pub async fn work_available(&self) {
        self.notify.notified().await;
    }

    /// Running + queued + paused across one project (test/metrics aid)
    pub async fn project_load(&self, project_id: &str) -> usize {
        let projects = self.projects.lock().await;
        projects.get(project_id).map(|p| p.size()).unwrap_or(0)
    }
}

fn find_queued<'a>(
    projects: &'a mut HashMap<String, ProjectQueue>,
    queue_item_id: &str,
) -> Result<(&'a mut ProjectQueue, usize), QueueError> {
    for project in projects.values_mut() {
        if let Some(index) = project.queued.iter().position(|i| i.queue_item_id == queue_item_id) {
            return Ok((project, index));
        }
    }
    Err(QueueError::ItemNotFound(queue_item_id.to_string()))
}

fn find_running_owned(projects: &mut HashMap<String, ProjectQueue>, queue_item_id: &str) -> Option<QueueItem> {
    for project in projects.values_mut() {
        if let Some(entry) = project.running.remove(queue_item_id) {
            return Some(entry.item);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::create_event_bus;
    use projectstore::{InMemoryQueueHistoryRepository, InMemoryTaskRepository, Task, TaskStatus};
    use tokio::sync::Mutex as AsyncMutex;

    struct Fixture {
        queue: Arc<TaskQueue>,
        tasks: Arc<InMemoryTaskRepository>,
        events: Arc<AsyncMutex<Vec<(String, Value)>>>,
    }

    async fn fixture(config: QueueConfig) -> Fixture {
        let bus = create_event_bus();
        let events = Arc::new(AsyncMutex::new(Vec::new()));
        for topic in [
            topics::QUEUE_ITEM_ADDED,
            topics::QUEUE_ITEM_UPDATED,
            topics::QUEUE_ITEM_COMPLETED,
        ] {
            let events = events.clone();
            bus.subscribe(topic, move |event| {
                let events = events.clone();
                async move {
                    events.lock().await.push((event.topic, event.payload));
                    Ok(())
                }
            })
            .await;
        }

        let tasks = Arc::new(InMemoryTaskRepository::new());
        let queue = Arc::new(TaskQueue::new(
            config,
            RetryPolicy::immediate(2),
            bus,
            tasks.clone(),
            Arc::new(InMemoryQueueHistoryRepository::default()),
        ));
        Fixture { queue, tasks, events }
    }

    fn request(project: &str, task_id: Option<String>, priority: Priority) -> EnqueueRequest {
        EnqueueRequest {
            project_id: project.to_string(),
            user_id: "alice".to_string(),
            task_id,
            task_mode: "execute".to_string(),
            workflow_id: None,
            priority,
            options: json!({}),
        }
    }

    async fn seed_task(f: &Fixture, project: &str) -> String {
        f.tasks
            .create(Task::new(project, "T", "", "feature"))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_enqueue_reports_position_and_event() {
        let f = fixture(QueueConfig::default()).await;
        let task_id = seed_task(&f, "proj").await;

        let submission = f
            .queue
            .enqueue(request("proj", Some(task_id), Priority::Normal))
            .await
            .unwrap();
        assert_eq!(submission.position, 1);

        let events = f.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, topics::QUEUE_ITEM_ADDED);
        assert_eq!(events[0].1["position"], 1);
    }

    #[tokio::test]
    async fn test_enqueue_unknown_task_rejected() {
        let f = fixture(QueueConfig::default()).await;
        let err = f
            .queue
            .enqueue(request("proj", Some("ghost".to_string()), Priority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::TaskNotFound(_)));
        // Validation failures emit no events
        assert!(f.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_completed_task_rejected() {
        let f = fixture(QueueConfig::default()).await;
        let task_id = seed_task(&f, "proj").await;
        f.tasks.update_status(&task_id, TaskStatus::Completed).await.unwrap();

        let err = f
            .queue
            .enqueue(request("proj", Some(task_id), Priority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::TaskAlreadyTerminal { .. }));
    }

    #[tokio::test]
    async fn test_create_workflow_skips_task_validation() {
        let f = fixture(QueueConfig::default()).await;
        let submission = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        assert_eq!(submission.position, 1);
    }

    #[tokio::test]
    async fn test_queue_full() {
        let f = fixture(QueueConfig {
            max_size: 2,
            ..Default::default()
        })
        .await;

        f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let err = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueFull { .. }));

        // Other projects are unaffected
        f.queue.enqueue(request("other", None, Priority::Normal)).await.unwrap();
    }

    #[tokio::test]
    async fn test_priority_jumps_ahead_but_fifo_within_band() {
        let f = fixture(QueueConfig::default()).await;

        let normal_1 = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let normal_2 = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let critical = f.queue.enqueue(request("proj", None, Priority::Critical)).await.unwrap();

        assert_eq!(normal_1.position, 1);
        assert_eq!(normal_2.position, 2);
        // Critical lands ahead of both normals
        assert_eq!(critical.position, 1);

        let status = f.queue.status("proj").await;
        let ids: Vec<&str> = status.queued.iter().map(|v| v.item.queue_item_id.as_str()).collect();
        assert_eq!(
            ids,
            [
                critical.queue_item_id.as_str(),
                normal_1.queue_item_id.as_str(),
                normal_2.queue_item_id.as_str()
            ]
        );
        assert_eq!(status.queued[0].position, 1);
        assert_eq!(status.queued[2].position, 3);
    }

    #[tokio::test]
    async fn test_take_next_marks_running_and_respects_cap() {
        let f = fixture(QueueConfig {
            max_concurrent_per_project: 1,
            ..Default::default()
        })
        .await;

        f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();

        let first = f.queue.take_next().await.unwrap();
        assert_eq!(first.item.state, QueueItemState::Running);
        assert_eq!(first.item.attempts, 1);

        // Cap of 1: second item stays queued
        assert!(f.queue.take_next().await.is_none());

        let status = f.queue.status("proj").await;
        assert_eq!(status.active.len(), 1);
        assert_eq!(status.active[0].position, 0);
        assert_eq!(status.queued.len(), 1);
    }

    #[tokio::test]
    async fn test_paused_item_skipped_but_keeps_position() {
        let f = fixture(QueueConfig::default()).await;

        let first = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let second = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();

        f.queue.pause(&first.queue_item_id).await.unwrap();

        // The paused head is skipped; the second item runs
        let dispatched = f.queue.take_next().await.unwrap();
        assert_eq!(dispatched.item.queue_item_id, second.queue_item_id);

        let status = f.queue.status("proj").await;
        assert_eq!(status.queued[0].item.queue_item_id, first.queue_item_id);
        assert_eq!(status.queued[0].item.state, QueueItemState::Paused);
        assert_eq!(status.queued[0].position, 1);

        // Resume makes it runnable again
        f.queue.resume(&first.queue_item_id).await.unwrap();
        let dispatched = f.queue.take_next().await.unwrap();
        assert_eq!(dispatched.item.queue_item_id, first.queue_item_id);
    }

    #[tokio::test]
    async fn test_pause_running_item_rejected() {
        let f = fixture(QueueConfig::default()).await;
        let submission = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        f.queue.take_next().await.unwrap();

        let err = f.queue.pause(&submission.queue_item_id).await.unwrap_err();
        assert!(matches!(err, QueueError::ItemNotFound(_) | QueueError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_cancel_queued_emits_completed() {
        let f = fixture(QueueConfig::default()).await;
        let submission = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();

        f.queue.cancel(&submission.queue_item_id).await.unwrap();

        let events = f.events.lock().await;
        let completed: Vec<_> = events.iter().filter(|(t, _)| t == topics::QUEUE_ITEM_COMPLETED).collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1["state"], "cancelled");
        assert_eq!(completed[0].1["position"], -1);

        let status = f.queue.status("proj").await;
        assert!(status.queued.is_empty());
        assert_eq!(status.history.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_running_sets_token() {
        let f = fixture(QueueConfig::default()).await;
        f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let dispatch = f.queue.take_next().await.unwrap();

        f.queue.cancel(&dispatch.item.queue_item_id).await.unwrap();
        assert!(dispatch.token.is_cancelled());

        // Terminal event arrives when the processor reports back
        f.queue.complete_item(&dispatch.item.queue_item_id, RunOutcome::Cancelled).await;
        let events = f.events.lock().await;
        let completed: Vec<_> = events.iter().filter(|(t, _)| t == topics::QUEUE_ITEM_COMPLETED).collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1["state"], "cancelled");
    }

    #[tokio::test]
    async fn test_retry_then_terminal_failure() {
        let f = fixture(QueueConfig::default()).await;
        f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();

        // First attempt fails with a retryable kind
        let dispatch = f.queue.take_next().await.unwrap();
        let id = dispatch.item.queue_item_id.clone();
        f.queue
            .complete_item(
                &id,
                RunOutcome::Failed {
                    kind: ErrorKind::Timeout,
                    reason: "timeout".to_string(),
                },
            )
            .await;

        // Requeue is spawned; give it a moment
        tokio::time::sleep(Duration::from_millis(50)).await;
        let dispatch = f.queue.take_next().await.expect("item requeued");
        assert_eq!(dispatch.item.queue_item_id, id);
        assert_eq!(dispatch.item.attempts, 2);

        // Second failure exhausts attempts
        f.queue
            .complete_item(
                &id,
                RunOutcome::Failed {
                    kind: ErrorKind::Timeout,
                    reason: "timeout".to_string(),
                },
            )
            .await;

        let events = f.events.lock().await;
        let completed: Vec<_> = events.iter().filter(|(t, _)| t == topics::QUEUE_ITEM_COMPLETED).collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1["state"], "failed");
        assert_eq!(completed[0].1["reason"], "timeout");
        assert_eq!(completed[0].1["attempts"], 2);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_terminal() {
        let f = fixture(QueueConfig::default()).await;
        f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let dispatch = f.queue.take_next().await.unwrap();

        f.queue
            .complete_item(
                &dispatch.item.queue_item_id,
                RunOutcome::Failed {
                    kind: ErrorKind::Validation,
                    reason: "bad options".to_string(),
                },
            )
            .await;

        let events = f.events.lock().await;
        let completed: Vec<_> = events.iter().filter(|(t, _)| t == topics::QUEUE_ITEM_COMPLETED).collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1["state"], "failed");
    }

    #[tokio::test]
    async fn test_reorder_within_band() {
        let f = fixture(QueueConfig::default()).await;
        let a = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let b = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let c = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();

        f.queue.reorder(&c.queue_item_id, 1).await.unwrap();

        let status = f.queue.status("proj").await;
        let ids: Vec<&str> = status.queued.iter().map(|v| v.item.queue_item_id.as_str()).collect();
        assert_eq!(ids, [c.queue_item_id.as_str(), a.queue_item_id.as_str(), b.queue_item_id.as_str()]);

        let err = f.queue.reorder(&a.queue_item_id, 9).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidPosition { .. }));
    }

    #[tokio::test]
    async fn test_bulk_cancel_reports_per_id() {
        let f = fixture(QueueConfig::default()).await;
        let a = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let b = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();

        let outcomes = f
            .queue
            .bulk(
                BulkOp::Cancel,
                &[a.queue_item_id.clone(), "ghost".to_string(), b.queue_item_id.clone()],
            )
            .await;

        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(QueueError::ItemNotFound(_))));
        assert!(outcomes[2].result.is_ok());

        let events = f.events.lock().await;
        let completed = events.iter().filter(|(t, _)| t == topics::QUEUE_ITEM_COMPLETED).count();
        assert_eq!(completed, 2);
    }

    #[tokio::test]
    async fn test_queue_integrity_invariant() {
        let config = QueueConfig {
            max_size: 5,
            max_concurrent_per_project: 2,
            ..Default::default()
        };
        let f = fixture(config.clone()).await;

        for _ in 0..5 {
            f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        }
        assert!(f.queue.enqueue(request("proj", None, Priority::Normal)).await.is_err());

        f.queue.take_next().await.unwrap();
        f.queue.take_next().await.unwrap();
        assert!(f.queue.take_next().await.is_none(), "concurrency cap respected");

        // running + queued stays within max_size
        assert!(f.queue.project_load("proj").await <= config.max_size);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn priority_from(raw: u8) -> Priority {
            match raw % 4 {
                0 => Priority::Low,
                1 => Priority::Normal,
                2 => Priority::High,
                _ => Priority::Critical,
            }
        }

        proptest! {
            // Whatever the admission order, the queued band stays
            // sorted by priority with FIFO inside each band
            #[test]
            fn prop_priority_bands_stay_ordered(raw in proptest::collection::vec(0u8..4, 1..32)) {
                let mut project = ProjectQueue::default();
                for raw_priority in raw {
                    let item = QueueItem::new(
                        "proj",
                        "alice",
                        None,
                        "execute",
                        priority_from(raw_priority),
                        serde_json::json!({}),
                        2,
                    );
                    project.insert_by_priority(item);
                }

                for pair in project.queued.windows(2) {
                    prop_assert!(pair[0].priority >= pair[1].priority);
                    if pair[0].priority == pair[1].priority {
                        prop_assert!(pair[0].enqueued_at <= pair[1].enqueued_at);
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_completed_run_updates_eta_average() {
        let f = fixture(QueueConfig::default()).await;
        f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let dispatch = f.queue.take_next().await.unwrap();
        f.queue.complete_item(&dispatch.item.queue_item_id, RunOutcome::Completed).await;

        // New enqueue derives its estimate from the observed average,
        // which is near-zero here, so the estimate is close to now
        let submission = f.queue.enqueue(request("proj", None, Priority::Normal)).await.unwrap();
        let wait = submission.estimated_start - Utc::now();
        assert!(wait < chrono::Duration::seconds(5));
    }
}
