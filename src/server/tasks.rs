// Task manager — background generation runs behind an admission semaphore
//
// Every submission gets a task entry immediately and a tokio task that waits
// for a permit. At most `max_concurrent` runs execute at once; the rest queue
// on the semaphore. Nothing is ever rejected for capacity. Finished entries
// are evicted once they outlive the retention window.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::constants::DEFAULT_FINISHED_TASK_TTL_SECS;
use crate::error::PipelineError;
use crate::pipeline::{GenerationOutput, GenerationRequest, Pipeline, ProgressEvent, RunHooks};

use super::types::{image_url, TaskResult, TaskStatus, TaskView};

struct TaskEntry {
    status: TaskStatus,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    progress: Option<ProgressEvent>,
    result: Option<TaskResult>,
    error: Option<String>,
    image_path: Option<PathBuf>,
    cancel: CancellationToken,
}

impl TaskEntry {
    fn view(&self, task_id: &str) -> TaskView {
        TaskView {
            task_id: task_id.to_string(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            progress: self.progress.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Where a task's image stands.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageLookup {
    UnknownTask,
    NotCompleted(TaskStatus),
    Ready(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    UnknownTask,
    AlreadyFinished(TaskStatus),
    Requested,
}

pub struct TaskManager {
    pipeline: Arc<Pipeline>,
    tasks: Arc<DashMap<String, TaskEntry>>,
    permits: Arc<Semaphore>,
    retention: Duration,
}

impl TaskManager {
    pub fn new(pipeline: Arc<Pipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            tasks: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            retention: Duration::from_secs(DEFAULT_FINISHED_TASK_TTL_SECS),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Register a task and schedule it. Returns the 12-hex-char task id.
    pub fn submit(&self, request: GenerationRequest) -> String {
        self.prune_finished();
        let task_id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let cancel = CancellationToken::new();
        self.tasks.insert(
            task_id.clone(),
            TaskEntry {
                status: TaskStatus::Pending,
                created_at: Utc::now(),
                completed_at: None,
                progress: None,
                result: None,
                error: None,
                image_path: None,
                cancel: cancel.clone(),
            },
        );
        tracing::info!(task_id = %task_id, kind = %request.diagram_kind, "Task submitted");

        let tasks = Arc::clone(&self.tasks);
        let permits = Arc::clone(&self.permits);
        let pipeline = Arc::clone(&self.pipeline);
        let id = task_id.clone();
        let handle = tokio::spawn(async move {
            execute(id, request, pipeline, tasks, permits, cancel).await;
        });

        // Propagate task panics to the log so they aren't silently lost.
        let tasks = Arc::clone(&self.tasks);
        let id = task_id.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                tracing::error!(task_id = %id, "Task panicked: {:?}", e);
                if let Some(mut entry) = tasks.get_mut(&id) {
                    entry.status = TaskStatus::Failed;
                    entry.error = Some("internal error".to_string());
                    entry.completed_at = Some(Utc::now());
                }
            }
        });

        task_id
    }

    pub fn get(&self, task_id: &str) -> Option<TaskView> {
        self.tasks.get(task_id).map(|entry| entry.view(task_id))
    }

    pub fn image(&self, task_id: &str) -> ImageLookup {
        let Some(entry) = self.tasks.get(task_id) else {
            return ImageLookup::UnknownTask;
        };
        match (&entry.status, &entry.image_path) {
            (TaskStatus::Completed, Some(path)) => ImageLookup::Ready(path.clone()),
            (status, _) => ImageLookup::NotCompleted(*status),
        }
    }

    /// Request cancellation. The run stops at its next await point.
    pub fn cancel(&self, task_id: &str) -> CancelOutcome {
        let Some(entry) = self.tasks.get(task_id) else {
            return CancelOutcome::UnknownTask;
        };
        if entry.status.is_finished() {
            return CancelOutcome::AlreadyFinished(entry.status);
        }
        entry.cancel.cancel();
        tracing::info!(task_id = %task_id, "Cancellation requested");
        CancelOutcome::Requested
    }

    /// Drop finished tasks older than the retention window. Returns how many
    /// were removed.
    pub fn prune_finished(&self) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };
        let before = self.tasks.len();
        self.tasks.retain(|_, entry| {
            !entry.status.is_finished() || entry.completed_at.map_or(true, |at| at > cutoff)
        });
        let removed = before.saturating_sub(self.tasks.len());
        if removed > 0 {
            tracing::debug!(removed, "Evicted finished tasks");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

async fn execute(
    task_id: String,
    request: GenerationRequest,
    pipeline: Arc<Pipeline>,
    tasks: Arc<DashMap<String, TaskEntry>>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    let permit = tokio::select! {
        _ = cancel.cancelled() => {
            finish(&tasks, &task_id, Err(PipelineError::Cancelled));
            return;
        }
        permit = permits.acquire_owned() => permit,
    };
    let Ok(_permit) = permit else {
        finish(
            &tasks,
            &task_id,
            Err(PipelineError::InvalidRequest("task queue closed".to_string())),
        );
        return;
    };

    if let Some(mut entry) = tasks.get_mut(&task_id) {
        entry.status = TaskStatus::Running;
    }
    tracing::info!(task_id = %task_id, "Task started");

    let observer_tasks = Arc::clone(&tasks);
    let observer_id = task_id.clone();
    let hooks = RunHooks::new()
        .with_cancel(cancel)
        .with_observer(Arc::new(move |event: &ProgressEvent| {
            if let Some(mut entry) = observer_tasks.get_mut(&observer_id) {
                entry.progress = Some(event.clone());
            }
        }));

    let result = pipeline.run(&request, &hooks).await;
    finish(&tasks, &task_id, result);
}

fn finish(
    tasks: &DashMap<String, TaskEntry>,
    task_id: &str,
    result: Result<GenerationOutput, PipelineError>,
) {
    let Some(mut entry) = tasks.get_mut(task_id) else {
        return;
    };
    entry.completed_at = Some(Utc::now());
    match result {
        Ok(output) => {
            tracing::info!(task_id = %task_id, run_id = %output.metadata.run_id, "Task completed");
            entry.status = TaskStatus::Completed;
            entry.progress = None;
            entry.image_path = Some(output.image_path.clone());
            entry.result = Some(TaskResult {
                image_url: image_url(task_id),
                run_id: output.metadata.run_id.clone(),
                description: output.description.clone(),
                total_iterations: output.iterations.len(),
                metadata: serde_json::to_value(&output.metadata).unwrap_or_default(),
            });
        }
        Err(e) if e.is_cancelled() => {
            tracing::info!(task_id = %task_id, "Task cancelled");
            entry.status = TaskStatus::Cancelled;
            entry.error = Some(e.to_string());
        }
        Err(e) => {
            tracing::error!(task_id = %task_id, error = %e, "Task failed");
            entry.status = TaskStatus::Failed;
            entry.error = Some(e.to_string());
        }
    }
}
