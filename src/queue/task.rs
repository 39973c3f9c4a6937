//! Processing task state machine and status views.

use crate::config::Config;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Lifecycle states of a processing task.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal: once entered, no
/// further transition occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the priority queue.
    Queued,
    /// Being executed by a worker slot.
    Processing,
    /// Finished successfully; chunks persisted.
    Completed,
    /// Exhausted retries; permanently failed.
    Failed,
    /// Cancelled by explicit request.
    Cancelled,
}

impl TaskStatus {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Kind of background work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Extract, chunk, embed, and persist one document.
    ProcessDocument,
}

/// Per-enqueue overrides applied on top of the scheduler configuration.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Override the number of automatic retries.
    pub max_retries: Option<u32>,
    /// Override the delay before a failed task is re-queued.
    pub retry_delay: Option<Duration>,
    /// Override the chunk window size in characters.
    pub chunk_size: Option<usize>,
    /// Override the chunk overlap in characters.
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    retries: u32,
    progress: f64,
    started_at: Option<OffsetDateTime>,
    completed_at: Option<OffsetDateTime>,
    error_message: Option<String>,
}

/// One unit of background work: process one document.
///
/// Identity and configuration are immutable; the mutable lifecycle state sits
/// behind an internal lock so the scheduler, the running task body, and status
/// queries can all observe it. Only the scheduler's dispatch path performs
/// transitions.
#[derive(Debug)]
pub struct ProcessingTask {
    /// Unique task identifier generated at enqueue time.
    pub task_id: Uuid,
    /// Externally-owned document this task processes.
    pub document_id: Uuid,
    /// Discriminator for the kind of work.
    pub task_type: TaskType,
    /// Scheduling priority; lower values are served first.
    pub priority: i32,
    /// Number of automatic retries before permanent failure.
    pub max_retries: u32,
    /// Delay before a failed task re-enters the queue.
    pub retry_delay: Duration,
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Chunk overlap in characters.
    pub chunk_overlap: usize,
    /// Enqueue timestamp.
    pub created_at: OffsetDateTime,
    state: Mutex<TaskState>,
}

impl ProcessingTask {
    /// Create a task in the QUEUED state, resolving options against `config`.
    pub fn new(
        document_id: Uuid,
        priority: Option<i32>,
        config: &Config,
        options: EnqueueOptions,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            document_id,
            task_type: TaskType::ProcessDocument,
            priority: priority.unwrap_or(config.default_priority),
            max_retries: options.max_retries.unwrap_or(config.max_retries),
            retry_delay: options.retry_delay.unwrap_or_else(|| config.retry_delay()),
            chunk_size: options.chunk_size.unwrap_or(config.chunk_size),
            chunk_overlap: options.chunk_overlap.unwrap_or(config.chunk_overlap),
            created_at: OffsetDateTime::now_utc(),
            state: Mutex::new(TaskState {
                status: TaskStatus::Queued,
                retries: 0,
                progress: 0.0,
                started_at: None,
                completed_at: None,
                error_message: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TaskStatus {
        self.state().status
    }

    /// Retries consumed so far.
    pub fn retries(&self) -> u32 {
        self.state().retries
    }

    /// Current progress in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 {
        self.state().progress
    }

    /// Whether the task was cancelled. Task bodies poll this at checkpoints.
    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    /// Update progress; ignored once the task is terminal.
    pub fn set_progress(&self, value: f64) {
        let mut state = self.state();
        if !state.status.is_terminal() {
            state.progress = value.clamp(0.0, 1.0);
        }
    }

    /// QUEUED → PROCESSING. Stamps `started_at` on the first dispatch only.
    pub(crate) fn mark_processing(&self) -> bool {
        let mut state = self.state();
        if state.status != TaskStatus::Queued {
            return false;
        }
        state.status = TaskStatus::Processing;
        if state.started_at.is_none() {
            state.started_at = Some(OffsetDateTime::now_utc());
        }
        true
    }

    /// PROCESSING → QUEUED after a recoverable failure with retries left.
    pub(crate) fn mark_requeued(&self) -> bool {
        let mut state = self.state();
        if state.status != TaskStatus::Processing {
            return false;
        }
        state.status = TaskStatus::Queued;
        state.retries += 1;
        state.progress = 0.0;
        true
    }

    /// PROCESSING → COMPLETED.
    pub(crate) fn mark_completed(&self) -> bool {
        let mut state = self.state();
        if state.status != TaskStatus::Processing {
            return false;
        }
        state.status = TaskStatus::Completed;
        state.progress = 1.0;
        state.completed_at = Some(OffsetDateTime::now_utc());
        true
    }

    /// PROCESSING → FAILED once retries are exhausted.
    pub(crate) fn mark_failed(&self, error_message: impl Into<String>) -> bool {
        let mut state = self.state();
        if state.status != TaskStatus::Processing {
            return false;
        }
        state.status = TaskStatus::Failed;
        state.error_message = Some(error_message.into());
        state.completed_at = Some(OffsetDateTime::now_utc());
        true
    }

    /// QUEUED/PROCESSING → CANCELLED. Returns `false` when already terminal.
    pub(crate) fn mark_cancelled(&self) -> bool {
        let mut state = self.state();
        if state.status.is_terminal() {
            return false;
        }
        state.status = TaskStatus::Cancelled;
        state.completed_at = Some(OffsetDateTime::now_utc());
        true
    }

    /// Read-only snapshot for status queries.
    pub fn view(&self) -> TaskStatusView {
        let state = self.state();
        TaskStatusView {
            task_id: self.task_id,
            document_id: self.document_id,
            task_type: self.task_type,
            status: state.status,
            priority: self.priority,
            progress: state.progress,
            retries: state.retries,
            max_retries: self.max_retries,
            created_at: format_timestamp(self.created_at),
            started_at: state.started_at.map(format_timestamp),
            completed_at: state.completed_at.map(format_timestamp),
            error_message: state.error_message.clone(),
            chunk_count: None,
        }
    }
}

/// Derived, read-only snapshot of a task exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    /// Task identifier.
    pub task_id: Uuid,
    /// Document the task processes.
    pub document_id: Uuid,
    /// Kind of work.
    pub task_type: TaskType,
    /// Lifecycle state at snapshot time.
    pub status: TaskStatus,
    /// Scheduling priority.
    pub priority: i32,
    /// Progress in `[0.0, 1.0]`.
    pub progress: f64,
    /// Retries consumed.
    pub retries: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Enqueue timestamp, RFC 3339.
    pub created_at: String,
    /// First dispatch timestamp, RFC 3339.
    pub started_at: Option<String>,
    /// Terminal transition timestamp, RFC 3339.
    pub completed_at: Option<String>,
    /// Failure description, set only on FAILED.
    pub error_message: Option<String>,
    /// Chunks produced, known once the task completed.
    pub chunk_count: Option<usize>,
}

pub(crate) fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}
