//! Terminal task results with TTL-based eviction.

use super::task::{ProcessingTask, TaskStatusView};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Compact record of a task that reached a terminal state.
#[derive(Debug, Clone)]
pub(crate) struct TaskResult {
    view: TaskStatusView,
    recorded_at: Instant,
}

impl TaskResult {
    /// Capture the terminal snapshot of `task`, attaching the chunk count when known.
    pub(crate) fn from_task(task: &ProcessingTask, chunk_count: Option<usize>) -> Self {
        let mut view = task.view();
        view.chunk_count = chunk_count;
        Self {
            view,
            recorded_at: Instant::now(),
        }
    }
}

/// Map of terminal results keyed by task id.
///
/// Owned exclusively by the scheduler: the dispatch path inserts, callers only
/// read through status queries, and the TTL sweep bounds memory.
#[derive(Debug, Default)]
pub(crate) struct ResultStore {
    entries: HashMap<Uuid, TaskResult>,
}

impl ResultStore {
    pub(crate) fn insert(&mut self, task_id: Uuid, result: TaskResult) {
        self.entries.insert(task_id, result);
    }

    pub(crate) fn get(&self, task_id: Uuid) -> Option<TaskStatusView> {
        self.entries.get(&task_id).map(|result| result.view.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Evict results older than `max_age`; returns how many were removed.
    pub(crate) fn sweep(&mut self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, result| result.recorded_at.elapsed() <= max_age);
        before - self.entries.len()
    }
}
