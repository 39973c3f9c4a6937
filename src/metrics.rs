use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing queue activity.
#[derive(Default)]
pub struct QueueMetrics {
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_retried: AtomicU64,
    tasks_cancelled: AtomicU64,
    chunks_embedded: AtomicU64,
}

impl QueueMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed task and the number of chunks embedded for it.
    pub fn record_completed(&self, chunk_count: u64) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.chunks_embedded.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a task that exhausted its retries and failed permanently.
    pub fn record_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one retry of a recoverable task failure.
    pub fn record_retry(&self) {
        self.tasks_retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an explicit cancellation.
    pub fn record_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_retried: self.tasks_retried.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            chunks_embedded: self.chunks_embedded.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of queue counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Tasks that reached the COMPLETED state since startup.
    pub tasks_completed: u64,
    /// Tasks that exhausted their retries and failed permanently.
    pub tasks_failed: u64,
    /// Individual retry attempts scheduled across all tasks.
    pub tasks_retried: u64,
    /// Tasks cancelled by explicit request.
    pub tasks_cancelled: u64,
    /// Total chunk count embedded across all completed tasks.
    pub chunks_embedded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_completions_and_chunks() {
        let metrics = QueueMetrics::new();
        metrics.record_completed(2);
        metrics.record_completed(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_completed, 2);
        assert_eq!(snapshot.chunks_embedded, 5);
    }

    #[test]
    fn failure_counters_are_independent() {
        let metrics = QueueMetrics::new();
        metrics.record_retry();
        metrics.record_retry();
        metrics.record_failed();
        metrics.record_cancelled();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_retried, 2);
        assert_eq!(snapshot.tasks_failed, 1);
        assert_eq!(snapshot.tasks_cancelled, 1);
        assert_eq!(snapshot.tasks_completed, 0);
    }
}
