//! Priority queue and bounded dispatch loop driving task execution.
//!
//! One scheduler owns the priority queue, the active-task map, and the result
//! store; nothing else mutates them. The dispatch loop pops the
//! lowest-priority-value task, waits for one of `max_concurrent_tasks` worker
//! slots, and spawns the task body without waiting for it to finish. Retries,
//! cancellation, and result retention are all handled here.

use super::results::{ResultStore, TaskResult};
use super::task::{EnqueueOptions, ProcessingTask, TaskStatus, TaskStatusView};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::extract::TextExtractor;
use crate::metrics::{MetricsSnapshot, QueueMetrics};
use crate::processing::pipeline::{PipelineDeps, execute_task};
use crate::processing::tokens::token_counter;
use crate::store::{ChunkSink, DocumentStore, DocumentUpdate};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use uuid::Uuid;

/// How often the dispatch loop sweeps expired results.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Back-off applied when the dispatch loop hits an unexpected error.
const DISPATCH_BACKOFF: Duration = Duration::from_millis(500);

/// Queue health snapshot exposed to callers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStatus {
    /// Tasks waiting in the queue.
    pub queue_size: usize,
    /// Tasks currently executing.
    pub active_tasks: usize,
    /// Concurrency limit.
    pub max_concurrent_tasks: usize,
    /// Terminal results currently retained.
    pub completed_tasks: usize,
    /// Whether the dispatch loop is running.
    pub worker_running: bool,
    /// Activity counters accumulated since construction.
    pub metrics: MetricsSnapshot,
}

/// Heap entry ordering tasks by ascending priority, FIFO within a priority.
#[derive(Debug, Clone, Copy, Eq)]
struct QueueEntry {
    priority: i32,
    seq: u64,
    task_id: Uuid,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the lowest (priority, seq) pops first.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    config: Config,
    deps: PipelineDeps,
    queue: Mutex<BinaryHeap<QueueEntry>>,
    tasks: Mutex<HashMap<Uuid, Arc<ProcessingTask>>>,
    results: Mutex<ResultStore>,
    slots: Arc<Semaphore>,
    wakeup: Notify,
    shutdown: watch::Sender<bool>,
    seq: AtomicU64,
    worker_running: AtomicBool,
    metrics: QueueMetrics,
}

/// Background task scheduler.
///
/// Constructed explicitly with its configuration and collaborators; callers
/// share it through an `Arc`, call [`Scheduler::start`] once near process
/// start, and [`Scheduler::stop`] during teardown.
pub struct Scheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Build a scheduler from configuration and collaborator handles.
    pub fn new(
        config: Config,
        document_store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        chunk_sink: Arc<dyn ChunkSink>,
    ) -> Self {
        let deps = PipelineDeps {
            document_store,
            extractor,
            embedder,
            chunk_sink,
            token_counter: token_counter(&config.embedding_model),
        };
        let (shutdown, _) = watch::channel(false);
        let slots = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Self {
            inner: Arc::new(Inner {
                config,
                deps,
                queue: Mutex::new(BinaryHeap::new()),
                tasks: Mutex::new(HashMap::new()),
                results: Mutex::new(ResultStore::default()),
                slots,
                wakeup: Notify::new(),
                shutdown,
                seq: AtomicU64::new(0),
                worker_running: AtomicBool::new(false),
                metrics: QueueMetrics::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the dispatch loop. Idempotent while already running.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }
        self.inner.shutdown.send_replace(false);
        self.inner
            .worker_running
            .store(true, AtomicOrdering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let shutdown_rx = self.inner.shutdown.subscribe();
        *worker = Some(tokio::spawn(dispatch_loop(inner, shutdown_rx)));
        tracing::info!(
            max_concurrent_tasks = self.inner.config.max_concurrent_tasks,
            "Task queue worker started"
        );
    }

    /// Stop the dispatch loop, cancelling all still-active tasks and waiting
    /// up to `drain_timeout` for in-flight task bodies to finish.
    pub async fn stop(&self, drain_timeout: Duration) {
        let Some(handle) = self.worker.lock().await.take() else {
            return;
        };
        self.inner.shutdown.send_replace(true);
        self.inner.wakeup.notify_waiters();

        let active: Vec<Uuid> = self.inner.tasks.lock().await.keys().copied().collect();
        for task_id in active {
            cancel_task_inner(&self.inner, task_id).await;
        }

        // A graceful drain holds every worker slot once in-flight bodies return them.
        let permits = self.inner.config.max_concurrent_tasks as u32;
        match timeout(drain_timeout, self.inner.slots.acquire_many(permits)).await {
            Ok(Ok(all_slots)) => drop(all_slots),
            Ok(Err(_)) => {}
            Err(_) => {
                tracing::warn!("Drain timeout elapsed; abandoning in-flight tasks");
            }
        }

        let abort = handle.abort_handle();
        if timeout(Duration::from_secs(1), handle).await.is_err() {
            abort.abort();
        }
        self.inner
            .worker_running
            .store(false, AtomicOrdering::SeqCst);
        tracing::info!("Task queue worker stopped");
    }

    /// Queue a document for background processing; always succeeds.
    ///
    /// `priority` defaults to the configured default (lower is served first);
    /// `options` override retry and chunking knobs for this task only.
    pub async fn enqueue_document(
        &self,
        document_id: Uuid,
        priority: Option<i32>,
        options: EnqueueOptions,
    ) -> Uuid {
        let task = Arc::new(ProcessingTask::new(
            document_id,
            priority,
            &self.inner.config,
            options,
        ));
        let task_id = task.task_id;
        let entry = QueueEntry {
            priority: task.priority,
            seq: self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed),
            task_id,
        };
        self.inner.tasks.lock().await.insert(task_id, task);
        self.inner.queue.lock().await.push(entry);
        self.inner.wakeup.notify_one();
        tracing::info!(
            task_id = %task_id,
            document_id = %document_id,
            priority = entry.priority,
            "Task enqueued"
        );
        task_id
    }

    /// Status of a live or recently finished task; `None` once its result expired.
    pub async fn get_task_status(&self, task_id: Uuid) -> Option<TaskStatusView> {
        if let Some(task) = self.inner.tasks.lock().await.get(&task_id) {
            return Some(task.view());
        }
        self.inner.results.lock().await.get(task_id)
    }

    /// Cancel a queued or running task.
    ///
    /// Cooperative: an in-flight embedding call is not interrupted, but no
    /// further work happens after the next checkpoint and no retry is
    /// scheduled. Returns `false` for unknown or already-terminal tasks.
    pub async fn cancel_task(&self, task_id: Uuid) -> bool {
        cancel_task_inner(&self.inner, task_id).await
    }

    /// Current queue counters.
    pub async fn queue_status(&self) -> QueueStatus {
        let (queued, processing) = {
            let tasks = self.inner.tasks.lock().await;
            tasks.values().fold((0, 0), |(queued, processing), task| {
                match task.status() {
                    TaskStatus::Queued => (queued + 1, processing),
                    TaskStatus::Processing => (queued, processing + 1),
                    _ => (queued, processing),
                }
            })
        };
        QueueStatus {
            queue_size: queued,
            active_tasks: processing,
            max_concurrent_tasks: self.inner.config.max_concurrent_tasks,
            completed_tasks: self.inner.results.lock().await.len(),
            worker_running: self.inner.worker_running.load(AtomicOrdering::SeqCst),
            metrics: self.inner.metrics.snapshot(),
        }
    }

    /// Evict terminal results older than `max_age`; returns how many were removed.
    pub async fn cleanup_completed_tasks(&self, max_age: Duration) -> usize {
        let evicted = self.inner.results.lock().await.sweep(max_age);
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted expired task results");
        }
        evicted
    }

    /// Snapshot of queue activity counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

async fn cancel_task_inner(inner: &Inner, task_id: Uuid) -> bool {
    let task = inner.tasks.lock().await.get(&task_id).cloned();
    let Some(task) = task else {
        return false;
    };
    if !task.mark_cancelled() {
        return false;
    }
    inner.tasks.lock().await.remove(&task_id);
    inner
        .results
        .lock()
        .await
        .insert(task_id, TaskResult::from_task(&task, None));
    inner.metrics.record_cancelled();
    tracing::info!(task_id = %task_id, "Task cancelled");
    true
}

async fn dispatch_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    tracing::debug!("Dispatch loop running");
    let mut last_sweep = Instant::now();
    loop {
        if *shutdown.borrow() {
            break;
        }
        if last_sweep.elapsed() >= SWEEP_INTERVAL {
            let evicted = inner
                .results
                .lock()
                .await
                .sweep(inner.config.result_retention());
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted expired task results");
            }
            last_sweep = Instant::now();
        }

        let entry = inner.queue.lock().await.pop();
        let Some(entry) = entry else {
            // Poll with a short timeout so shutdown and new work are both
            // observed promptly.
            tokio::select! {
                _ = inner.wakeup.notified() => {}
                _ = sleep(inner.config.poll_interval()) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        };

        let task = inner.tasks.lock().await.get(&entry.task_id).cloned();
        let Some(task) = task else {
            // Stale entry for a task cancelled while queued.
            continue;
        };
        if task.status() != TaskStatus::Queued {
            continue;
        }

        let permit = tokio::select! {
            permit = Arc::clone(&inner.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(error) => {
                    tracing::error!(error = %error, "Dispatch loop failed to acquire a worker slot; backing off");
                    inner.queue.lock().await.push(entry);
                    sleep(DISPATCH_BACKOFF).await;
                    continue;
                }
            },
            _ = shutdown.changed() => {
                inner.queue.lock().await.push(entry);
                continue;
            }
        };

        if !task.mark_processing() {
            // Cancelled while waiting for a slot.
            drop(permit);
            continue;
        }
        tracing::debug!(task_id = %task.task_id, priority = task.priority, "Task dispatched");
        let inner_for_task = Arc::clone(&inner);
        tokio::spawn(async move {
            run_task(inner_for_task, task).await;
            drop(permit);
        });
    }
    tracing::debug!("Dispatch loop exited");
}

/// Drive one task body and convert its outcome into a state transition.
///
/// Errors never escape to the dispatch loop; they become retries or a
/// permanent FAILED state here.
async fn run_task(inner: Arc<Inner>, task: Arc<ProcessingTask>) {
    let task_id = task.task_id;
    match execute_task(&inner.deps, &task).await {
        Ok(chunk_count) => {
            if !task.mark_completed() {
                // Cancelled at the finish line; the cancel path already recorded a result.
                return;
            }
            inner.tasks.lock().await.remove(&task_id);
            inner
                .results
                .lock()
                .await
                .insert(task_id, TaskResult::from_task(&task, Some(chunk_count)));
            inner.metrics.record_completed(chunk_count as u64);
            tracing::info!(
                task_id = %task_id,
                document_id = %task.document_id,
                chunks = chunk_count,
                "Task completed"
            );
        }
        Err(error) if error.is_cancelled() => {
            tracing::debug!(task_id = %task_id, "Task observed cancellation and stopped");
        }
        Err(error) => {
            if task.retries() < task.max_retries {
                if task.mark_requeued() {
                    inner.metrics.record_retry();
                    tracing::warn!(
                        task_id = %task_id,
                        error = %error,
                        retries = task.retries(),
                        max_retries = task.max_retries,
                        "Task failed; retry scheduled"
                    );
                    let inner_for_retry = Arc::clone(&inner);
                    let delay = task.retry_delay;
                    tokio::spawn(async move {
                        sleep(delay).await;
                        requeue(inner_for_retry, task_id).await;
                    });
                }
            } else if task.mark_failed(error.to_string()) {
                inner.tasks.lock().await.remove(&task_id);
                inner
                    .results
                    .lock()
                    .await
                    .insert(task_id, TaskResult::from_task(&task, None));
                inner.metrics.record_failed();
                tracing::error!(
                    task_id = %task_id,
                    document_id = %task.document_id,
                    error = %error,
                    "Task failed permanently"
                );
                let update = DocumentUpdate::failed(error.to_string());
                if let Err(store_error) = inner
                    .deps
                    .document_store
                    .update_document(task.document_id, update)
                    .await
                {
                    tracing::warn!(
                        document_id = %task.document_id,
                        error = %store_error,
                        "Failed to record document failure"
                    );
                }
            }
        }
    }
}

/// Re-insert a retried task once its delay elapsed.
async fn requeue(inner: Arc<Inner>, task_id: Uuid) {
    let task = inner.tasks.lock().await.get(&task_id).cloned();
    let Some(task) = task else {
        // Cancelled during the retry delay.
        return;
    };
    if task.status() != TaskStatus::Queued {
        return;
    }
    let entry = QueueEntry {
        priority: task.priority,
        seq: inner.seq.fetch_add(1, AtomicOrdering::Relaxed),
        task_id,
    };
    inner.queue.lock().await.push(entry);
    inner.wakeup.notify_one();
    tracing::debug!(task_id = %task_id, retries = task.retries(), "Task re-queued after retry delay");
}
