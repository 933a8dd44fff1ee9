//! Job queue
//!
//! Single-consumer queue owning the in-memory job registry. Jobs execute in
//! the order they became Pending; jobs with a future `scheduled_at` and jobs
//! waiting out a retry backoff sit in a due-time heap until promoted. All
//! mutation goes through the queue, and every transition is written to the
//! durable store.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mediaflow_core::domain::job::{Job, JobKind, JobStatus};
use mediaflow_core::domain::progress::ProgressUpdate;

use crate::config::EngineConfig;
use crate::notify::ProgressSink;
use crate::queue::handler::{HandlerContext, HandlerRegistry};
use crate::queue::retry::backoff_delay;
use crate::store::{JobStore, StoreError};

pub mod handler;
pub mod retry;

/// Options accepted by [`JobQueue::enqueue`]
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Earliest instant the job may run. Unset or past means immediately.
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Retry budget override; the engine default applies when unset.
    pub max_retries: Option<u32>,
}

/// Partial update applied through [`JobQueue::update_status`]
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Default)]
struct QueueState {
    /// Every job the queue currently tracks, keyed by id.
    jobs: HashMap<Uuid, Job>,
    /// Ids ready to execute, in the order they became Pending.
    ready: VecDeque<Uuid>,
    /// Min-heap of (due time, id) for Scheduled and Retrying jobs.
    waiting: BinaryHeap<Reverse<(chrono::DateTime<chrono::Utc>, Uuid)>>,
}

/// Persistent job queue with a single worker
pub struct JobQueue {
    state: Mutex<QueueState>,
    store: Arc<dyn JobStore>,
    sink: Arc<dyn ProgressSink>,
    worker_tick: Duration,
    cleanup_interval: Duration,
    retention: chrono::Duration,
    default_max_retries: u32,
    /// Wakes the worker when new work arrives.
    wake: Notify,
    shutdown_tx: watch::Sender<bool>,
}

impl JobQueue {
    /// Creates a queue backed by the given store and progress sink
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn JobStore>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(QueueState::default()),
            store,
            sink,
            worker_tick: config.worker_tick,
            cleanup_interval: config.cleanup_interval,
            retention: chrono::Duration::from_std(config.retention_window)
                .unwrap_or_else(|_| chrono::Duration::days(7)),
            default_max_retries: config.default_max_retries,
            wake: Notify::new(),
            shutdown_tx,
        }
    }

    // =============================================================================
    // Public Operations
    // =============================================================================

    /// Creates a job, persists it and makes it visible to the worker
    ///
    /// Jobs with a future `scheduled_at` start out Scheduled and are promoted
    /// to Pending when their time arrives; everything else is ready
    /// immediately.
    ///
    /// # Returns
    /// The id of the created job
    pub async fn enqueue(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        opts: EnqueueOptions,
    ) -> Result<Uuid, StoreError> {
        let mut job = Job::new(kind, payload);
        job.max_retries = opts.max_retries.unwrap_or(self.default_max_retries);

        let now = Utc::now();
        let due = opts.scheduled_at.filter(|at| *at > now);
        job.scheduled_at = opts.scheduled_at;
        if due.is_some() {
            job.status = JobStatus::Scheduled;
        }

        self.store.insert(&job).await?;

        let id = job.id;
        {
            let mut state = self.state.lock().await;
            match due {
                Some(at) => state.waiting.push(Reverse((at, id))),
                None => state.ready.push_back(id),
            }
            state.jobs.insert(id, job);
        }
        self.wake.notify_one();

        debug!("Enqueued job {} ({})", id, kind);
        Ok(id)
    }

    /// Point lookup of a job's current state
    ///
    /// Returns None for ids the queue does not track, including terminal
    /// jobs already evicted by the cleanup sweep.
    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.state.lock().await.jobs.get(&id).cloned()
    }

    /// Applies a partial update to a job
    ///
    /// Best-effort by design: updates race with completion, so unknown ids
    /// and updates to already-terminal jobs are logged and dropped rather
    /// than treated as errors. Progress only moves forward within a run.
    pub async fn update_status(&self, id: Uuid, patch: StatusPatch) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(&id) else {
                warn!("Status update for unknown job {}", id);
                return;
            };
            if job.status.is_terminal() {
                debug!("Dropping status update for terminal job {}", id);
                return;
            }

            if let Some(status) = patch.status {
                job.status = status;
            }
            if let Some(progress) = patch.progress {
                let progress = progress.min(100);
                if progress > job.progress {
                    job.progress = progress;
                }
            }
            if let Some(result) = patch.result {
                job.result = Some(result);
            }
            if let Some(error) = patch.error {
                job.error = Some(error);
            }
            job.updated_at = Utc::now();
            job.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Reloads unfinished jobs from the store after a restart
    ///
    /// Jobs caught Running are failed: their attempt died with the process
    /// and cannot be resumed. Pending, Scheduled and Retrying jobs are
    /// re-admitted where they left off.
    ///
    /// # Returns
    /// The number of jobs reloaded
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let unfinished = self.store.fetch_unfinished().await?;
        if unfinished.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let count = unfinished.len();
        let mut interrupted: Vec<Job> = Vec::new();

        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            for mut job in unfinished {
                let id = job.id;
                match job.status {
                    JobStatus::Running => {
                        job.status = JobStatus::Failed;
                        job.error = Some("process restarted during execution".to_string());
                        job.updated_at = now;
                        interrupted.push(job.clone());
                    }
                    JobStatus::Scheduled => {
                        let due = job.scheduled_at.unwrap_or(now);
                        state.waiting.push(Reverse((due, id)));
                    }
                    JobStatus::Retrying => {
                        let backoff =
                            chrono::Duration::seconds(backoff_delay(job.retry_count).as_secs() as i64);
                        let due = job.last_retry_at.map(|at| at + backoff).unwrap_or(now);
                        state.waiting.push(Reverse((due, id)));
                    }
                    JobStatus::Pending => state.ready.push_back(id),
                    JobStatus::Completed | JobStatus::Failed => {}
                }
                state.jobs.insert(id, job);
            }
        }

        for job in &interrupted {
            self.persist(job).await;
            error!("Job {} failed: process restarted during execution", job.id);
            self.sink.publish(ProgressUpdate {
                job_id: job.id,
                progress: job.progress,
                message: "process restarted during execution".to_string(),
                stage: None,
            });
        }

        self.wake.notify_one();
        Ok(count)
    }

    /// Evicts terminal jobs older than the retention window from the
    /// in-memory registry
    ///
    /// Durable records are kept for audit; only the registry shrinks.
    /// Idempotent, safe to run at any time.
    ///
    /// # Returns
    /// The number of jobs evicted
    pub async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, job| !(job.status.is_terminal() && job.updated_at < cutoff));
        before - state.jobs.len()
    }

    /// Signals the worker and cleanup loops to stop
    ///
    /// An in-flight job attempt finishes before the worker exits.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    // =============================================================================
    // Worker Loop
    // =============================================================================

    /// Runs the single-consumer worker loop until shutdown
    pub async fn run_worker(self: Arc<Self>, registry: Arc<HandlerRegistry>) {
        info!("Worker loop started ({} handlers)", registry.len());
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.next_ready().await {
                Some(id) => Self::execute(&self, id, &registry).await,
                None => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = time::sleep(self.worker_tick) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!("Worker loop stopped");
    }

    /// Runs the periodic cleanup sweep until shutdown
    pub async fn run_cleanup(self: Arc<Self>) {
        info!(
            "Cleanup sweep started (interval: {:?}, retention: {:?})",
            self.cleanup_interval, self.retention
        );
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = time::interval(self.cleanup_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }

            let evicted = self.cleanup().await;
            if evicted > 0 {
                info!("Cleanup evicted {} terminal job(s) from the registry", evicted);
            }
        }

        info!("Cleanup sweep stopped");
    }

    // =============================================================================
    // Internal Transitions
    // =============================================================================

    /// Promotes due waiting jobs and pops the next ready id
    async fn next_ready(&self) -> Option<Uuid> {
        let now = Utc::now();
        let mut promoted: Vec<Job> = Vec::new();

        let next = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            while let Some(Reverse((due, id))) = state.waiting.peek().copied() {
                if due > now {
                    break;
                }
                state.waiting.pop();

                let Some(job) = state.jobs.get_mut(&id) else {
                    continue;
                };
                if !matches!(job.status, JobStatus::Scheduled | JobStatus::Retrying) {
                    // moved on while waiting, e.g. via an external update
                    continue;
                }

                // a promoted retry starts a fresh run
                job.status = JobStatus::Pending;
                job.progress = 0;
                job.error = None;
                job.updated_at = Utc::now();
                promoted.push(job.clone());
                state.ready.push_back(id);
            }

            state.ready.pop_front()
        };

        for job in &promoted {
            self.persist(job).await;
        }

        next
    }

    /// Executes a single attempt of a ready job
    ///
    /// The handler runs in its own task so a panic is contained and fed to
    /// the retry policy like any other failure.
    async fn execute(queue: &Arc<JobQueue>, id: Uuid, registry: &Arc<HandlerRegistry>) {
        let Some(job) = queue.mark_running(id).await else {
            return;
        };

        let Some(handler) = registry.get(job.kind) else {
            let message = format!("no handler registered for job kind {}", job.kind);
            warn!("Job {} cannot run: {}", id, message);
            queue.fail_terminal(id, message).await;
            return;
        };

        info!(
            "Job {} started ({}, attempt {}/{})",
            id,
            job.kind,
            job.retry_count + 1,
            job.max_retries + 1
        );

        let ctx = HandlerContext::new(id, Arc::clone(queue), Arc::clone(&queue.sink));
        let handle = tokio::spawn(async move { handler.run(&job, &ctx).await });

        match handle.await {
            Ok(Ok(result)) => queue.complete(id, result).await,
            Ok(Err(err)) => queue.handle_attempt_failure(id, format!("{err:#}")).await,
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    let panic = join_err.into_panic();
                    if let Some(s) = panic.downcast_ref::<&str>() {
                        format!("handler panicked: {}", s)
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        format!("handler panicked: {}", s)
                    } else {
                        "handler panicked".to_string()
                    }
                } else {
                    format!("handler task aborted: {}", join_err)
                };
                error!("Job {} attempt crashed: {}", id, message);
                queue.handle_attempt_failure(id, message).await;
            }
        }
    }

    /// Moves a Pending job to Running and returns a snapshot of it
    async fn mark_running(&self, id: Uuid) -> Option<Job> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let job = match state.jobs.get_mut(&id) {
                Some(job) => job,
                None => {
                    warn!("Ready job {} is no longer tracked", id);
                    return None;
                }
            };
            if job.status != JobStatus::Pending {
                debug!("Skipping job {} in state {}", id, job.status);
                return None;
            }
            job.status = JobStatus::Running;
            job.updated_at = Utc::now();
            job.clone()
        };
        self.persist(&snapshot).await;
        Some(snapshot)
    }

    /// Finishes a job successfully
    async fn complete(&self, id: Uuid, result: serde_json::Value) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(&id) else {
                warn!("Completed job {} is no longer tracked", id);
                return;
            };
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.result = Some(result);
            job.error = None;
            job.updated_at = Utc::now();
            job.clone()
        };
        self.persist(&snapshot).await;

        info!("Job {} completed", id);
        self.sink.publish(ProgressUpdate {
            job_id: id,
            progress: 100,
            message: "completed".to_string(),
            stage: None,
        });
    }

    /// Fails a job with no further retries
    async fn fail_terminal(&self, id: Uuid, message: String) {
        let snapshot = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(&id) else {
                warn!("Failed job {} is no longer tracked", id);
                return;
            };
            job.status = JobStatus::Failed;
            job.error = Some(message.clone());
            job.updated_at = Utc::now();
            job.clone()
        };
        self.persist(&snapshot).await;

        error!("Job {} failed: {}", id, message);
        // a terminal failure is notified exactly once
        self.sink.publish(ProgressUpdate {
            job_id: id,
            progress: snapshot.progress,
            message,
            stage: None,
        });
    }

    /// Applies the retry policy after a failed attempt
    ///
    /// A job still holding retry budget waits out `min(2^retry_count, 60)`
    /// seconds in the due-time heap as Retrying, then re-runs from scratch.
    /// A job out of budget fails terminally.
    async fn handle_attempt_failure(&self, id: Uuid, message: String) {
        let retry = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(job) = state.jobs.get_mut(&id) else {
                warn!("Failed job {} is no longer tracked", id);
                return;
            };

            if job.retry_count >= job.max_retries {
                None
            } else {
                job.retry_count += 1;
                let delay = backoff_delay(job.retry_count);
                let now = Utc::now();
                job.status = JobStatus::Retrying;
                job.error = Some(message.clone());
                job.last_retry_at = Some(now);
                job.updated_at = now;

                let due = now + chrono::Duration::seconds(delay.as_secs() as i64);
                state.waiting.push(Reverse((due, id)));
                Some((job.clone(), delay))
            }
        };

        match retry {
            Some((snapshot, delay)) => {
                self.persist(&snapshot).await;
                warn!(
                    "Job {} attempt failed, retry {}/{} in {:?}: {}",
                    id, snapshot.retry_count, snapshot.max_retries, delay, message
                );
            }
            None => self.fail_terminal(id, message).await,
        }
    }

    /// Writes a job snapshot to the store, logging instead of failing
    async fn persist(&self, job: &Job) {
        if let Err(e) = self.store.update(job).await {
            warn!("Failed to persist job {}: {}", job.id, e);
        }
    }
}
