//! Job handler dispatch
//!
//! Jobs carry a closed [`JobKind`]; the registry maps each kind to the
//! handler that executes it. A kind with no registered handler fails
//! immediately without consuming retries, since no retry could ever make it
//! succeed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use mediaflow_core::domain::job::{Job, JobKind};
use mediaflow_core::domain::progress::{ProgressUpdate, StageMetadata};

use crate::notify::ProgressSink;
use crate::queue::{JobQueue, StatusPatch};

/// Executes jobs of one kind
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job kind this handler executes.
    fn kind(&self) -> JobKind;

    /// Handler name for logs.
    fn name(&self) -> &'static str;

    /// Runs one attempt of the job to completion.
    ///
    /// The returned value becomes the job's `result`. An error becomes the
    /// attempt's failure message and feeds the queue's retry policy.
    async fn run(&self, job: &Job, ctx: &HandlerContext) -> anyhow::Result<serde_json::Value>;
}

/// Registry mapping job kinds to their handlers
///
/// Built once at startup, then shared read-only with the worker.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job handler
    ///
    /// # Panics
    /// Panics if a handler for this kind is already registered
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind();
        if self.handlers.contains_key(&kind) {
            panic!("Handler for job kind {} is already registered", kind);
        }
        self.handlers.insert(kind, handler);
    }

    /// Look up the handler for a kind
    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Per-attempt context handed to a handler
///
/// Lets the handler push progress for the job it is running. Updates flow
/// both into the queue's job record and out through the progress sink.
pub struct HandlerContext {
    job_id: Uuid,
    queue: Arc<JobQueue>,
    sink: Arc<dyn ProgressSink>,
}

impl HandlerContext {
    pub(crate) fn new(job_id: Uuid, queue: Arc<JobQueue>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id,
            queue,
            sink,
        }
    }

    /// The id of the job this attempt belongs to
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Report progress for the running job
    ///
    /// The queue clamps progress to be non-decreasing within the run; the
    /// sink receives every report, including stage boundaries that repeat a
    /// value.
    pub async fn report(&self, progress: u8, message: impl Into<String>, stage: Option<StageMetadata>) {
        let message = message.into();
        self.queue
            .update_status(
                self.job_id,
                StatusPatch {
                    progress: Some(progress),
                    ..Default::default()
                },
            )
            .await;
        self.sink.publish(ProgressUpdate {
            job_id: self.job_id,
            progress,
            message,
            stage,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler(JobKind);

    #[async_trait]
    impl JobHandler for NoopHandler {
        fn kind(&self) -> JobKind {
            self.0
        }

        fn name(&self) -> &'static str {
            "noop"
        }

        async fn run(&self, _job: &Job, _ctx: &HandlerContext) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(NoopHandler(JobKind::Pipeline)));
        registry.register(Arc::new(NoopHandler(JobKind::Distribution)));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(JobKind::Pipeline));
        assert!(registry.get(JobKind::Maintenance).is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration_panics() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NoopHandler(JobKind::Pipeline)));
        registry.register(Arc::new(NoopHandler(JobKind::Pipeline)));
    }
}
