//! Job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job execution record
///
/// Structure shared between the queue (owns and mutates) and the stores
/// (persist). All mutation goes through the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Overall progress, 0-100. Non-decreasing within a single run.
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub last_retry_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Job {
    /// Creates a new job in `Pending` with a fresh id and zeroed counters.
    pub fn new(kind: JobKind, payload: serde_json::Value) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: 0,
            scheduled_at: None,
            created_at: now,
            updated_at: now,
            last_retry_at: None,
        }
    }
}

/// The closed set of job kinds the engine can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Multi-stage media-processing pipeline run
    Pipeline,
    /// Hand-off of a finished artifact to the distribution service
    Distribution,
    /// Internal housekeeping work
    Maintenance,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Pipeline => "pipeline",
            JobKind::Distribution => "distribution",
            JobKind::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting in the ready queue
    Pending,
    /// Waiting for a future `scheduled_at`
    Scheduled,
    /// Currently executing on the worker
    Running,
    /// Waiting out a retry backoff after a failed attempt
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed are final; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Scheduled => "Scheduled",
            JobStatus::Running => "Running",
            JobStatus::Retrying => "Retrying",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new(JobKind::Pipeline, serde_json::json!({"source": "a.mp4"}));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.retry_count, 0);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
        assert!(job.scheduled_at.is_none());
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&JobKind::Distribution).unwrap();
        assert_eq!(json, "\"distribution\"");
        let kind: JobKind = serde_json::from_str("\"pipeline\"").unwrap();
        assert_eq!(kind, JobKind::Pipeline);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Scheduled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
    }
}
