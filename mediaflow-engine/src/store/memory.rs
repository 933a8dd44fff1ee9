//! In-memory store backend
//!
//! Used by tests and by deployments that accept losing history on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use mediaflow_core::domain::job::Job;
use mediaflow_core::domain::schedule::ScheduleDefinition;

use crate::store::{JobStore, ScheduleStore, StoreError};

/// Store backend keeping everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    schedules: Mutex<HashMap<Uuid, ScheduleDefinition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.lock().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.lock().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn fetch_unfinished(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut unfinished: Vec<Job> = jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect();
        unfinished.sort_by_key(|job| job.created_at);
        Ok(unfinished)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn upsert(&self, definition: &ScheduleDefinition) -> Result<(), StoreError> {
        self.schedules
            .lock()
            .await
            .insert(definition.id, definition.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.schedules.lock().await.remove(&id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ScheduleDefinition>, StoreError> {
        Ok(self.schedules.lock().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_core::domain::job::{JobKind, JobStatus};

    #[tokio::test]
    async fn test_job_round_trip() {
        let store = MemoryStore::new();
        let job = Job::new(JobKind::Pipeline, serde_json::json!({"source": "a.mp4"}));
        store.insert(&job).await.unwrap();

        let fetched = store.fetch(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);

        let missing = store.fetch(Uuid::new_v4()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_unfinished_excludes_terminal_jobs() {
        let store = MemoryStore::new();
        let pending = Job::new(JobKind::Pipeline, serde_json::Value::Null);
        let mut done = Job::new(JobKind::Pipeline, serde_json::Value::Null);
        done.status = JobStatus::Completed;

        store.insert(&pending).await.unwrap();
        store.insert(&done).await.unwrap();

        let unfinished = store.fetch_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, pending.id);
    }

    #[tokio::test]
    async fn test_schedule_upsert_and_delete() {
        let store = MemoryStore::new();
        let def = ScheduleDefinition::new(
            "nightly",
            JobKind::Pipeline,
            mediaflow_core::domain::schedule::Recurrence::Daily,
            chrono::NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            serde_json::Value::Null,
        );

        store.upsert(&def).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        store.delete(def.id).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
