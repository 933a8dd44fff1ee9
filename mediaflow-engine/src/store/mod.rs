//! Persistence seam for jobs and schedule definitions
//!
//! The queue and the scheduler own their records in memory and write every
//! mutation through these traits. The durable record outlives in-memory
//! eviction: the cleanup sweep never deletes from a store.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use mediaflow_core::domain::job::Job;
use mediaflow_core::domain::schedule::ScheduleDefinition;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors surfaced by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to (de)serialize a stored value
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable record of jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a newly created job.
    async fn insert(&self, job: &Job) -> Result<(), StoreError>;

    /// Persists the current state of an existing job.
    async fn update(&self, job: &Job) -> Result<(), StoreError>;

    /// Point lookup by id.
    async fn fetch(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Jobs whose status is not terminal, oldest first. Used for startup
    /// recovery.
    async fn fetch_unfinished(&self) -> Result<Vec<Job>, StoreError>;
}

/// Durable record of schedule definitions
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Inserts or replaces a definition.
    async fn upsert(&self, definition: &ScheduleDefinition) -> Result<(), StoreError>;

    /// Removes a definition.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Loads every persisted definition.
    async fn load_all(&self) -> Result<Vec<ScheduleDefinition>, StoreError>;
}
