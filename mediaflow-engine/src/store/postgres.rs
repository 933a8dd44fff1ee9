//! Postgres store backend
//!
//! Runtime-bound queries against a schema bootstrapped in code. The engine
//! owns its tables; there is no external migrations tooling.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use mediaflow_core::domain::job::{Job, JobKind, JobStatus};
use mediaflow_core::domain::schedule::{Recurrence, ScheduleDefinition, ScheduleStatus};

use crate::store::{JobStore, ScheduleStore, StoreError};

/// Store backend persisting to Postgres
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects to the database and builds the connection pool
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the engine's tables and indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id UUID PRIMARY KEY,
                kind VARCHAR(50) NOT NULL,
                payload JSONB NOT NULL DEFAULT 'null',
                status VARCHAR(50) NOT NULL,
                progress SMALLINT NOT NULL DEFAULT 0,
                result JSONB,
                error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 0,
                scheduled_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                last_retry_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schedules (
                id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                kind VARCHAR(50) NOT NULL,
                recurrence JSONB NOT NULL,
                time_of_day TIME NOT NULL,
                status VARCHAR(50) NOT NULL,
                last_run TIMESTAMPTZ,
                next_run TIMESTAMPTZ,
                payload_template JSONB NOT NULL DEFAULT 'null',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_schedules_next_run ON schedules(next_run)")
            .execute(&self.pool)
            .await?;

        tracing::info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, payload, status, progress, result, error,
                              retry_count, max_retries, scheduled_at, created_at,
                              updated_at, last_retry_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(kind_to_string(job.kind))
        .bind(&job.payload)
        .bind(status_to_string(job.status))
        .bind(job.progress as i16)
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.retry_count as i32)
        .bind(job.max_retries as i32)
        .bind(job.scheduled_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.last_retry_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, progress = $2, result = $3, error = $4,
                retry_count = $5, scheduled_at = $6, updated_at = $7,
                last_retry_at = $8
            WHERE id = $9
            "#,
        )
        .bind(status_to_string(job.status))
        .bind(job.progress as i16)
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.retry_count as i32)
        .bind(job.scheduled_at)
        .bind(job.updated_at)
        .bind(job.last_retry_at)
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, kind, payload, status, progress, result, error,
                   retry_count, max_retries, scheduled_at, created_at,
                   updated_at, last_retry_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn fetch_unfinished(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, kind, payload, status, progress, result, error,
                   retry_count, max_retries, scheduled_at, created_at,
                   updated_at, last_retry_at
            FROM jobs
            WHERE status NOT IN ('Completed', 'Failed')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn upsert(&self, definition: &ScheduleDefinition) -> Result<(), StoreError> {
        let recurrence = serde_json::to_value(&definition.recurrence)?;

        sqlx::query(
            r#"
            INSERT INTO schedules (id, name, kind, recurrence, time_of_day, status,
                                   last_run, next_run, payload_template, created_at,
                                   updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, kind = EXCLUDED.kind,
                recurrence = EXCLUDED.recurrence, time_of_day = EXCLUDED.time_of_day,
                status = EXCLUDED.status, last_run = EXCLUDED.last_run,
                next_run = EXCLUDED.next_run,
                payload_template = EXCLUDED.payload_template,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(definition.id)
        .bind(&definition.name)
        .bind(kind_to_string(definition.kind))
        .bind(recurrence)
        .bind(definition.time_of_day)
        .bind(schedule_status_to_string(definition.status))
        .bind(definition.last_run)
        .bind(definition.next_run)
        .bind(&definition.payload_template)
        .bind(definition.created_at)
        .bind(definition.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ScheduleDefinition>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT id, name, kind, recurrence, time_of_day, status, last_run,
                   next_run, payload_template, created_at, updated_at
            FROM schedules
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn kind_to_string(kind: JobKind) -> &'static str {
    kind.as_str()
}

fn string_to_kind(s: &str) -> JobKind {
    match s {
        "pipeline" => JobKind::Pipeline,
        "distribution" => JobKind::Distribution,
        _ => JobKind::Maintenance,
    }
}

fn status_to_string(status: JobStatus) -> &'static str {
    status.as_str()
}

fn string_to_status(s: &str) -> JobStatus {
    match s {
        "Pending" => JobStatus::Pending,
        "Scheduled" => JobStatus::Scheduled,
        "Running" => JobStatus::Running,
        "Retrying" => JobStatus::Retrying,
        "Completed" => JobStatus::Completed,
        "Failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn schedule_status_to_string(status: ScheduleStatus) -> &'static str {
    match status {
        ScheduleStatus::Active => "Active",
        ScheduleStatus::Paused => "Paused",
    }
}

fn string_to_schedule_status(s: &str) -> ScheduleStatus {
    match s {
        "Paused" => ScheduleStatus::Paused,
        _ => ScheduleStatus::Active,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    payload: serde_json::Value,
    status: String,
    progress: i16,
    result: Option<serde_json::Value>,
    error: Option<String>,
    retry_count: i32,
    max_retries: i32,
    scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    last_retry_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            kind: string_to_kind(&row.kind),
            payload: row.payload,
            status: string_to_status(&row.status),
            progress: row.progress.clamp(0, 100) as u8,
            result: row.result,
            error: row.error,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            scheduled_at: row.scheduled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_retry_at: row.last_retry_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    name: String,
    kind: String,
    recurrence: serde_json::Value,
    time_of_day: chrono::NaiveTime,
    status: String,
    last_run: Option<chrono::DateTime<chrono::Utc>>,
    next_run: Option<chrono::DateTime<chrono::Utc>>,
    payload_template: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ScheduleRow> for ScheduleDefinition {
    fn from(row: ScheduleRow) -> Self {
        let recurrence = serde_json::from_value(row.recurrence).unwrap_or(Recurrence::Daily);

        ScheduleDefinition {
            id: row.id,
            name: row.name,
            kind: string_to_kind(&row.kind),
            recurrence,
            time_of_day: row.time_of_day,
            status: string_to_schedule_status(&row.status),
            last_run: row.last_run,
            next_run: row.next_run,
            payload_template: row.payload_template,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
