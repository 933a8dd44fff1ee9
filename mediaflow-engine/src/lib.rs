//! Mediaflow Engine
//!
//! The orchestration core of the Mediaflow backend: a persistent job queue
//! with retry, a recurring-schedule dispatcher, and a multi-stage pipeline
//! executor driving remote processing services.
//!
//! This crate contains:
//! - Queue: single-worker job queue with scheduling, retry and cleanup
//! - Scheduler: turns recurring definitions into concrete jobs
//! - Pipeline: runs ordered remote stages and chains their artifacts
//! - Stores: in-memory and Postgres persistence behind one seam

pub mod config;
pub mod distribute;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use config::EngineConfig;
pub use distribute::DistributionHandler;
pub use notify::{ProgressSink, TracingSink};
pub use pipeline::PipelineExecutor;
pub use queue::handler::{HandlerContext, HandlerRegistry, JobHandler};
pub use queue::{EnqueueOptions, JobQueue, StatusPatch};
pub use scheduler::{ScheduleChanges, ScheduleError, Scheduler};
pub use store::{JobStore, MemoryStore, PgStore, ScheduleStore, StoreError};
