//! Mediaflow Daemon
//!
//! The long-running orchestration process of the Mediaflow backend.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Stores: Postgres persistence when DATABASE_URL is set, in-memory otherwise
//! - Queue: single-consumer worker executing pipeline and distribution jobs
//! - Scheduler: dispatches due recurring definitions into the queue
//!
//! On startup the daemon restores persisted jobs and schedule definitions,
//! then runs the worker, dispatch and cleanup loops until interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediaflow_engine::{
    DistributionHandler, EngineConfig, HandlerRegistry, JobQueue, JobStore, MemoryStore, PgStore,
    PipelineExecutor, ScheduleStore, Scheduler, TracingSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mediaflow_daemon=info,mediaflow_engine=info,mediaflow_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mediaflow Daemon");

    // Load configuration
    let config = EngineConfig::from_env();
    config.validate()?;
    info!(
        "Loaded configuration: work_dir={}, scheduler_poll={:?}",
        config.work_dir.display(),
        config.scheduler_poll_interval
    );

    // Initialize persistence
    let (job_store, schedule_store): (Arc<dyn JobStore>, Arc<dyn ScheduleStore>) =
        match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url)
                    .await
                    .context("Failed to connect to database")?;
                store
                    .ensure_schema()
                    .await
                    .context("Failed to prepare database schema")?;
                info!("Using Postgres persistence");
                let store = Arc::new(store);
                (store.clone(), store)
            }
            None => {
                info!("DATABASE_URL not set, using in-memory persistence");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    // Create the queue and restore persisted jobs
    let queue = Arc::new(JobQueue::new(&config, job_store, Arc::new(TracingSink)));
    let recovered = queue
        .recover()
        .await
        .context("Failed to recover persisted jobs")?;
    if recovered > 0 {
        info!("Recovered {} unfinished job(s)", recovered);
    }

    // Register job handlers
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(PipelineExecutor::new(config.clone())));
    registry.register(Arc::new(DistributionHandler::new(&config)));
    let registry = Arc::new(registry);
    info!("Registered {} job handler(s)", registry.len());

    // Load schedule definitions
    let scheduler = Arc::new(Scheduler::new(&config, schedule_store, queue.clone()));
    let loaded = scheduler
        .load()
        .await
        .context("Failed to load schedule definitions")?;
    info!("Loaded {} schedule definition(s)", loaded);

    // Start the engine loops
    let worker = tokio::spawn(queue.clone().run_worker(registry));
    let dispatcher = tokio::spawn(scheduler.clone().run_dispatch());
    let sweeper = tokio::spawn(queue.clone().run_cleanup());

    info!("Engine running; press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    queue.shutdown();
    scheduler.shutdown();
    let _ = tokio::join!(worker, dispatcher, sweeper);
    info!("Shutdown complete");

    Ok(())
}
