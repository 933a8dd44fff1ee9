//! Schedule management and dispatch
//!
//! Holds the live set of schedule definitions, recomputes `next_run` on
//! every change and dispatch, and materializes due definitions into queue
//! jobs on a fixed poll interval. Definitions are persisted through the
//! schedule store on every mutation and reloaded on startup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::{self, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use mediaflow_core::domain::job::JobKind;
use mediaflow_core::domain::schedule::{
    InvalidRecurrence, Recurrence, ScheduleDefinition, ScheduleStatus,
};

use crate::config::EngineConfig;
use crate::queue::{EnqueueOptions, JobQueue};
use crate::scheduler::recurrence::next_occurrence;
use crate::store::{ScheduleStore, StoreError};

pub mod recurrence;

/// Errors surfaced by schedule operations
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// No schedule with the given id
    #[error("schedule not found: {0}")]
    NotFound(Uuid),

    /// The recurrence rule is out of range
    #[error("invalid recurrence: {0}")]
    InvalidRecurrence(#[from] InvalidRecurrence),

    /// The schedule store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fields of a schedule definition that can be edited in place
///
/// Any edit recomputes `next_run` from the resulting definition.
#[derive(Debug, Clone, Default)]
pub struct ScheduleChanges {
    pub name: Option<String>,
    pub kind: Option<JobKind>,
    pub recurrence: Option<Recurrence>,
    pub time_of_day: Option<NaiveTime>,
    pub payload_template: Option<serde_json::Value>,
}

/// Recurring-schedule manager dispatching due definitions into the queue
pub struct Scheduler {
    definitions: Mutex<HashMap<Uuid, ScheduleDefinition>>,
    store: Arc<dyn ScheduleStore>,
    queue: Arc<JobQueue>,
    poll_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    /// Creates a scheduler feeding the given queue
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn ScheduleStore>,
        queue: Arc<JobQueue>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            definitions: Mutex::new(HashMap::new()),
            store,
            queue,
            poll_interval: config.scheduler_poll_interval,
            shutdown_tx,
        }
    }

    /// Reloads persisted definitions on startup
    ///
    /// A stored `next_run` is honored as-is, so a run missed while the
    /// process was down catches up with a single dispatch on the first
    /// tick. Definitions without one get it recomputed.
    ///
    /// # Returns
    /// The number of definitions loaded
    pub async fn load(&self) -> Result<usize, ScheduleError> {
        let stored = self.store.load_all().await?;
        let count = stored.len();
        let now = Utc::now();
        let mut repaired: Vec<ScheduleDefinition> = Vec::new();

        {
            let mut defs = self.definitions.lock().await;
            for mut def in stored {
                if def.next_run.is_none() && def.status == ScheduleStatus::Active {
                    def.next_run = Some(next_occurrence(&def.recurrence, def.time_of_day, now));
                    def.updated_at = now;
                    repaired.push(def.clone());
                }
                defs.insert(def.id, def);
            }
        }

        for def in &repaired {
            self.persist(def).await;
        }
        Ok(count)
    }

    /// Adds a new definition and computes its first run
    ///
    /// # Returns
    /// The id of the created definition
    pub async fn add(
        &self,
        name: impl Into<String>,
        kind: JobKind,
        recurrence: Recurrence,
        time_of_day: NaiveTime,
        payload_template: serde_json::Value,
    ) -> Result<Uuid, ScheduleError> {
        recurrence.validate()?;

        let mut def = ScheduleDefinition::new(name, kind, recurrence, time_of_day, payload_template);
        def.next_run = Some(next_occurrence(&def.recurrence, def.time_of_day, Utc::now()));
        self.store.upsert(&def).await?;

        let id = def.id;
        info!("Added schedule '{}', first run {:?}", def.name, def.next_run);
        self.definitions.lock().await.insert(id, def);
        Ok(id)
    }

    /// Edits a definition in place and recomputes its next run
    pub async fn update(&self, id: Uuid, changes: ScheduleChanges) -> Result<(), ScheduleError> {
        if let Some(recurrence) = &changes.recurrence {
            recurrence.validate()?;
        }

        let snapshot = {
            let mut defs = self.definitions.lock().await;
            let def = defs.get_mut(&id).ok_or(ScheduleError::NotFound(id))?;
            if let Some(name) = changes.name {
                def.name = name;
            }
            if let Some(kind) = changes.kind {
                def.kind = kind;
            }
            if let Some(recurrence) = changes.recurrence {
                def.recurrence = recurrence;
            }
            if let Some(time_of_day) = changes.time_of_day {
                def.time_of_day = time_of_day;
            }
            if let Some(payload_template) = changes.payload_template {
                def.payload_template = payload_template;
            }

            let now = Utc::now();
            def.next_run = Some(next_occurrence(&def.recurrence, def.time_of_day, now));
            def.updated_at = now;
            def.clone()
        };

        self.store.upsert(&snapshot).await?;
        Ok(())
    }

    /// Removes a definition
    pub async fn remove(&self, id: Uuid) -> Result<(), ScheduleError> {
        let removed = self.definitions.lock().await.remove(&id);
        let Some(def) = removed else {
            return Err(ScheduleError::NotFound(id));
        };
        self.store.delete(id).await?;
        info!("Removed schedule '{}'", def.name);
        Ok(())
    }

    /// Stops a definition from dispatching until resumed
    pub async fn pause(&self, id: Uuid) -> Result<(), ScheduleError> {
        let snapshot = {
            let mut defs = self.definitions.lock().await;
            let def = defs.get_mut(&id).ok_or(ScheduleError::NotFound(id))?;
            def.status = ScheduleStatus::Paused;
            def.updated_at = Utc::now();
            def.clone()
        };
        self.store.upsert(&snapshot).await?;
        info!("Paused schedule '{}'", snapshot.name);
        Ok(())
    }

    /// Reactivates a paused definition
    ///
    /// The next run is recomputed from now, so runs missed while paused are
    /// not replayed.
    pub async fn resume(&self, id: Uuid) -> Result<(), ScheduleError> {
        let snapshot = {
            let mut defs = self.definitions.lock().await;
            let def = defs.get_mut(&id).ok_or(ScheduleError::NotFound(id))?;
            let now = Utc::now();
            def.status = ScheduleStatus::Active;
            def.next_run = Some(next_occurrence(&def.recurrence, def.time_of_day, now));
            def.updated_at = now;
            def.clone()
        };
        self.store.upsert(&snapshot).await?;
        info!("Resumed schedule '{}', next run {:?}", snapshot.name, snapshot.next_run);
        Ok(())
    }

    /// Point lookup of a definition
    pub async fn get(&self, id: Uuid) -> Option<ScheduleDefinition> {
        self.definitions.lock().await.get(&id).cloned()
    }

    /// All definitions, sorted by name
    pub async fn list(&self) -> Vec<ScheduleDefinition> {
        let defs = self.definitions.lock().await;
        let mut all: Vec<ScheduleDefinition> = defs.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Dispatches every Active definition whose next run is due
    ///
    /// Each dispatch enqueues one job, records `last_run` and advances
    /// `next_run`. A `Once` definition is paused after its dispatch. When
    /// enqueueing fails the definition is left untouched so the next tick
    /// tries again.
    ///
    /// # Returns
    /// The number of jobs dispatched
    pub async fn dispatch_due(&self) -> usize {
        let now = Utc::now();
        let due: Vec<ScheduleDefinition> = {
            let defs = self.definitions.lock().await;
            defs.values()
                .filter(|def| {
                    def.status == ScheduleStatus::Active
                        && def.next_run.map(|at| at <= now).unwrap_or(false)
                })
                .cloned()
                .collect()
        };

        let mut dispatched = 0;
        for def in due {
            let job_id = match self
                .queue
                .enqueue(def.kind, def.payload_template.clone(), EnqueueOptions::default())
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!("Schedule '{}' failed to enqueue a job: {}", def.name, e);
                    continue;
                }
            };
            info!("Schedule '{}' dispatched job {}", def.name, job_id);

            let snapshot = {
                let mut defs = self.definitions.lock().await;
                let Some(entry) = defs.get_mut(&def.id) else {
                    continue;
                };
                entry.last_run = Some(now);
                match entry.recurrence {
                    Recurrence::Once => {
                        entry.status = ScheduleStatus::Paused;
                        entry.next_run = None;
                    }
                    _ => {
                        entry.next_run =
                            Some(next_occurrence(&entry.recurrence, entry.time_of_day, now));
                    }
                }
                entry.updated_at = now;
                entry.clone()
            };
            self.persist(&snapshot).await;
            dispatched += 1;
        }
        dispatched
    }

    /// Runs the dispatch loop until shutdown
    pub async fn run_dispatch(self: Arc<Self>) {
        info!("Schedule dispatch loop started (interval: {:?})", self.poll_interval);
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            self.dispatch_due().await;
        }

        info!("Schedule dispatch loop stopped");
    }

    /// Signals the dispatch loop to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Writes a definition to the store, logging instead of failing
    async fn persist(&self, def: &ScheduleDefinition) {
        if let Err(e) = self.store.upsert(def).await {
            warn!("Failed to persist schedule '{}': {}", def.name, e);
        }
    }
}
