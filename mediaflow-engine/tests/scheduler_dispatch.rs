//! Scheduler tests: load, dispatch, pause/resume and definition editing

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use common::{memory_queue, test_config};
use mediaflow_core::domain::job::JobKind;
use mediaflow_core::domain::schedule::{Recurrence, ScheduleDefinition, ScheduleStatus};
use mediaflow_engine::{
    JobStore, MemoryStore, ScheduleChanges, ScheduleError, ScheduleStore, Scheduler,
};

struct Fixture {
    _dir: tempfile::TempDir,
    scheduler: Arc<Scheduler>,
    store: Arc<MemoryStore>,
}

/// Scheduler over a fresh in-memory store, with no worker consuming the
/// queue so dispatched jobs stay Pending and visible
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let (queue, store, _sink) = memory_queue(&config);
    let scheduler = Arc::new(Scheduler::new(&config, store.clone(), queue));
    Fixture {
        _dir: dir,
        scheduler,
        store,
    }
}

fn nine() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap()
}

/// Definition persisted with a next_run already in the past
fn due_definition(name: &str, recurrence: Recurrence) -> ScheduleDefinition {
    let mut def = ScheduleDefinition::new(
        name,
        JobKind::Pipeline,
        recurrence,
        nine(),
        serde_json::json!({ "source": "/data/in.mp4" }),
    );
    def.next_run = Some(Utc::now() - chrono::Duration::seconds(5));
    def
}

#[tokio::test]
async fn load_honors_persisted_next_run() {
    let f = fixture();
    f.store.upsert(&due_definition("nightly", Recurrence::Daily)).await.unwrap();

    assert_eq!(f.scheduler.load().await.unwrap(), 1);
    // the overdue run catches up exactly once
    assert_eq!(f.scheduler.dispatch_due().await, 1);

    let jobs = f.store.fetch_unfinished().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, JobKind::Pipeline);
    assert_eq!(jobs[0].payload["source"], "/data/in.mp4");
}

#[tokio::test]
async fn dispatch_advances_last_run_and_next_run() {
    let f = fixture();
    let def = due_definition("daily-digest", Recurrence::Daily);
    let id = def.id;
    f.store.upsert(&def).await.unwrap();
    f.scheduler.load().await.unwrap();

    assert_eq!(f.scheduler.dispatch_due().await, 1);

    let updated = f.scheduler.get(id).await.unwrap();
    assert!(updated.last_run.is_some());
    assert!(updated.next_run.unwrap() > Utc::now());
    assert_eq!(updated.status, ScheduleStatus::Active);

    assert_eq!(f.scheduler.dispatch_due().await, 0);
}

#[tokio::test]
async fn once_schedule_pauses_after_its_dispatch() {
    let f = fixture();
    let def = due_definition("one-shot", Recurrence::Once);
    let id = def.id;
    f.store.upsert(&def).await.unwrap();
    f.scheduler.load().await.unwrap();

    assert_eq!(f.scheduler.dispatch_due().await, 1);

    let updated = f.scheduler.get(id).await.unwrap();
    assert_eq!(updated.status, ScheduleStatus::Paused);
    assert_eq!(updated.next_run, None);
    assert_eq!(f.scheduler.dispatch_due().await, 0);

    // resuming re-arms it with a fresh future run
    f.scheduler.resume(id).await.unwrap();
    let resumed = f.scheduler.get(id).await.unwrap();
    assert_eq!(resumed.status, ScheduleStatus::Active);
    assert!(resumed.next_run.is_some());
    assert_eq!(f.scheduler.dispatch_due().await, 0);
}

#[tokio::test]
async fn paused_schedule_does_not_dispatch() {
    let f = fixture();
    let def = due_definition("paused", Recurrence::Daily);
    let id = def.id;
    f.store.upsert(&def).await.unwrap();
    f.scheduler.load().await.unwrap();

    f.scheduler.pause(id).await.unwrap();
    assert_eq!(f.scheduler.dispatch_due().await, 0);
    assert!(f.store.fetch_unfinished().await.unwrap().is_empty());

    // runs missed while paused are not replayed
    f.scheduler.resume(id).await.unwrap();
    assert_eq!(f.scheduler.dispatch_due().await, 0);
    assert!(f.scheduler.get(id).await.unwrap().next_run.unwrap() > Utc::now());
}

#[tokio::test]
async fn add_rejects_invalid_recurrence() {
    let f = fixture();
    let err = f
        .scheduler
        .add(
            "broken",
            JobKind::Pipeline,
            Recurrence::Monthly { day_of_month: 0 },
            nine(),
            Value::Null,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidRecurrence(_)));
}

#[tokio::test]
async fn add_computes_a_first_run_within_the_period() {
    let f = fixture();
    let id = f
        .scheduler
        .add("fresh", JobKind::Pipeline, Recurrence::Daily, nine(), Value::Null)
        .await
        .unwrap();

    let def = f.scheduler.get(id).await.unwrap();
    let next = def.next_run.unwrap();
    assert!(next > Utc::now() - chrono::Duration::seconds(1));
    assert!(next <= Utc::now() + chrono::Duration::days(1));

    // persisted immediately
    assert_eq!(f.store.load_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_recomputes_next_run() {
    let f = fixture();
    let def = due_definition("editable", Recurrence::Daily);
    let id = def.id;
    f.store.upsert(&def).await.unwrap();
    f.scheduler.load().await.unwrap();

    f.scheduler
        .update(
            id,
            ScheduleChanges {
                name: Some("renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let updated = f.scheduler.get(id).await.unwrap();
    assert_eq!(updated.name, "renamed");
    // the overdue run was dropped by the edit
    assert!(updated.next_run.unwrap() > Utc::now());
    assert_eq!(f.scheduler.dispatch_due().await, 0);

    let err = f
        .scheduler
        .update(Uuid::new_v4(), ScheduleChanges::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::NotFound(_)));
}

#[tokio::test]
async fn remove_deletes_the_definition() {
    let f = fixture();
    let id = f
        .scheduler
        .add("short-lived", JobKind::Pipeline, Recurrence::Daily, nine(), Value::Null)
        .await
        .unwrap();

    f.scheduler.remove(id).await.unwrap();
    assert!(f.scheduler.get(id).await.is_none());
    assert!(f.store.load_all().await.unwrap().is_empty());

    let err = f.scheduler.remove(id).await.unwrap_err();
    assert!(matches!(err, ScheduleError::NotFound(_)));
}

#[tokio::test]
async fn list_is_sorted_by_name() {
    let f = fixture();
    f.scheduler
        .add("beta", JobKind::Pipeline, Recurrence::Daily, nine(), Value::Null)
        .await
        .unwrap();
    f.scheduler
        .add("alpha", JobKind::Distribution, Recurrence::Daily, nine(), Value::Null)
        .await
        .unwrap();

    let names: Vec<String> = f.scheduler.list().await.into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn dispatch_loop_fires_in_the_background() {
    let f = fixture();
    f.store.upsert(&due_definition("background", Recurrence::Daily)).await.unwrap();
    f.scheduler.load().await.unwrap();

    tokio::spawn(f.scheduler.clone().run_dispatch());

    let started = tokio::time::Instant::now();
    loop {
        if !f.store.fetch_unfinished().await.unwrap().is_empty() {
            break;
        }
        if started.elapsed() > Duration::from_secs(2) {
            panic!("dispatch loop never fired");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    f.scheduler.shutdown();
}
