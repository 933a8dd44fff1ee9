//! Shared fixtures: a recording progress sink and a scripted stub
//! processing service speaking the remote-task protocol.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::Mutex;
use uuid::Uuid;

use mediaflow_core::domain::job::Job;
use mediaflow_core::domain::progress::ProgressUpdate;
use mediaflow_engine::{EngineConfig, HandlerRegistry, JobQueue, MemoryStore, ProgressSink};

// =============================================================================
// Queue Fixtures
// =============================================================================

/// Sink recording every published update for assertions
#[derive(Default)]
pub struct RecordingSink {
    updates: std::sync::Mutex<Vec<ProgressUpdate>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Updates published for one job, in order
    pub fn updates_for(&self, job_id: Uuid) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.job_id == job_id)
            .cloned()
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Engine config tuned for fast tests
pub fn test_config(work_dir: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.work_dir = work_dir.to_path_buf();
    config.worker_tick = Duration::from_millis(50);
    config.scheduler_poll_interval = Duration::from_millis(50);
    config.cleanup_interval = Duration::from_secs(3600);
    config.client = mediaflow_client::ClientConfig {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_base_delay: Duration::from_millis(5),
    };
    config
}

/// Queue over a fresh in-memory store and recording sink
pub fn memory_queue(config: &EngineConfig) -> (Arc<JobQueue>, Arc<MemoryStore>, Arc<RecordingSink>) {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::new());
    let queue = Arc::new(JobQueue::new(config, store.clone(), sink.clone()));
    (queue, store, sink)
}

pub fn start_worker(queue: &Arc<JobQueue>, registry: HandlerRegistry) {
    tokio::spawn(queue.clone().run_worker(Arc::new(registry)));
}

/// Polls until the job reaches a terminal state
pub async fn wait_for_terminal(queue: &Arc<JobQueue>, id: Uuid, deadline: Duration) -> Job {
    let started = tokio::time::Instant::now();
    loop {
        if let Some(job) = queue.get(id).await {
            if job.status.is_terminal() {
                return job;
            }
        }
        if started.elapsed() > deadline {
            panic!("job {} did not reach a terminal state within {:?}", id, deadline);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// =============================================================================
// Stub Processing Service
// =============================================================================

/// Scripted outcome for one submitted task
#[derive(Clone)]
pub enum Behavior {
    /// Report running with each progress step once, then complete.
    Complete { steps: Vec<u8> },
    /// Report the task as failed.
    Fail { message: String },
    /// Report running at 10% forever.
    Stall,
}

struct TaskState {
    behavior: Behavior,
    polls: usize,
    content: Vec<u8>,
}

/// One stub processing service
///
/// Downloads return `name(received-content)` so tests can assert how
/// artifacts chained through a pipeline. Submits are appended to a log
/// shared across the services of a test.
pub struct StubService {
    pub name: String,
    /// Behavior per submit, in order. The last entry repeats.
    behaviors: Mutex<VecDeque<Behavior>>,
    tasks: Mutex<HashMap<String, TaskState>>,
    counter: AtomicUsize,
    pub uploads: Mutex<Vec<Vec<u8>>>,
    pub deletes: Mutex<Vec<String>>,
    submit_log: Arc<std::sync::Mutex<Vec<String>>>,
}

impl StubService {
    pub async fn upload_count(&self) -> usize {
        self.uploads.lock().await.len()
    }

    pub async fn delete_count(&self) -> usize {
        self.deletes.lock().await.len()
    }
}

async fn submit(
    State(svc): State<Arc<StubService>>,
    mut multipart: Multipart,
) -> Json<serde_json::Value> {
    let mut content = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            content = field.bytes().await.unwrap().to_vec();
        }
    }

    let behavior = {
        let mut behaviors = svc.behaviors.lock().await;
        if behaviors.len() > 1 {
            behaviors.pop_front().unwrap()
        } else {
            behaviors
                .front()
                .cloned()
                .unwrap_or(Behavior::Complete { steps: vec![] })
        }
    };

    let n = svc.counter.fetch_add(1, Ordering::SeqCst) + 1;
    let task_id = format!("{}-{}", svc.name, n);
    svc.submit_log.lock().unwrap().push(svc.name.clone());
    svc.uploads.lock().await.push(content.clone());
    svc.tasks.lock().await.insert(
        task_id.clone(),
        TaskState {
            behavior,
            polls: 0,
            content,
        },
    );

    Json(serde_json::json!({ "task_id": task_id }))
}

async fn task_status(
    State(svc): State<Arc<StubService>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut tasks = svc.tasks.lock().await;
    let Some(task) = tasks.get_mut(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };

    let behavior = task.behavior.clone();
    let body = match &behavior {
        Behavior::Complete { steps } => {
            if task.polls < steps.len() {
                let progress = steps[task.polls];
                task.polls += 1;
                serde_json::json!({ "status": "running", "progress": progress })
            } else {
                serde_json::json!({ "status": "completed", "progress": 100 })
            }
        }
        Behavior::Fail { message } => {
            serde_json::json!({ "status": "failed", "message": message })
        }
        Behavior::Stall => serde_json::json!({ "status": "running", "progress": 10 }),
    };
    Ok(Json(body))
}

async fn download(
    State(svc): State<Arc<StubService>>,
    Path(id): Path<String>,
) -> Result<Vec<u8>, StatusCode> {
    let tasks = svc.tasks.lock().await;
    let Some(task) = tasks.get(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    let received = String::from_utf8_lossy(&task.content);
    Ok(format!("{}({})", svc.name, received).into_bytes())
}

async fn delete_task(State(svc): State<Arc<StubService>>, Path(id): Path<String>) -> StatusCode {
    svc.deletes.lock().await.push(id);
    StatusCode::NO_CONTENT
}

/// Starts a stub service on an ephemeral port
///
/// # Returns
/// The service state and its base URL
pub async fn spawn_service(
    name: &str,
    behaviors: Vec<Behavior>,
    submit_log: Arc<std::sync::Mutex<Vec<String>>>,
) -> (Arc<StubService>, String) {
    let svc = Arc::new(StubService {
        name: name.to_string(),
        behaviors: Mutex::new(behaviors.into()),
        tasks: Mutex::new(HashMap::new()),
        counter: AtomicUsize::new(0),
        uploads: Mutex::new(Vec::new()),
        deletes: Mutex::new(Vec::new()),
        submit_log,
    });

    let app = Router::new()
        .route("/submit", post(submit))
        .route("/task/{id}", get(task_status).delete(delete_task))
        .route("/download/{id}", get(download))
        .with_state(svc.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (svc, format!("http://{}", addr))
}
