//! Pipeline execution
//!
//! Runs the ordered stages of a pipeline job against their remote services.
//! Each stage follows the same remote-task protocol: upload the input
//! artifact, poll until the task finishes, download the output and delete
//! the remote task. Outputs land in a per-job workspace so later stages can
//! consume the artifact of any earlier one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::time::{self, Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use mediaflow_client::{RemoteState, ServiceClient};
use mediaflow_core::domain::job::{Job, JobKind};
use mediaflow_core::domain::pipeline::{PipelinePayload, PipelineSpec, StageInput, StageSpec};
use mediaflow_core::domain::progress::StageMetadata;

use crate::config::EngineConfig;
use crate::pipeline::progress::{ProgressWindow, STAGE_BUDGET, stage_window};
use crate::queue::handler::{HandlerContext, JobHandler};

mod progress;

/// Handler executing pipeline jobs stage by stage
pub struct PipelineExecutor {
    config: EngineConfig,
}

impl PipelineExecutor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Runs all stages and packages the final artifact
    async fn execute_run(
        &self,
        payload: &PipelinePayload,
        stages: &[StageSpec],
        run: &PipelineRun,
        ctx: &HandlerContext,
    ) -> anyhow::Result<serde_json::Value> {
        let total = stages.len();
        let mut artifacts: HashMap<String, PathBuf> = HashMap::new();
        let mut last_artifact: Option<PathBuf> = None;

        for (index, stage) in stages.iter().enumerate() {
            let window = stage_window(index, total);
            let meta = StageMetadata {
                name: stage.name.clone(),
                index,
                total,
            };
            ctx.report(
                window.start,
                format!("stage {} started", stage.name),
                Some(meta.clone()),
            )
            .await;

            let input = resolve_input(stage, payload, &artifacts, last_artifact.as_deref())?;
            let artifact = self
                .execute_stage(stage, index, &input, run, window, ctx, &meta)
                .await
                .with_context(|| format!("stage '{}' failed", stage.name))?;

            artifacts.insert(stage.name.clone(), artifact.clone());
            last_artifact = Some(artifact);
            ctx.report(
                window.end,
                format!("stage {} finished", stage.name),
                Some(meta),
            )
            .await;
        }

        ctx.report(STAGE_BUDGET, "finalizing artifacts", None).await;

        let Some(final_artifact) = last_artifact else {
            anyhow::bail!("pipeline produced no artifact");
        };
        let output_dir = self.config.work_dir.join("outputs");
        tokio::fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        let output = output_dir.join(format!("{}.bin", ctx.job_id()));
        tokio::fs::copy(&final_artifact, &output)
            .await
            .with_context(|| format!("failed to publish {}", final_artifact.display()))?;
        ctx.report(95, "final artifact packaged", None).await;

        Ok(serde_json::json!({
            "output": output.display().to_string(),
            "stages": stages.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
        }))
    }

    /// Drives one stage through the remote-task protocol
    ///
    /// # Returns
    /// Path of the downloaded stage artifact
    #[allow(clippy::too_many_arguments)]
    async fn execute_stage(
        &self,
        stage: &StageSpec,
        index: usize,
        input: &Path,
        run: &PipelineRun,
        window: ProgressWindow,
        ctx: &HandlerContext,
        meta: &StageMetadata,
    ) -> anyhow::Result<PathBuf> {
        let client = ServiceClient::with_config(&stage.service_url, self.config.client.clone());

        let task_id = client.submit(input, &stage.params).await?;
        debug!("Stage {} submitted as remote task {}", stage.name, task_id);

        let poll = Duration::from_secs(stage.poll_interval_secs);
        let timeout = Duration::from_secs(stage.timeout_secs);
        let started = Instant::now();
        let mut last_reported = window.start;

        loop {
            let status = client.task_status(&task_id).await?;
            match status.status {
                RemoteState::Completed => break,
                RemoteState::Failed => {
                    discard_remote_task(&client, &task_id).await;
                    anyhow::bail!(
                        "remote task failed: {}",
                        status.message.as_deref().unwrap_or("no detail given")
                    );
                }
                RemoteState::Running => {
                    let mapped = window.map(status.progress);
                    if mapped > last_reported {
                        last_reported = mapped;
                        ctx.report(
                            mapped,
                            format!("stage {} running", stage.name),
                            Some(meta.clone()),
                        )
                        .await;
                    }
                }
            }

            if started.elapsed() >= timeout {
                discard_remote_task(&client, &task_id).await;
                anyhow::bail!(
                    "timed out after {}s waiting for remote task {}",
                    stage.timeout_secs,
                    task_id
                );
            }
            time::sleep(poll).await;
        }

        let artifact = run.stage_artifact(index, &stage.name);
        client.download(&task_id, &artifact).await?;
        discard_remote_task(&client, &task_id).await;
        Ok(artifact)
    }
}

#[async_trait]
impl JobHandler for PipelineExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Pipeline
    }

    fn name(&self) -> &'static str {
        "pipeline"
    }

    async fn run(&self, job: &Job, ctx: &HandlerContext) -> anyhow::Result<serde_json::Value> {
        let payload: PipelinePayload =
            serde_json::from_value(job.payload.clone()).context("invalid pipeline payload")?;

        let stages = match payload.stages.clone() {
            Some(stages) => stages,
            None => PipelineSpec::localization(&self.config.services, &payload.params).stages,
        };
        if stages.is_empty() {
            anyhow::bail!("pipeline has no stages");
        }

        let run = PipelineRun::create(&self.config.work_dir, ctx.job_id()).await?;
        let result = self.execute_run(&payload, &stages, &run, ctx).await;
        run.cleanup().await;
        result
    }
}

/// Per-job scratch directory holding intermediate stage artifacts
struct PipelineRun {
    workspace: PathBuf,
}

impl PipelineRun {
    /// Creates a fresh workspace under `<work_dir>/jobs/<job_id>`
    async fn create(work_dir: &Path, job_id: Uuid) -> anyhow::Result<Self> {
        let workspace = work_dir.join("jobs").join(job_id.to_string());
        // a failed earlier attempt may have left artifacts behind
        let _ = tokio::fs::remove_dir_all(&workspace).await;
        tokio::fs::create_dir_all(&workspace)
            .await
            .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
        Ok(Self { workspace })
    }

    /// Path a stage's downloaded artifact is written to
    fn stage_artifact(&self, index: usize, name: &str) -> PathBuf {
        self.workspace.join(format!("{:02}-{}.bin", index + 1, name))
    }

    /// Removes the workspace. Intermediates are disposable, so failure to
    /// remove them is logged, not propagated.
    async fn cleanup(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.workspace).await {
            debug!("Workspace {} not removed: {}", self.workspace.display(), e);
        }
    }
}

/// Picks the input artifact for a stage
fn resolve_input(
    stage: &StageSpec,
    payload: &PipelinePayload,
    artifacts: &HashMap<String, PathBuf>,
    previous: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    match &stage.input {
        StageInput::Source => Ok(PathBuf::from(&payload.source)),
        StageInput::Previous => previous.map(Path::to_path_buf).ok_or_else(|| {
            anyhow::anyhow!(
                "stage '{}' consumes the previous artifact but runs first",
                stage.name
            )
        }),
        StageInput::Stage(name) => artifacts.get(name).cloned().ok_or_else(|| {
            anyhow::anyhow!("stage '{}' consumes unknown artifact '{}'", stage.name, name)
        }),
    }
}

/// Best-effort delete of a finished or abandoned remote task
async fn discard_remote_task(client: &ServiceClient, task_id: &str) {
    if let Err(e) = client.delete_task(task_id).await {
        debug!("Remote task {} not deleted: {}", task_id, e);
    }
}
