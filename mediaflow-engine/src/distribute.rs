//! Distribution job handler
//!
//! Hands a finished artifact to the distribution service. Publication runs
//! asynchronously on the remote side; the job completes once the artifact
//! is accepted and records the remote task id for tracking.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use mediaflow_client::ServiceClient;
use mediaflow_core::domain::job::{Job, JobKind};

use crate::config::EngineConfig;
use crate::queue::handler::{HandlerContext, JobHandler};

/// Handler submitting artifacts to the distribution service
pub struct DistributionHandler {
    service_url: String,
    client_config: mediaflow_client::ClientConfig,
}

impl DistributionHandler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            service_url: config.distribution_url.clone(),
            client_config: config.client.clone(),
        }
    }
}

/// Payload carried by distribution jobs
#[derive(Debug, Deserialize)]
struct DistributionPayload {
    /// Path of the artifact to publish.
    artifact: String,
    /// Publication metadata forwarded verbatim to the service.
    #[serde(default)]
    metadata: serde_json::Value,
}

#[async_trait]
impl JobHandler for DistributionHandler {
    fn kind(&self) -> JobKind {
        JobKind::Distribution
    }

    fn name(&self) -> &'static str {
        "distribution"
    }

    async fn run(&self, job: &Job, ctx: &HandlerContext) -> anyhow::Result<serde_json::Value> {
        let payload: DistributionPayload =
            serde_json::from_value(job.payload.clone()).context("invalid distribution payload")?;

        ctx.report(10, "submitting artifact for distribution", None).await;

        let client = ServiceClient::with_config(&self.service_url, self.client_config.clone());
        let task_id = client
            .submit(Path::new(&payload.artifact), &payload.metadata)
            .await
            .context("distribution submit failed")?;

        ctx.report(80, "artifact accepted by the distribution service", None)
            .await;

        Ok(serde_json::json!({ "distribution_task": task_id }))
    }
}
