//! Remote-task endpoints of a processing service

use std::path::Path;

use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::ServiceClient;
use crate::error::{ClientError, Result};
use mediaflow_core::dto::remote::{RemoteTaskStatus, SubmitResponse};

impl ServiceClient {
    /// Submit an input artifact for processing
    ///
    /// Uploads the artifact as multipart form data together with the stage
    /// parameters serialized as JSON. The form is rebuilt for every transport
    /// retry.
    ///
    /// # Arguments
    /// * `artifact` - Path of the local input file
    /// * `params` - Stage parameters forwarded to the service
    ///
    /// # Returns
    /// The remote-assigned task id
    pub async fn submit(&self, artifact: &Path, params: &serde_json::Value) -> Result<String> {
        let url = format!("{}/submit", self.base_url);
        let bytes = tokio::fs::read(artifact).await?;
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let params_json = params.to_string();

        let response = self
            .send_with_retry("submit", || {
                let form = Form::new()
                    .part(
                        "file",
                        Part::bytes(bytes.clone()).file_name(file_name.clone()),
                    )
                    .text("params", params_json.clone());
                self.client
                    .post(&url)
                    .multipart(form)
                    .timeout(self.config.timeout)
                    .send()
            })
            .await?;

        let submit: SubmitResponse = self.handle_response(response).await?;
        debug!("submitted {} as remote task {}", artifact.display(), submit.task_id);
        Ok(submit.task_id)
    }

    /// Get the current status of a remote task
    ///
    /// # Arguments
    /// * `task_id` - The remote task id returned by [`submit`](Self::submit)
    pub async fn task_status(&self, task_id: &str) -> Result<RemoteTaskStatus> {
        let url = format!("{}/task/{}", self.base_url, task_id);
        let response = self
            .send_with_retry("task status", || {
                self.client.get(&url).timeout(self.config.timeout).send()
            })
            .await?;

        self.handle_response(response).await
    }

    /// Download the result artifact of a completed remote task
    ///
    /// # Arguments
    /// * `task_id` - The remote task id
    /// * `dest` - Local path the artifact is written to
    pub async fn download(&self, task_id: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/download/{}", self.base_url, task_id);
        let response = self
            .send_with_retry("download", || {
                self.client.get(&url).timeout(self.config.timeout).send()
            })
            .await?;

        let response = self.check_status(response).await?;
        let bytes = response.bytes().await.map_err(ClientError::RequestFailed)?;
        tokio::fs::write(dest, &bytes).await?;
        debug!("downloaded remote task {} to {}", task_id, dest.display());
        Ok(())
    }

    /// Delete a finished remote task record
    ///
    /// Services garbage-collect on their own eventually; this just frees
    /// their storage sooner.
    ///
    /// # Arguments
    /// * `task_id` - The remote task id
    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        let url = format!("{}/task/{}", self.base_url, task_id);
        let response = self
            .send_with_retry("delete task", || {
                self.client.delete(&url).timeout(self.config.timeout).send()
            })
            .await?;

        self.handle_empty_response(response).await
    }
}
