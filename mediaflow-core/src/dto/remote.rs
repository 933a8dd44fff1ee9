//! Remote task protocol DTOs

use serde::{Deserialize, Serialize};

/// Response to submitting an artifact for processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Remote-assigned task id, opaque to the engine.
    pub task_id: String,
}

/// Status report for one remote task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTaskStatus {
    pub status: RemoteState,
    /// Remote-side progress, 0-100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
}

/// Lifecycle state of a remote task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Running,
    Completed,
    Failed,
}
