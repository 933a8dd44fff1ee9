//! Progress reporting types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress event published to the caller-supplied sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: Uuid,
    /// Overall job progress, 0-100.
    pub progress: u8,
    pub message: String,
    /// Set when the update originated inside a pipeline stage.
    pub stage: Option<StageMetadata>,
}

/// Position of the stage a progress update originated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetadata {
    pub name: String,
    /// Zero-based index of the stage in its pipeline.
    pub index: usize,
    pub total: usize,
}
