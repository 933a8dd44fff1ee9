//! Progress notification seam
//!
//! The engine publishes job progress and terminal events through a
//! caller-supplied sink. The notification layer that fans these out to users
//! lives outside this crate; the default sink just logs.

use mediaflow_core::domain::progress::ProgressUpdate;
use tracing::info;

/// Receives progress and terminal-state events for jobs
///
/// Implementations must be cheap and non-blocking; the queue and the
/// pipeline executor call this inline.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, update: ProgressUpdate);
}

/// Default sink that writes updates to the log
#[derive(Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn publish(&self, update: ProgressUpdate) {
        match &update.stage {
            Some(stage) => info!(
                "job {} progress {}% [{} {}/{}]: {}",
                update.job_id,
                update.progress,
                stage.name,
                stage.index + 1,
                stage.total,
                update.message
            ),
            None => info!(
                "job {} progress {}%: {}",
                update.job_id, update.progress, update.message
            ),
        }
    }
}
