//! Recurring schedule definitions

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::JobKind;

/// A recurring rule that periodically materializes new jobs
///
/// Structure shared between the scheduler (computes `next_run`, dispatches)
/// and the schedule store (persists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: Uuid,
    pub name: String,
    /// Kind of the jobs this definition produces.
    pub kind: JobKind,
    pub recurrence: Recurrence,
    /// Wall-clock time of day (UTC) the rule fires at.
    pub time_of_day: NaiveTime,
    pub status: ScheduleStatus,
    pub last_run: Option<chrono::DateTime<chrono::Utc>>,
    /// Nearest future instant satisfying the recurrence. Recomputed by the
    /// scheduler after every dispatch.
    pub next_run: Option<chrono::DateTime<chrono::Utc>>,
    /// Payload given to every job this definition produces.
    pub payload_template: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ScheduleDefinition {
    /// Creates an Active definition with a fresh id. `next_run` stays unset
    /// until the scheduler admits the definition and computes it.
    pub fn new(
        name: impl Into<String>,
        kind: JobKind,
        recurrence: Recurrence,
        time_of_day: NaiveTime,
        payload_template: serde_json::Value,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            recurrence,
            time_of_day,
            status: ScheduleStatus::Active,
            last_run: None,
            next_run: None,
            payload_template,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Whether a definition is eligible for dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    Active,
    Paused,
}

/// Recurrence rule of a schedule definition
///
/// `Once` runs a single time and is paused afterwards. An empty `Weekly`
/// day list behaves like `Daily`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Recurrence {
    Once,
    Daily,
    Weekly { days: Vec<Weekday> },
    Monthly { day_of_month: u8 },
}

impl Recurrence {
    /// Rejects rules that could never produce a valid next run. Checked when
    /// a definition is created or updated, not silently coerced later.
    pub fn validate(&self) -> Result<(), InvalidRecurrence> {
        match self {
            Recurrence::Monthly { day_of_month } => {
                if *day_of_month == 0 || *day_of_month > 31 {
                    return Err(InvalidRecurrence(format!(
                        "day_of_month must be between 1 and 31, got {day_of_month}"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// A recurrence rule whose parameters are out of range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRecurrence(pub String);

impl std::fmt::Display for InvalidRecurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidRecurrence {}
