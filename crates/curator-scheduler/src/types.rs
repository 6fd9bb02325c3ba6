use chrono::{DateTime, Utc};
use curator_core::{JobConfiguration, JobId};
use serde::Serialize;

/// Registry entry for one job configuration.
///
/// Exclusively owned by the scheduler; the rest of the system only sees it
/// through [`crate::engine::SchedulerHandle`] operations. `anchor` is the
/// first computed occurrence and fixes the phase of every later one, so
/// repeated recomputation never drifts.
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub job: JobConfiguration,
    pub anchor: Option<DateTime<Utc>>,
    /// `None` means the entry is recorded but never selected for firing
    /// (inactive schedule, or rule exhausted before registration).
    pub next_trigger: Option<DateTime<Utc>>,
}

/// A job handed to the worker channel by the tick loop.
#[derive(Debug, Clone)]
pub struct FiredJob {
    pub job: JobConfiguration,
    pub fired_at: DateTime<Utc>,
}

/// Read-only view of one registry entry, for the status operation.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulePlan {
    pub job_id: JobId,
    pub name: String,
    pub active: bool,
    pub next_trigger: Option<DateTime<Utc>>,
}
