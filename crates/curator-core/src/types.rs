use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job configuration.
///
/// Generated locally (UUIDv4) when the owning store creates a configuration,
/// or supplied by the caller when importing existing configurations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque handle for one remote execution, issued by the Job Processor.
///
/// Tokens are retained even after the run reaches a terminal state so a later
/// configuration update can never orphan an in-flight execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunToken(pub String);

impl RunToken {
    /// Mints a token locally, for runs that never reach the Job Processor
    /// (ingest and sweep actions, or dispatches the processor refused).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Repeat granularity for a recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    /// Step length in seconds for units that are a fixed wall-clock span.
    /// `Month` steps by calendar arithmetic and has no fixed length.
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            TimeUnit::Second => Some(1),
            TimeUnit::Minute => Some(60),
            TimeUnit::Hour => Some(3_600),
            TimeUnit::Day => Some(86_400),
            TimeUnit::Week => Some(604_800),
            TimeUnit::Month => None,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
        };
        write!(f, "{s}")
    }
}

/// Day of week for weekly schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
            Weekday::Sunday => chrono::Weekday::Sun,
        }
    }
}

/// Wall-clock target for day-grained schedules, interpreted in the
/// configured timezone at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

/// Recurring part of a schedule: fire every `interval` units, optionally
/// pinned to a wall-clock time and a weekday / day-of-month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repeat {
    pub unit: TimeUnit,
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u8>,
}

/// Recurrence rule attached to a job configuration.
///
/// Exactly one of `repeat`/`at` is set while `active` is true; an inactive
/// schedule never fires. Replaced wholesale whenever the owning configuration
/// is written; the scheduler never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Repeat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// An inactive schedule, for configurations that are stored but never run.
    pub fn inactive() -> Self {
        Self {
            active: false,
            repeat: None,
            at: None,
        }
    }

    pub fn once(at: DateTime<Utc>) -> Self {
        Self {
            active: true,
            repeat: None,
            at: Some(at),
        }
    }

    pub fn every(unit: TimeUnit, interval: u32) -> Self {
        Self {
            active: true,
            repeat: Some(Repeat {
                unit,
                interval,
                time_of_day: None,
                weekday: None,
                day_of_month: None,
            }),
            at: None,
        }
    }
}

/// What a job does when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobAction {
    /// Forward an opaque request body to the remote Job Processor and poll
    /// the execution to completion.
    Process { request: serde_json::Value },
    /// Start a deposit of a storage subdirectory through the configured
    /// archive backend and record the initial deposit status.
    Ingest { subdirectory: String },
    /// Run the artifact lifecycle sweeper over the configured targets.
    Sweep,
}

/// A named unit of schedulable work.
///
/// Owned by the configuration store; the scheduler only holds a derived
/// registration keyed by `id`. `last_modified` detects external edits,
/// `latest_run` is the write-back slot for the most recent dispatch token so
/// a restart can re-attach to an in-flight execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfiguration {
    pub id: JobId,
    pub name: String,
    pub action: JobAction,
    pub schedule: Schedule,
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_run: Option<RunToken>,
}

/// Local status of one remote execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Aborted,
    Failed,
    Timeout,
}

impl RunStatus {
    /// Terminal states never transition, with one exception: a late remote
    /// terminal state overrides a locally recorded `Timeout`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Queued | RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "aborted" => Ok(RunStatus::Aborted),
            "failed" => Ok(RunStatus::Failed),
            "timeout" => Ok(RunStatus::Timeout),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Terminal outcome of a run, appended to the report store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub token: RunToken,
    pub job_id: JobId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Raw report body as delivered by the remote service, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub finished: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_round_trips_through_json() {
        let schedule = Schedule {
            active: true,
            repeat: Some(Repeat {
                unit: TimeUnit::Week,
                interval: 2,
                time_of_day: Some(TimeOfDay { hour: 6, minute: 30 }),
                weekday: Some(Weekday::Monday),
                day_of_month: None,
            }),
            at: None,
        };

        let json = serde_json::to_value(&schedule).unwrap();
        assert_eq!(json["repeat"]["unit"], "week");
        assert_eq!(json["repeat"]["weekday"], "monday");
        assert!(json.get("at").is_none());

        let back: Schedule = serde_json::from_value(json).unwrap();
        assert_eq!(back, schedule);
    }

    #[test]
    fn job_action_uses_kind_tag() {
        let action = JobAction::Ingest {
            subdirectory: "triggered/batch-7".into(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "ingest");

        let sweep: JobAction = serde_json::from_value(serde_json::json!({"kind": "sweep"})).unwrap();
        assert_eq!(sweep, JobAction::Sweep);
    }

    #[test]
    fn run_status_terminal_classification() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Aborted.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Timeout.is_terminal());
    }

    #[test]
    fn run_status_parses_its_display_form() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Aborted,
            RunStatus::Failed,
            RunStatus::Timeout,
        ] {
            let parsed: RunStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }
}
