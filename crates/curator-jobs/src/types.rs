//! Run records and the remote status vocabulary.

use curator_core::{JobId, RunStatus, RunToken};
use serde::Serialize;
use std::fmt;

/// Status vocabulary reported by the job processor.
///
/// Anything outside the known set is preserved verbatim in `Other` so a
/// newer processor does not break polling; the local run state is simply
/// left unchanged until a known value arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Queued,
    Running,
    Completed,
    Aborted,
    Failed,
    Other(String),
}

impl RemoteStatus {
    /// Maps a remote status onto the local run vocabulary.
    ///
    /// Returns `None` for values the poller should ignore.
    pub fn as_run_status(&self) -> Option<RunStatus> {
        match self {
            RemoteStatus::Queued => Some(RunStatus::Queued),
            RemoteStatus::Running => Some(RunStatus::Running),
            RemoteStatus::Completed => Some(RunStatus::Completed),
            RemoteStatus::Aborted => Some(RunStatus::Aborted),
            RemoteStatus::Failed => Some(RunStatus::Failed),
            RemoteStatus::Other(_) => None,
        }
    }
}

impl From<&str> for RemoteStatus {
    fn from(value: &str) -> Self {
        match value {
            "queued" => RemoteStatus::Queued,
            "running" => RemoteStatus::Running,
            "completed" => RemoteStatus::Completed,
            "aborted" => RemoteStatus::Aborted,
            "failed" => RemoteStatus::Failed,
            other => RemoteStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Queued => write!(f, "queued"),
            RemoteStatus::Running => write!(f, "running"),
            RemoteStatus::Completed => write!(f, "completed"),
            RemoteStatus::Aborted => write!(f, "aborted"),
            RemoteStatus::Failed => write!(f, "failed"),
            RemoteStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One run of a job, as persisted in the run store.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub token: RunToken,
    pub job_id: JobId,
    pub status: RunStatus,
    /// Human-readable note about the latest transition (error text, abort
    /// reason, poll diagnostics).
    pub detail: Option<String>,
    /// True when the run lives on the remote processor. Local runs (ingest,
    /// sweep, failed dispatches) are never polled or cancelled remotely.
    pub remote: bool,
    /// RFC 3339 UTC timestamp of dispatch.
    pub started: String,
    /// RFC 3339 UTC timestamp of the terminal transition, if reached.
    pub ended: Option<String>,
}

/// Result of submitting a fired job to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The processor accepted the job and handed back a run token.
    Submitted(RunToken),
    /// An earlier run of the same job is still in flight.
    Skipped,
    /// Dispatch failed; a failure record was written under this token.
    Failed(RunToken),
}
