use curator_core::{CoreError, JobId, RunToken};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("run {token} not terminal after {secs}s poll budget")]
    PollTimeout { token: RunToken, secs: u64 },

    #[error("processor returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected processor response: {0}")]
    Parse(String),

    #[error("abort of job {job_id} unconfirmed after {attempts} attempts")]
    AbortUnconfirmed { job_id: JobId, attempts: u32 },

    #[error("job {job_id} has no active run")]
    NoActiveRun { job_id: JobId },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store error: {0}")]
    Store(#[from] CoreError),
}
