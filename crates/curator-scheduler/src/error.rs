use thiserror::Error;

/// Errors that can occur during schedule registration and dispatch.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The rule failed registration-time validation; it never reaches the
    /// tick loop.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The worker channel is gone; the engine has nowhere to dispatch
    /// fired jobs.
    #[error("dispatch channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
