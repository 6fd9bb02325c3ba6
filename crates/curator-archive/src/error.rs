use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("bad credentials: {0}")]
    Credentials(String),

    #[error("invalid deposit id: {0}")]
    InvalidId(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("archive returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected archive response: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
