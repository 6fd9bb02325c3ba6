use thiserror::Error;

pub type Result<T> = std::result::Result<T, SweeperError>;

#[derive(Debug, Error)]
pub enum SweeperError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
