use thiserror::Error;

/// Road tracker error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Worker queue closed")]
    WorkerClosed,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// Result type for tracker operations
pub type TResult<T> = Result<T, TrackerError>;

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Config(err.to_string())
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Config(err.to_string())
    }
}
