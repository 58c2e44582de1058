use thiserror::Error;

/// Errors shared across the static index, change-set analyser, call-site
/// locator, and interactive tracer.
#[derive(Error, Debug)]
pub enum TracerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid canonical id: {0}")]
    InvalidCanonicalId(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("timeout waiting for line {0}")]
    Timeout(i64),

    #[error("target raised an error: {message}")]
    TargetException {
        message: String,
        traceback: String,
    },
}

pub type Result<T> = std::result::Result<T, TracerError>;
