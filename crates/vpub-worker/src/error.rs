//! Worker error types.

use thiserror::Error;
use vpub_media::MediaError;
use vpub_models::ModelError;
use vpub_upload::{ErrorKind, UploadError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Classification recorded in a failed job outcome.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Upload(e) => e.kind(),
            WorkerError::Media(e) if e.is_cancelled() => ErrorKind::Cancelled,
            WorkerError::Media(_) => ErrorKind::Assembly,
            WorkerError::Model(_) | WorkerError::Input(_) | WorkerError::Csv(_) => {
                ErrorKind::InvalidInput
            }
            WorkerError::ConfigError(_) | WorkerError::Io(_) | WorkerError::Json(_) => {
                ErrorKind::InvalidInput
            }
        }
    }
}
