//! Upload error types and failure classification.

use thiserror::Error;

use crate::config::DEFAULT_RETRIABLE_STATUSES;

pub use vpub_models::ErrorKind;

/// Result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while talking to the hosting service.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error {status} during {operation}: {body}")]
    Service {
        status: u16,
        operation: String,
        body: String,
    },

    #[error("No longer attempting to retry after {retries} retries, last error: {last_error}")]
    RetryBudgetExhausted { retries: u32, last_error: String },

    #[error("The upload failed with an unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid upload input: {0}")]
    InvalidInput(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Upload session already ended in failure ({0})")]
    SessionTerminated(ErrorKind),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn unexpected_response(msg: impl Into<String>) -> Self {
        Self::UnexpectedResponse(msg.into())
    }

    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_http_status(status: u16, operation: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Service {
            status,
            operation: operation.into(),
            body: body.into(),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            UploadError::Service { status, .. } => Some(*status),
            UploadError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Classify the error against an explicit set of retriable statuses.
    pub fn kind_with(&self, retriable_statuses: &[u16]) -> ErrorKind {
        match self {
            UploadError::Network(e) if e.is_builder() => ErrorKind::InvalidInput,
            UploadError::Network(_) | UploadError::Connection(_) => ErrorKind::RetriableTransport,
            UploadError::Service { status, .. } if retriable_statuses.contains(status) => {
                ErrorKind::RetriableService
            }
            UploadError::Service { .. } => ErrorKind::FatalService,
            UploadError::RetryBudgetExhausted { .. } => ErrorKind::RetryBudgetExhausted,
            UploadError::UnexpectedResponse(_) | UploadError::Json(_) => {
                ErrorKind::UnexpectedResponse
            }
            UploadError::Auth(_) => ErrorKind::Auth,
            UploadError::InvalidInput(_) | UploadError::Io(_) => ErrorKind::InvalidInput,
            UploadError::Cancelled => ErrorKind::Cancelled,
            UploadError::SessionTerminated(_) => ErrorKind::SessionTerminated,
        }
    }

    /// Classify the error using the default retriable statuses (500, 502, 503, 504).
    pub fn kind(&self) -> ErrorKind {
        self.kind_with(&DEFAULT_RETRIABLE_STATUSES)
    }

    /// Check if error is retryable with the default classification.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retriable()
    }
}
