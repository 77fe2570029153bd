//! Model error types.

use thiserror::Error;

/// Result type for model construction and validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while building or validating models.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid privacy status: {0} (expected public, private or unlisted)")]
    InvalidPrivacy(String),

    #[error("{0} is an invalid throttle value (valid range is 1 to 30 videos per hour)")]
    ThrottleOutOfRange(u32),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}
