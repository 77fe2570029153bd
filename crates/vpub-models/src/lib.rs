//! Shared data models for the vpub batch publisher.
//!
//! This crate provides Serde-serializable types for:
//! - Video jobs read from the input table
//! - Upload metadata sent to the hosting service
//! - Per-job outcomes and the aggregate batch report
//! - Throttle schedule derivation

pub mod error;
pub mod job;
pub mod metadata;
pub mod outcome;
pub mod throttle;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, Privacy};
pub use metadata::VideoMetadata;
pub use outcome::{BatchReport, ErrorKind, JobOutcome, OutcomeStatus};
pub use throttle::ThrottleSchedule;
