//! Throttled batch publisher.
//!
//! This crate provides:
//! - Job loading from CSV
//! - The sequential, throttled batch dispatcher
//! - Per-job structured logging
//! - The `vpub` command-line entry point

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod source;

pub use config::BatchConfig;
pub use dispatcher::BatchDispatcher;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use source::{CsvJobSource, JobDefaults, JobSource};
