//! Media assembly for video jobs.
//!
//! This crate provides:
//! - The [`MediaAssembler`] capability used by the batch dispatcher
//! - Slideshow rendering: image fetch, JPEG thumbnail, FFmpeg encode
//! - Type-safe FFmpeg command building with timeout and cancellation
//! - Per-job scratch directories removed on drop

pub mod assembler;
pub mod command;
pub mod error;
pub mod workspace;

pub use assembler::{AssembledMedia, AssemblerConfig, MediaAssembler, SlideshowAssembler};
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use workspace::JobWorkspace;
