//! Injectable wait primitive.
//!
//! Retry backoff and inter-job throttling both wait through a [`Sleeper`]
//! so tests can observe the requested delays without real time passing.

use std::time::Duration;

use async_trait::async_trait;

/// Suspends the caller for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
