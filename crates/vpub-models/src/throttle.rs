//! Inter-job throttle schedule.
//!
//! Each video takes around two minutes of external processing, so the
//! throttle is the additional wait spread evenly over the batch.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Lowest accepted rate (videos per hour).
pub const MIN_VIDEOS_PER_HOUR: u32 = 1;

/// Highest accepted rate (videos per hour).
pub const MAX_VIDEOS_PER_HOUR: u32 = 30;

/// Window used at the maximum rate (seconds).
pub const FULL_RATE_WINDOW_SECS: u64 = 1200;

/// Throttle derived once per batch from the requested rate and batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ThrottleSchedule {
    videos_per_hour: u32,
    batch_size: usize,
}

impl ThrottleSchedule {
    /// Create a schedule, rejecting rates outside 1..=30.
    pub fn new(videos_per_hour: u32, batch_size: usize) -> ModelResult<Self> {
        if !(MIN_VIDEOS_PER_HOUR..=MAX_VIDEOS_PER_HOUR).contains(&videos_per_hour) {
            return Err(ModelError::ThrottleOutOfRange(videos_per_hour));
        }

        Ok(Self {
            videos_per_hour,
            batch_size,
        })
    }

    pub fn videos_per_hour(&self) -> u32 {
        self.videos_per_hour
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Total wait budget for the whole batch in seconds.
    pub fn total_window_secs(&self) -> u64 {
        if self.videos_per_hour < MAX_VIDEOS_PER_HOUR {
            (60 - 2 * self.videos_per_hour as u64) * 60
        } else {
            FULL_RATE_WINDOW_SECS
        }
    }

    /// Wait after each job in whole seconds (integer division).
    pub fn per_video_delay_secs(&self) -> u64 {
        if self.batch_size == 0 {
            return 0;
        }
        self.total_window_secs() / self.batch_size as u64
    }

    pub fn per_video_delay(&self) -> Duration {
        Duration::from_secs(self.per_video_delay_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rate_window() {
        let schedule = ThrottleSchedule::new(30, 3).unwrap();
        assert_eq!(schedule.total_window_secs(), 1200);
        assert_eq!(schedule.per_video_delay_secs(), 400);
    }

    #[test]
    fn test_twenty_per_hour_matches_full_rate() {
        let schedule = ThrottleSchedule::new(20, 4).unwrap();
        assert_eq!(schedule.total_window_secs(), 1200);
        assert_eq!(schedule.per_video_delay_secs(), 300);
    }

    #[test]
    fn test_one_per_hour() {
        let schedule = ThrottleSchedule::new(1, 3).unwrap();
        assert_eq!(schedule.total_window_secs(), 3480);
        assert_eq!(schedule.per_video_delay_secs(), 1160);
        assert_eq!(schedule.per_video_delay(), Duration::from_secs(1160));
    }

    #[test]
    fn test_delay_truncates() {
        let schedule = ThrottleSchedule::new(30, 7).unwrap();
        assert_eq!(schedule.per_video_delay_secs(), 171);
    }

    #[test]
    fn test_empty_batch_has_no_delay() {
        let schedule = ThrottleSchedule::new(10, 0).unwrap();
        assert_eq!(schedule.per_video_delay_secs(), 0);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert_eq!(
            ThrottleSchedule::new(0, 1),
            Err(ModelError::ThrottleOutOfRange(0))
        );
        assert_eq!(
            ThrottleSchedule::new(31, 1),
            Err(ModelError::ThrottleOutOfRange(31))
        );
    }
}
