//! Batch configuration.

use std::path::PathBuf;

use vpub_media::AssemblerConfig;
use vpub_models::{Privacy, ThrottleSchedule};
use vpub_upload::{CredentialConfig, UploadConfig};

use crate::error::{WorkerError, WorkerResult};

/// Default videos-per-hour cap.
pub const DEFAULT_THROTTLE: u32 = 30;

/// Default hosting-service category ("People & Blogs").
pub const DEFAULT_CATEGORY: &str = "22";

/// Everything a batch run needs, built once before the first job.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Videos per hour (1-30)
    pub throttle: u32,
    /// Category applied to every job
    pub category: String,
    /// Privacy applied to every job
    pub privacy: Privacy,
    /// Parent of the per-job scratch directories
    pub work_dir: PathBuf,
    pub upload: UploadConfig,
    pub credentials: CredentialConfig,
    pub assembler: AssemblerConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE,
            category: DEFAULT_CATEGORY.to_string(),
            privacy: Privacy::Public,
            work_dir: std::env::temp_dir(),
            upload: UploadConfig::default(),
            credentials: CredentialConfig::default(),
            assembler: AssemblerConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let privacy = match std::env::var("VPUB_PRIVACY") {
            Ok(value) => value
                .parse()
                .map_err(|e| WorkerError::config_error(format!("VPUB_PRIVACY: {}", e)))?,
            Err(_) => defaults.privacy,
        };

        // Throttle comes from the command line only, see `with_throttle`
        let config = Self {
            throttle: defaults.throttle,
            category: std::env::var("VPUB_CATEGORY").unwrap_or(defaults.category),
            privacy,
            work_dir: std::env::var("VPUB_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            upload: UploadConfig::from_env(),
            credentials: CredentialConfig::from_env(),
            assembler: AssemblerConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Set the videos-per-hour cap.
    pub fn with_throttle(mut self, throttle: u32) -> WorkerResult<Self> {
        self.throttle = throttle;
        self.validate()?;
        Ok(self)
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn validate(&self) -> WorkerResult<()> {
        ThrottleSchedule::new(self.throttle, 1)?;

        if self.category.trim().is_empty() {
            return Err(WorkerError::config_error("category must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.throttle, 30);
        assert_eq!(config.category, "22");
        assert_eq!(config.privacy, Privacy::Public);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_throttle_range_enforced() {
        assert!(BatchConfig::default().with_throttle(0).is_err());
        assert!(BatchConfig::default().with_throttle(31).is_err());
        assert_eq!(BatchConfig::default().with_throttle(1).unwrap().throttle, 1);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("VPUB_PRIVACY", "unlisted");
        std::env::set_var("VPUB_CATEGORY", "27");
        std::env::set_var("VPUB_WORK_DIR", "/var/tmp/vpub");
        let config = BatchConfig::from_env();
        std::env::remove_var("VPUB_PRIVACY");
        std::env::remove_var("VPUB_CATEGORY");
        std::env::remove_var("VPUB_WORK_DIR");

        let config = config.unwrap();
        assert_eq!(config.privacy, Privacy::Unlisted);
        assert_eq!(config.category, "27");
        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/vpub"));
    }

    #[test]
    #[serial]
    fn test_throttle_not_read_from_env() {
        std::env::set_var("VPUB_THROTTLE", "50");
        let config = BatchConfig::from_env();
        std::env::remove_var("VPUB_THROTTLE");

        let config = config.unwrap();
        assert_eq!(config.throttle, DEFAULT_THROTTLE);
        assert_eq!(config.with_throttle(10).unwrap().throttle, 10);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_privacy() {
        std::env::set_var("VPUB_PRIVACY", "friends-only");
        let result = BatchConfig::from_env();
        std::env::remove_var("VPUB_PRIVACY");

        assert!(matches!(result, Err(WorkerError::ConfigError(_))));
    }
}
