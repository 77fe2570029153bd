//! Video job definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

use crate::error::ModelError;
use crate::metadata::VideoMetadata;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visibility of the published video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Private,
    Unlisted,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
            Privacy::Unlisted => "unlisted",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Privacy::Public),
            "private" => Ok(Privacy::Private),
            "unlisted" => Ok(Privacy::Unlisted),
            _ => Err(ModelError::InvalidPrivacy(s.to_string())),
        }
    }
}

/// One row of input describing a single video to assemble and publish.
///
/// Jobs are immutable once read and are consumed exactly once by the
/// dispatcher. Each job maps to exactly one hosted video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// 1-based position of the job in its source (data rows only)
    pub row: usize,

    /// Video title
    pub title: String,

    /// Video description, passed through as-is
    pub description_html: String,

    /// Tags in source order
    #[serde(default)]
    pub tags: Vec<String>,

    /// Hosting-service category id
    pub category: String,

    /// Slideshow frames, ordered by source column name
    pub image_urls: Vec<Url>,

    /// Visibility of the published video
    #[serde(default)]
    pub privacy: Privacy,
}

impl Job {
    /// Build the upload metadata for this job.
    pub fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            title: self.title.clone(),
            description: self.description_html.clone(),
            tags: self.tags.clone(),
            category_id: self.category.clone(),
            privacy: self.privacy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_parse() {
        assert_eq!("public".parse::<Privacy>().unwrap(), Privacy::Public);
        assert_eq!(" Unlisted ".parse::<Privacy>().unwrap(), Privacy::Unlisted);
        assert_eq!("PRIVATE".parse::<Privacy>().unwrap(), Privacy::Private);
        assert!("friends".parse::<Privacy>().is_err());
    }

    #[test]
    fn test_privacy_serde() {
        let json = serde_json::to_string(&Privacy::Unlisted).unwrap();
        assert_eq!(json, "\"unlisted\"");
    }

    #[test]
    fn test_job_metadata() {
        let job = Job {
            id: JobId::new(),
            row: 1,
            title: "Spring sale".to_string(),
            description_html: "<p>Deals</p>".to_string(),
            tags: vec!["sale".to_string(), "spring".to_string()],
            category: "22".to_string(),
            image_urls: vec![Url::parse("https://example.com/a.png").unwrap()],
            privacy: Privacy::Private,
        };

        let metadata = job.metadata();
        assert_eq!(metadata.title, "Spring sale");
        assert_eq!(metadata.description, "<p>Deals</p>");
        assert_eq!(metadata.tags.len(), 2);
        assert_eq!(metadata.category_id, "22");
        assert_eq!(metadata.privacy, Privacy::Private);
    }
}
