//! Upload metadata for a hosted video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::job::Privacy;

/// Maximum title length accepted by the hosting service (characters).
pub const MAX_TITLE_CHARS: usize = 100;

/// Maximum description length accepted by the hosting service (bytes).
pub const MAX_DESCRIPTION_BYTES: usize = 5000;

/// Maximum combined tag length accepted by the hosting service (characters).
pub const MAX_TAGS_CHARS: usize = 500;

/// Metadata attached to a video when its upload session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub category_id: String,
    #[serde(default)]
    pub privacy: Privacy,
}

impl VideoMetadata {
    /// Validate the metadata against the service limits.
    pub fn validate(&self) -> ModelResult<()> {
        if self.title.trim().is_empty() {
            return Err(ModelError::InvalidMetadata("title is required".to_string()));
        }

        let title_chars = self.title.chars().count();
        if title_chars > MAX_TITLE_CHARS {
            return Err(ModelError::InvalidMetadata(format!(
                "title is {} characters, limit is {}",
                title_chars, MAX_TITLE_CHARS
            )));
        }

        if self.description.len() > MAX_DESCRIPTION_BYTES {
            return Err(ModelError::InvalidMetadata(format!(
                "description is {} bytes, limit is {}",
                self.description.len(),
                MAX_DESCRIPTION_BYTES
            )));
        }

        // Separating commas count towards the tag budget
        let tag_chars: usize = self.tags.iter().map(|t| t.chars().count()).sum::<usize>()
            + self.tags.len().saturating_sub(1);
        if tag_chars > MAX_TAGS_CHARS {
            return Err(ModelError::InvalidMetadata(format!(
                "tags total {} characters, limit is {}",
                tag_chars, MAX_TAGS_CHARS
            )));
        }

        if self.category_id.trim().is_empty() {
            return Err(ModelError::InvalidMetadata(
                "category id is required".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            title: "Weekly roundup".to_string(),
            description: "<b>Hello</b>".to_string(),
            tags: vec!["news".to_string()],
            category_id: "22".to_string(),
            privacy: Privacy::Public,
        }
    }

    #[test]
    fn test_valid_metadata() {
        assert!(metadata().validate().is_ok());
    }

    #[test]
    fn test_empty_title_rejected() {
        let mut m = metadata();
        m.title = "   ".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_long_title_rejected() {
        let mut m = metadata();
        m.title = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(m.validate().is_err());

        m.title = "x".repeat(MAX_TITLE_CHARS);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_tag_budget_counts_separators() {
        let mut m = metadata();
        m.tags = vec!["a".repeat(250), "b".repeat(249)];
        // 250 + 249 + 1 comma
        assert!(m.validate().is_ok());

        m.tags = vec!["a".repeat(250), "b".repeat(250)];
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_oversized_description_rejected() {
        let mut m = metadata();
        m.description = "d".repeat(MAX_DESCRIPTION_BYTES + 1);
        assert!(m.validate().is_err());
    }
}
