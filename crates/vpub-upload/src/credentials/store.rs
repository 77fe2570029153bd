//! Persisted credential file.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CredentialConfig;
use crate::error::{UploadError, UploadResult};

/// Long-lived credential state written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub refresh_token: String,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Reads and writes [`StoredCredentials`] at a fixed path.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    scopes: Vec<String>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, scopes: Vec<String>) -> Self {
        Self {
            path: path.into(),
            scopes,
        }
    }

    pub fn from_config(config: &CredentialConfig) -> Self {
        Self::new(config.credentials_path.clone(), config.scopes.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load credentials, migrating the legacy format in place.
    ///
    /// Returns `Ok(None)` when no file exists. A file carrying a short-lived
    /// `access_token` is rewritten without it and with the current scopes.
    pub async fn load(&self) -> UploadResult<Option<StoredCredentials>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            UploadError::auth_error(format!("{} is not valid JSON: {}", self.path.display(), e))
        })?;

        let migrated = match value.as_object_mut() {
            Some(object) => {
                if object.remove("access_token").is_some() {
                    object.insert("scopes".to_string(), serde_json::json!(self.scopes));
                    true
                } else {
                    false
                }
            }
            None => {
                return Err(UploadError::auth_error(format!(
                    "{} is not a JSON object",
                    self.path.display()
                )))
            }
        };

        if migrated {
            self.write(&value).await?;
            info!(path = %self.path.display(), "Migrated legacy credential file");
        }

        let mut credentials: StoredCredentials = serde_json::from_value(value).map_err(|e| {
            UploadError::auth_error(format!(
                "{} is missing credential fields: {}",
                self.path.display(),
                e
            ))
        })?;

        if credentials.scopes.is_empty() {
            credentials.scopes = self.scopes.clone();
        }

        debug!(path = %self.path.display(), "Loaded stored credentials");
        Ok(Some(credentials))
    }

    /// Persist credentials, replacing any existing file.
    pub async fn save(&self, credentials: &StoredCredentials) -> UploadResult<()> {
        let value = serde_json::to_value(credentials)?;
        self.write(&value).await?;
        info!(path = %self.path.display(), "Saved credentials");
        Ok(())
    }

    async fn write(&self, value: &serde_json::Value) -> UploadResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(&self.path, serde_json::to_vec_pretty(value)?).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }
}
