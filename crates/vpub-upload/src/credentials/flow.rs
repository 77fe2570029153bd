//! Interactive console authorization.
//!
//! Prints an authorization URL, reads the code the user pastes back and
//! exchanges it for a refresh token.

use std::path::Path;

use reqwest::Client;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use super::store::StoredCredentials;
use super::token_cache::post_token_form;
use crate::error::{UploadError, UploadResult};

/// Redirect target for out-of-band (copy and paste) codes.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client registration from a client secrets file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a client secrets document (`installed` or `web` section).
    pub fn from_json(raw: &str) -> UploadResult<Self> {
        let file: ClientSecretsFile = serde_json::from_str(raw)
            .map_err(|e| UploadError::auth_error(format!("invalid client secrets: {}", e)))?;

        file.installed.or(file.web).ok_or_else(|| {
            UploadError::auth_error("client secrets have neither an installed nor a web section")
        })
    }
}

/// Installed-application authorization flow.
pub struct InstalledAppFlow {
    http: Client,
    secrets: ClientSecrets,
    scopes: Vec<String>,
}

impl InstalledAppFlow {
    pub fn new(http: Client, secrets: ClientSecrets, scopes: Vec<String>) -> Self {
        Self {
            http,
            secrets,
            scopes,
        }
    }

    pub async fn from_client_secrets_file(
        http: Client,
        path: impl AsRef<Path>,
        scopes: Vec<String>,
    ) -> UploadResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            UploadError::auth_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(Self::new(http, ClientSecrets::from_json(&raw)?, scopes))
    }

    pub fn redirect_uri(&self) -> &str {
        self.secrets
            .redirect_uris
            .iter()
            .find(|uri| uri.as_str() == OOB_REDIRECT_URI)
            .map(String::as_str)
            .unwrap_or(OOB_REDIRECT_URI)
    }

    /// URL the user opens to grant access.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline&prompt=consent",
            self.secrets.auth_uri,
            urlencoding::encode(&self.secrets.client_id),
            urlencoding::encode(self.redirect_uri()),
            urlencoding::encode(&self.scopes.join(" ")),
        )
    }

    /// Exchange an authorization code for long-lived credentials.
    pub async fn exchange_code(&self, code: &str) -> UploadResult<StoredCredentials> {
        let code = code.trim();
        if code.is_empty() {
            return Err(UploadError::auth_error("authorization code is empty"));
        }

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri()),
        ];

        let token = post_token_form(&self.http, &self.secrets.token_uri, &form).await?;
        let refresh_token = token.refresh_token.ok_or_else(|| {
            UploadError::auth_error("token endpoint did not return a refresh token")
        })?;

        Ok(StoredCredentials {
            refresh_token,
            token_uri: self.secrets.token_uri.clone(),
            client_id: self.secrets.client_id.clone(),
            client_secret: self.secrets.client_secret.clone(),
            scopes: self.scopes.clone(),
        })
    }

    /// Prompt on the terminal and complete the flow.
    pub async fn run_console(&self) -> UploadResult<StoredCredentials> {
        let mut stderr = tokio::io::stderr();
        let prompt = format!(
            "Please visit this URL to authorize this application:\n{}\n\nEnter the authorization code: ",
            self.authorization_url()
        );
        stderr.write_all(prompt.as_bytes()).await?;
        stderr.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

        let credentials = self.exchange_code(&line).await?;
        info!("Authorization complete");
        Ok(credentials)
    }
}
