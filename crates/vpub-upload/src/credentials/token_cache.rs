//! Access-token cache backed by a stored refresh token.
//!
//! - Refresh margin so a token never expires mid-request
//! - Single-flight refresh under the write lock
//! - Falls back to the current token if a refresh fails while it is still usable

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::store::StoredCredentials;
use super::CredentialProvider;
use crate::error::{UploadError, UploadResult};

// =============================================================================
// Constants
// =============================================================================

/// Refresh 60 seconds before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// TTL assumed when the token endpoint omits `expires_in` (50 minutes).
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

// =============================================================================
// Token endpoint
// =============================================================================

/// Successful token endpoint reply.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// POST a form to the token endpoint.
///
/// 5xx replies surface as [`UploadError::Service`] so callers can retry them;
/// anything else unsuccessful is an authentication failure.
pub(crate) async fn post_token_form(
    http: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> UploadResult<TokenResponse> {
    let response = http.post(token_uri).form(form).send().await?;
    let status = response.status();

    if status.is_success() {
        return Ok(response.json::<TokenResponse>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        return Err(UploadError::from_http_status(
            status.as_u16(),
            "token_refresh",
            body,
        ));
    }

    let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("{}: {}", err.error, description),
            None => err.error,
        },
        Err(_) => body,
    };

    Err(UploadError::auth_error(format!(
        "token endpoint returned {}: {}",
        status.as_u16(),
        reason
    )))
}

// =============================================================================
// Token Cache
// =============================================================================

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Still valid with the refresh margin applied.
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    /// Technically usable even though a refresh is due.
    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// [`CredentialProvider`] that exchanges a refresh token for access tokens.
pub struct RefreshTokenProvider {
    http: Client,
    credentials: StoredCredentials,
    cache: RwLock<Option<CachedToken>>,
}

impl RefreshTokenProvider {
    pub fn new(http: Client, credentials: StoredCredentials) -> Self {
        Self {
            http,
            credentials,
            cache: RwLock::new(None),
        }
    }

    pub fn credentials(&self) -> &StoredCredentials {
        &self.credentials
    }

    async fn refresh_token(&self, cache: &mut Option<CachedToken>) -> UploadResult<String> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        match post_token_form(&self.http, &self.credentials.token_uri, &form).await {
            Ok(token) => {
                let ttl = token
                    .expires_in
                    .map(Duration::from_secs)
                    .unwrap_or(TOKEN_DEFAULT_TTL);

                *cache = Some(CachedToken {
                    access_token: token.access_token.clone(),
                    expires_at: Instant::now() + ttl,
                });

                debug!(ttl_secs = ttl.as_secs(), "Refreshed access token");
                Ok(token.access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref() {
                    if cached.is_usable() {
                        warn!("Token refresh failed, using existing token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for RefreshTokenProvider {
    async fn access_token(&self) -> UploadResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited
        if let Some(cached) = cache.as_ref() {
            if cached.is_valid() {
                return Ok(cached.access_token.clone());
            }
        }

        self.refresh_token(&mut cache).await
    }

    async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}

// =============================================================================
// Tests
// =============================================================================
