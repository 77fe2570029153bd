//! Credential acquisition for the hosting service.
//!
//! - [`store`]: persisted refresh-token file, including legacy migration
//! - [`token_cache`]: access-token refresh with expiry tracking
//! - [`flow`]: interactive console authorization when nothing is stored

pub mod flow;
pub mod store;
pub mod token_cache;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::config::CredentialConfig;
use crate::error::UploadResult;

pub use flow::{ClientSecrets, InstalledAppFlow};
pub use store::{CredentialStore, StoredCredentials};
pub use token_cache::RefreshTokenProvider;

/// Supplies bearer tokens for authenticated requests.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Get a usable access token, refreshing if necessary.
    async fn access_token(&self) -> UploadResult<String>;

    /// Drop any cached token so the next call refreshes.
    async fn invalidate(&self);
}

/// Load stored credentials (or run the console flow) and prove they work.
///
/// Any error here means no job can be uploaded, so callers should abort
/// before the batch starts.
pub async fn establish_credentials(
    http: Client,
    config: &CredentialConfig,
) -> UploadResult<Arc<RefreshTokenProvider>> {
    let store = CredentialStore::from_config(config);

    let credentials = match store.load().await? {
        Some(credentials) => credentials,
        None => {
            info!(
                path = %store.path().display(),
                "No stored credentials, starting interactive authorization"
            );
            let flow = InstalledAppFlow::from_client_secrets_file(
                http.clone(),
                &config.client_secrets_path,
                config.scopes.clone(),
            )
            .await?;
            let credentials = flow.run_console().await?;
            store.save(&credentials).await?;
            credentials
        }
    };

    let provider = Arc::new(RefreshTokenProvider::new(http, credentials));
    provider.access_token().await?;
    info!("Credentials established");
    Ok(provider)
}
