//! REST transport for the video hosting service.
//!
//! Implements the resumable upload protocol:
//! - `POST .../videos?uploadType=resumable` opens a session and returns its
//!   URL in the `Location` header
//! - `PUT <session>` with `Content-Range: bytes a-b/total` sends a chunk;
//!   `308` means incomplete with progress in `Range: bytes=0-N`, `200`/`201`
//!   means finished with the resource in the body
//! - `PUT <session>` with `Content-Range: bytes */total` queries progress

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{redirect, Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};
use vpub_models::VideoMetadata;

use crate::config::UploadConfig;
use crate::credentials::CredentialProvider;
use crate::error::{UploadError, UploadResult};
use crate::transport::{ChunkStatus, SessionHandle, UploadTransport};

/// Build the HTTP client shared by the transport and token refresh.
///
/// Redirects are disabled: `308` is a protocol reply here, not a redirect.
pub fn build_http_client(config: &UploadConfig) -> UploadResult<Client> {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .redirect(redirect::Policy::none())
        .user_agent(concat!("vpub-upload/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(UploadError::Network)
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Serialize)]
struct VideoResource<'a> {
    snippet: Snippet<'a>,
    status: Status<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    tags: &'a [String],
    category_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status<'a> {
    privacy_status: &'a str,
}

impl<'a> VideoResource<'a> {
    fn from_metadata(metadata: &'a VideoMetadata) -> Self {
        Self {
            snippet: Snippet {
                title: &metadata.title,
                description: &metadata.description,
                tags: &metadata.tags,
                category_id: &metadata.category_id,
            },
            status: Status {
                privacy_status: metadata.privacy.as_str(),
            },
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// [`UploadTransport`] over HTTPS.
pub struct YouTubeTransport {
    http: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl YouTubeTransport {
    pub fn new(config: &UploadConfig, credentials: Arc<dyn CredentialProvider>) -> UploadResult<Self> {
        let http = build_http_client(config)?;
        Ok(Self::with_client(http, config.base_url.clone(), credentials))
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn videos_url(&self) -> String {
        format!(
            "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
            self.base_url
        )
    }

    fn thumbnails_url(&self, remote_id: &str) -> String {
        format!(
            "{}/upload/youtube/v3/thumbnails/set?videoId={}",
            self.base_url,
            urlencoding::encode(remote_id)
        )
    }

    /// Send with a bearer token, refreshing once if the token is rejected.
    async fn send_authorized<F>(&self, operation: &str, build: F) -> UploadResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.credentials.access_token().await?;
        let response = build(&self.http).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(operation = %operation, "Access token rejected, refreshing");
        self.credentials.invalidate().await;
        let token = self.credentials.access_token().await?;
        let response = build(&self.http).bearer_auth(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::auth_error(format!(
                "{} rejected refreshed token: {}",
                operation, body
            )));
        }
        Ok(response)
    }

    async fn error_from(operation: &str, response: Response) -> UploadError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!(operation = %operation, status = status, "Service returned an error");
        UploadError::from_http_status(status, operation, body)
    }

    /// Interpret the reply to a chunk send or progress query.
    async fn progress_from(operation: &str, response: Response) -> UploadResult<ChunkStatus> {
        match response.status().as_u16() {
            308 => {
                let range = response
                    .headers()
                    .get(RANGE)
                    .map(|value| {
                        value.to_str().map_err(|_| {
                            UploadError::unexpected_response("Range header is not ASCII")
                        })
                    })
                    .transpose()?;
                Ok(ChunkStatus::Incomplete {
                    acknowledged: parse_range_header(range)?,
                })
            }
            200 | 201 => {
                let body = response.text().await?;
                let remote_id = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from));
                Ok(ChunkStatus::Complete { remote_id, body })
            }
            _ => Err(Self::error_from(operation, response).await),
        }
    }
}

/// Bytes held by the service according to a `Range: bytes=0-N` header.
///
/// A missing header means nothing has been received yet.
pub fn parse_range_header(value: Option<&str>) -> UploadResult<u64> {
    let Some(value) = value else {
        return Ok(0);
    };

    let last = value
        .trim()
        .strip_prefix("bytes=")
        .and_then(|range| range.split_once('-'))
        .filter(|(first, _)| first.trim() == "0")
        .and_then(|(_, last)| last.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            UploadError::unexpected_response(format!("malformed Range header: {}", value))
        })?;

    Ok(last + 1)
}

#[async_trait]
impl UploadTransport for YouTubeTransport {
    async fn start_session(
        &self,
        metadata: &VideoMetadata,
        total_bytes: u64,
        content_type: &str,
    ) -> UploadResult<SessionHandle> {
        let url = self.videos_url();
        let body = VideoResource::from_metadata(metadata);

        let response = self
            .send_authorized("start_session", |http| {
                http.post(&url)
                    .header("X-Upload-Content-Length", total_bytes)
                    .header("X-Upload-Content-Type", content_type)
                    .json(&body)
            })
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from("start_session", response).await);
        }

        let upload_url = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                UploadError::unexpected_response("upload session created without a Location header")
            })?;

        debug!(title = %metadata.title, total_bytes, "Opened resumable upload session");
        Ok(SessionHandle { upload_url })
    }

    async fn send_chunk(
        &self,
        session: &SessionHandle,
        offset: u64,
        chunk: Vec<u8>,
        total_bytes: u64,
    ) -> UploadResult<ChunkStatus> {
        if chunk.is_empty() {
            return Err(UploadError::invalid_input("chunk is empty"));
        }

        let last = offset + chunk.len() as u64 - 1;
        let content_range = format!("bytes {}-{}/{}", offset, last, total_bytes);

        let response = self
            .send_authorized("send_chunk", |http| {
                http.put(&session.upload_url)
                    .header(CONTENT_RANGE, &content_range)
                    .body(chunk.clone())
            })
            .await?;

        Self::progress_from("send_chunk", response).await
    }

    async fn query_progress(
        &self,
        session: &SessionHandle,
        total_bytes: u64,
    ) -> UploadResult<ChunkStatus> {
        let content_range = format!("bytes */{}", total_bytes);

        let response = self
            .send_authorized("query_progress", |http| {
                http.put(&session.upload_url)
                    .header(CONTENT_RANGE, &content_range)
                    .header(CONTENT_LENGTH, 0)
            })
            .await?;

        Self::progress_from("query_progress", response).await
    }

    async fn send_thumbnail(
        &self,
        remote_id: &str,
        image: Vec<u8>,
        content_type: &str,
    ) -> UploadResult<()> {
        let url = self.thumbnails_url(remote_id);

        let response = self
            .send_authorized("send_thumbnail", |http| {
                http.post(&url)
                    .header(CONTENT_TYPE, content_type)
                    .body(image.clone())
            })
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from("send_thumbnail", response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::error::ErrorKind;
    use crate::session::ResumableUploadSession;
    use crate::testing::{RecordingSleeper, StaticCredentials};
    use tempfile::TempDir;
    use vpub_models::Privacy;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            title: "Harbour at dusk".to_string(),
            description: "<p>Slides</p>".to_string(),
            tags: vec!["boats".to_string(), "sunset".to_string()],
            category_id: "22".to_string(),
            privacy: Privacy::Public,
        }
    }

    fn transport(server: &MockServer, credentials: Arc<StaticCredentials>) -> YouTubeTransport {
        let http = build_http_client(&UploadConfig::default()).unwrap();
        YouTubeTransport::with_client(http, server.uri(), credentials)
    }

    fn session_handle(server: &MockServer) -> SessionHandle {
        SessionHandle {
            upload_url: format!("{}/upload/session/abc", server.uri()),
        }
    }

    #[test]
    fn test_parse_range_header() {
        assert_eq!(parse_range_header(None).unwrap(), 0);
        assert_eq!(parse_range_header(Some("bytes=0-262143")).unwrap(), 262144);
        assert_eq!(parse_range_header(Some("bytes=0-0")).unwrap(), 1);
        assert!(parse_range_header(Some("bytes=5-10")).is_err());
        assert!(parse_range_header(Some("garbage")).is_err());
    }

    #[test]
    fn test_video_resource_body() {
        let metadata = metadata();
        let body = serde_json::to_value(VideoResource::from_metadata(&metadata)).unwrap();
        assert_eq!(body["snippet"]["categoryId"], "22");
        assert_eq!(body["snippet"]["tags"][1], "sunset");
        assert_eq!(body["status"]["privacyStatus"], "public");

        let mut untagged = metadata.clone();
        untagged.tags.clear();
        let body = serde_json::to_value(VideoResource::from_metadata(&untagged)).unwrap();
        assert!(body["snippet"].get("tags").is_none());
    }

    #[tokio::test]
    async fn test_start_session_returns_location() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .and(query_param("uploadType", "resumable"))
            .and(query_param("part", "snippet,status"))
            .and(header("X-Upload-Content-Length", "1000"))
            .and(header("X-Upload-Content-Type", "video/mp4"))
            .and(header("authorization", "Bearer token-1"))
            .and(body_json(serde_json::json!({
                "snippet": {
                    "title": "Harbour at dusk",
                    "description": "<p>Slides</p>",
                    "tags": ["boats", "sunset"],
                    "categoryId": "22"
                },
                "status": { "privacyStatus": "public" }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Location", format!("{}/upload/session/abc", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server, Arc::new(StaticCredentials::new("token-1")));
        let handle = transport
            .start_session(&metadata(), 1000, "video/mp4")
            .await
            .unwrap();

        assert_eq!(handle, session_handle(&server));
    }

    #[tokio::test]
    async fn test_start_session_without_location_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = transport(&server, Arc::new(StaticCredentials::new("t")));
        let err = transport
            .start_session(&metadata(), 10, "video/mp4")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedResponse);
    }

    #[tokio::test]
    async fn test_chunk_incomplete_reads_range() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload/session/abc"))
            .and(header("Content-Range", "bytes 0-9/20"))
            .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-9"))
            .mount(&server)
            .await;

        let transport = transport(&server, Arc::new(StaticCredentials::new("t")));
        let status = transport
            .send_chunk(&session_handle(&server), 0, vec![0u8; 10], 20)
            .await
            .unwrap();
        assert_eq!(status, ChunkStatus::Incomplete { acknowledged: 10 });
    }

    #[tokio::test]
    async fn test_chunk_complete_parses_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("Content-Range", "bytes 10-19/20"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "dQw4w9WgXcQ", "kind": "youtube#video" })),
            )
            .mount(&server)
            .await;

        let transport = transport(&server, Arc::new(StaticCredentials::new("t")));
        let status = transport
            .send_chunk(&session_handle(&server), 10, vec![0u8; 10], 20)
            .await
            .unwrap();

        match status {
            ChunkStatus::Complete { remote_id, .. } => {
                assert_eq!(remote_id.as_deref(), Some("dQw4w9WgXcQ"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chunk_service_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
            .mount(&server)
            .await;

        let transport = transport(&server, Arc::new(StaticCredentials::new("t")));
        let err = transport
            .send_chunk(&session_handle(&server), 0, vec![1u8; 4], 4)
            .await
            .unwrap_err();

        assert_eq!(err.http_status(), Some(503));
        assert_eq!(err.kind(), ErrorKind::RetriableService);
    }

    #[tokio::test]
    async fn test_query_progress_without_range_is_zero() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("Content-Range", "bytes */20"))
            .respond_with(ResponseTemplate::new(308))
            .mount(&server)
            .await;

        let transport = transport(&server, Arc::new(StaticCredentials::new("t")));
        let status = transport
            .query_progress(&session_handle(&server), 20)
            .await
            .unwrap();
        assert_eq!(status, ChunkStatus::Incomplete { acknowledged: 0 });
    }

    #[tokio::test]
    async fn test_rejected_token_is_refreshed_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/thumbnails/set"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/thumbnails/set"))
            .and(query_param("videoId", "abc"))
            .and(header("Content-Type", "image/jpeg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let credentials = Arc::new(StaticCredentials::new("t"));
        let transport = transport(&server, credentials.clone());
        transport
            .send_thumbnail("abc", vec![0xff, 0xd8], "image/jpeg")
            .await
            .unwrap();

        assert_eq!(credentials.invalidations(), 1);
    }

    #[tokio::test]
    async fn test_session_runs_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Location", format!("{}/upload/session/abc", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload/session/abc"))
            .and(header("Content-Range", "bytes 0-262143/300000"))
            .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-262143"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload/session/abc"))
            .and(header("Content-Range", "bytes 262144-299999/300000"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "v1" })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("output.mp4");
        std::fs::write(&file, vec![7u8; 300_000]).unwrap();

        let transport = transport(&server, Arc::new(StaticCredentials::new("t")));
        let sleeper = RecordingSleeper::new();
        let config = UploadConfig::default()
            .with_chunk_size(256 * 1024)
            .with_backoff(BackoffPolicy::immediate());

        let mut session = ResumableUploadSession::new(&transport, &sleeper, &config, &file, metadata());
        assert_eq!(session.run().await.unwrap(), "v1");
        assert_eq!(session.bytes_acknowledged(), 300_000);
    }
}
