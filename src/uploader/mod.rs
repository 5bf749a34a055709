//! Resumable chunked uploads
//!
//! One call to [`Uploader::upload`] opens a session with the platform, then
//! sends the file front to back in fixed-size chunks. A chunk that fails is
//! resent unchanged after a fixed delay; the reader never advances past a
//! chunk the server has not acknowledged.

mod chunk;
mod error;
mod session;

pub use chunk::{Chunk, ChunkReader, DEFAULT_CHUNK_SIZE};
pub use error::UploadError;
pub use session::UploadSession;

use crate::config::{ApiConfig, ProcessConfig};
use crate::models::UploadResult;
use chrono::{DateTime, SecondsFormat, Utc};
use peertube_api::api::VideosApi;
use peertube_api::models::video::{ChunkResponse, ResumableUploadRequest, VideoCreated};
use peertube_api::{ApiError, Client, CredentialStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the uploader
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub chunk_size: usize,
    /// Chunk retries allowed for one file
    pub max_retries: u32,
    /// Wait before resending a failed chunk
    pub retry_delay: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 10,
            retry_delay: Duration::from_secs(15),
        }
    }
}

impl From<&ProcessConfig> for UploaderConfig {
    fn from(process: &ProcessConfig) -> Self {
        Self {
            chunk_size: process.chunk_size,
            max_retries: process.max_retries,
            retry_delay: process.retry_delay(),
        }
    }
}

/// Channel and visibility settings applied to every video
#[derive(Debug, Clone)]
pub struct VideoDefaults {
    pub channel_id: i64,
    pub privacy: i32,
    pub comments_policy: i32,
    pub download_enabled: bool,
    pub category: Option<i32>,
    pub language: Option<String>,
    pub wait_transcoding: bool,
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for VideoDefaults {
    fn from(api: &ApiConfig) -> Self {
        Self {
            channel_id: api.channel_id,
            privacy: api.privacy,
            comments_policy: api.comments_policy,
            download_enabled: api.download_enabled,
            category: api.category,
            language: api.language.clone(),
            wait_transcoding: api.wait_transcoding,
        }
    }
}

/// Parameters for one upload
#[derive(Debug, Clone)]
pub struct UploadParams {
    /// File actually sent; may be a transcoded copy
    pub file_path: PathBuf,
    /// Name reported to the platform
    pub filename: String,
    pub content_type: String,
    pub name: String,
    pub description: Option<String>,
    pub originally_published_at: Option<DateTime<Utc>>,
}

impl UploadParams {
    fn to_request(&self, defaults: &VideoDefaults) -> ResumableUploadRequest {
        ResumableUploadRequest {
            channel_id: defaults.channel_id,
            filename: self.filename.clone(),
            name: self.name.clone(),
            description: self.description.clone().filter(|d| !d.is_empty()),
            comments_policy: defaults.comments_policy,
            category: defaults.category,
            language: defaults.language.clone(),
            download_enabled: defaults.download_enabled,
            privacy: defaults.privacy,
            wait_transcoding: defaults.wait_transcoding,
            originally_published_at: self
                .originally_published_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// Drives the resumable upload protocol
pub struct Uploader {
    client: Arc<Client>,
    credentials: Arc<CredentialStore>,
    defaults: VideoDefaults,
    config: UploaderConfig,
}

impl Uploader {
    pub fn new(
        client: Arc<Client>,
        credentials: Arc<CredentialStore>,
        defaults: VideoDefaults,
        config: UploaderConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            defaults,
            config,
        }
    }

    /// Upload one file and return the identifiers of the created video
    pub async fn upload(&self, params: &UploadParams) -> Result<UploadResult, UploadError> {
        let total_bytes = tokio::fs::metadata(&params.file_path)
            .await
            .map_err(|source| UploadError::FileRead {
                path: params.file_path.clone(),
                source,
            })?
            .len();

        info!(
            target: "uploader",
            file = %params.file_path.display(),
            name = %params.name,
            total_bytes,
            "Starting upload"
        );

        let mut session = self.open_session(params, total_bytes).await?;
        let mut reader = ChunkReader::open(&params.file_path, self.config.chunk_size)
            .await
            .map_err(|source| UploadError::FileRead {
                path: params.file_path.clone(),
                source,
            })?;

        loop {
            let chunk = reader
                .next_chunk()
                .await
                .map_err(|source| UploadError::FileRead {
                    path: params.file_path.clone(),
                    source,
                })?;

            if chunk.finished {
                return Err(UploadError::Incomplete {
                    sent: session.cursor(),
                    total: total_bytes,
                });
            }

            if let Some(created) = self.upload_chunk_with_retry(&mut session, &chunk).await? {
                let result = UploadResult::from(created);
                info!(
                    target: "uploader",
                    file = %params.file_path.display(),
                    video_id = result.remote_id,
                    uuid = %result.uuid,
                    "Upload completed"
                );
                return Ok(result);
            }
        }
    }

    async fn open_session(
        &self,
        params: &UploadParams,
        total_bytes: u64,
    ) -> Result<UploadSession, UploadError> {
        let token = self
            .credentials
            .current_access_token()
            .await
            .map_err(UploadError::Auth)?;
        let request = params.to_request(&self.defaults);

        let location = self
            .client
            .init_resumable_upload(&token, &request, total_bytes, &params.content_type)
            .await
            .map_err(|e| match e {
                ApiError::Auth { .. } => UploadError::Auth(e),
                ApiError::Parse { .. } => UploadError::Parse(e),
                _ => UploadError::Init(e),
            })?;

        Ok(UploadSession::new(
            location,
            total_bytes,
            self.config.max_retries,
        ))
    }

    /// Send one chunk until the server takes it or the retry budget runs out.
    ///
    /// Returns the created video when the server answers the chunk with 200.
    async fn upload_chunk_with_retry(
        &self,
        session: &mut UploadSession,
        chunk: &Chunk,
    ) -> Result<Option<VideoCreated>, UploadError> {
        let range = session.range_for(chunk.len());

        loop {
            // Re-read per attempt so a token refreshed by another worker is picked up
            let token = self
                .credentials
                .current_access_token()
                .await
                .map_err(UploadError::Auth)?;

            let last_error = match self
                .client
                .upload_chunk(&token, &session.upload_location, range, chunk.data.clone())
                .await
            {
                Ok(ChunkResponse::Continue) => {
                    session.acknowledge(chunk.len());
                    debug!(
                        target: "uploader::chunk",
                        range = %range,
                        "Chunk accepted"
                    );
                    return Ok(None);
                }
                Ok(ChunkResponse::Complete(created)) => {
                    session.acknowledge(chunk.len());
                    return Ok(Some(created));
                }
                Ok(ChunkResponse::Rejected { status, message }) => {
                    format!("HTTP {}: {}", status, message)
                }
                Err(e @ ApiError::Parse { .. }) => return Err(UploadError::Parse(e)),
                Err(e) => e.to_string(),
            };

            if !session.consume_retry() {
                return Err(UploadError::MaxRetriesExceeded {
                    offset: range.start,
                    attempts: session.max_retries(),
                    last_error,
                });
            }

            warn!(
                target: "uploader::chunk",
                range = %range,
                error = %last_error,
                retries_left = session.retries_left(),
                delay_ms = self.config.retry_delay.as_millis() as u64,
                "Chunk upload failed, retrying"
            );
            tokio::time::sleep(self.config.retry_delay).await;

            // A long upload can outlive the token; renew before the next attempt
            if let Err(e) = self.credentials.ensure_valid(Utc::now()).await {
                warn!(
                    target: "uploader::chunk",
                    error = %e,
                    "Credential renewal before retry failed"
                );
            }
        }
    }
}
