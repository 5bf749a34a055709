use crate::client::Client;
use crate::error::{ApiError, ApiResult, ErrorBody};
use crate::models::video::{ChunkResponse, ContentRange, ResumableUploadRequest, VideoCreated};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, LOCATION};
use tracing::{debug, trace};
use url::Url;

/// Resumable upload endpoints
#[async_trait]
pub trait VideosApi {
    /// Open a resumable upload session and return the absolute chunk endpoint
    async fn init_resumable_upload(
        &self,
        token: &str,
        request: &ResumableUploadRequest,
        content_length: u64,
        content_type: &str,
    ) -> ApiResult<String>;

    /// Send one chunk to the session endpoint
    async fn upload_chunk(
        &self,
        token: &str,
        location: &str,
        range: ContentRange,
        data: Bytes,
    ) -> ApiResult<ChunkResponse>;
}

/// Turn the `Location` header of an init response into an absolute URL.
///
/// Scheme-relative locations (`//host/path`) inherit the scheme of `base_url`.
pub fn resolve_upload_location(base_url: &str, location: &str) -> ApiResult<String> {
    if location.starts_with("//") {
        let scheme = Url::parse(base_url)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "http".to_string());
        let resolved = format!("{}:{}", scheme, location);
        Url::parse(&resolved).map_err(|_| ApiError::InvalidLocation(location.to_string()))?;
        return Ok(resolved);
    }

    match Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            Ok(location.to_string())
        }
        _ => Err(ApiError::InvalidLocation(location.to_string())),
    }
}

#[async_trait]
impl VideosApi for Client {
    async fn init_resumable_upload(
        &self,
        token: &str,
        request: &ResumableUploadRequest,
        content_length: u64,
        content_type: &str,
    ) -> ApiResult<String> {
        let url = self.build_url("/videos/upload-resumable");

        let response = self
            .http_client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header("X-Upload-Content-Length", content_length)
            .header("X-Upload-Content-Type", content_type)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::InitRejected {
                status: status.as_u16(),
                message: ErrorBody::message_from(&body),
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let resolved = resolve_upload_location(&self.config.base_url, &location)?;
        debug!(
            target: "uploader",
            filename = %request.filename,
            location = %resolved,
            "Upload session opened"
        );
        Ok(resolved)
    }

    async fn upload_chunk(
        &self,
        token: &str,
        location: &str,
        range: ContentRange,
        data: Bytes,
    ) -> ApiResult<ChunkResponse> {
        trace!(
            target: "uploader::chunk",
            range = %range,
            "Sending chunk"
        );

        let response = self
            .http_client
            .put(location)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_LENGTH, data.len())
            .header(CONTENT_RANGE, range.to_string())
            .body(data)
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            308 => Ok(ChunkResponse::Continue),
            200 => {
                let body = response.text().await?;
                let created: VideoCreated =
                    serde_json::from_str(&body).map_err(|e| ApiError::parse("upload", e))?;
                Ok(ChunkResponse::Complete(created))
            }
            other => {
                let body = response.text().await.unwrap_or_default();
                Ok(ChunkResponse::Rejected {
                    status: other,
                    message: ErrorBody::message_from(&body),
                })
            }
        }
    }
}
