//! Work done for one media item

use crate::media::{
    MediaError, MediaKind, MediaProber, TempFile, Transcoder, content_type_for, temp_mp3_path,
};
use crate::models::{SourceRecord, UploadResult};
use crate::sink::{ResultSink, SinkError};
use crate::uploader::{UploadError, UploadParams, Uploader};
use async_trait::async_trait;
use chrono::Utc;
use peertube_api::{ApiError, CredentialStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why an item did not make it all the way through
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Authorization failed: {0}")]
    Auth(#[from] ApiError),

    #[error("Media inspection failed: {0}")]
    Media(#[from] MediaError),

    #[error("No audio or video stream in {0}")]
    Unsupported(PathBuf),

    #[error(transparent)]
    Upload(#[from] UploadError),

    /// The video exists remotely but its outcome was not recorded
    #[error("Uploaded as video {} but not recorded: {source}", .result.remote_id)]
    Sink {
        result: UploadResult,
        #[source]
        source: SinkError,
    },
}

/// Handles one record from the source
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, record: &SourceRecord) -> Result<UploadResult, ItemError>;
}

/// Probing and transcoding settings
#[derive(Clone, Default)]
pub struct MediaOptions {
    /// Classify files before upload; required for audio conversion
    pub prober: Option<Arc<dyn MediaProber>>,
    /// Convert audio-only files to mp3 before upload
    pub transcoder: Option<Arc<dyn Transcoder>>,
    pub temp_folder: PathBuf,
}

/// Credential check, optional conversion, upload, then sink
pub struct UploadProcessor {
    credentials: Arc<CredentialStore>,
    uploader: Uploader,
    sink: Arc<dyn ResultSink>,
    media: MediaOptions,
}

impl UploadProcessor {
    pub fn new(
        credentials: Arc<CredentialStore>,
        uploader: Uploader,
        sink: Arc<dyn ResultSink>,
        media: MediaOptions,
    ) -> Self {
        Self {
            credentials,
            uploader,
            sink,
            media,
        }
    }

    /// File to send, plus the guard for any converted copy
    async fn prepare_file(&self, path: &Path) -> Result<(PathBuf, Option<TempFile>), ItemError> {
        let Some(prober) = &self.media.prober else {
            return Ok((path.to_path_buf(), None));
        };

        match prober.probe(path).await? {
            MediaKind::Video => Ok((path.to_path_buf(), None)),
            MediaKind::Unknown => Err(ItemError::Unsupported(path.to_path_buf())),
            MediaKind::Audio => {
                let Some(transcoder) = &self.media.transcoder else {
                    return Ok((path.to_path_buf(), None));
                };
                // Guard first so a half-written output is removed too
                let converted = TempFile::new(temp_mp3_path(&self.media.temp_folder, path));
                transcoder.to_mp3(path, converted.path()).await?;
                Ok((converted.path().to_path_buf(), Some(converted)))
            }
        }
    }
}

#[async_trait]
impl ItemProcessor for UploadProcessor {
    async fn process(&self, record: &SourceRecord) -> Result<UploadResult, ItemError> {
        self.credentials.ensure_valid(Utc::now()).await?;

        let item = &record.item;
        let (upload_path, _converted) = self.prepare_file(&item.file_path).await?;

        let params = UploadParams {
            filename: upload_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| item.title.clone()),
            content_type: content_type_for(&upload_path).to_string(),
            file_path: upload_path,
            name: item.title.clone(),
            description: Some(item.description.clone()),
            originally_published_at: Some(item.created_at),
        };
        debug!(
            target: "tasks::worker",
            file = %params.file_path.display(),
            content_type = %params.content_type,
            "Prepared upload"
        );

        let result = self.uploader.upload(&params).await?;

        self.sink
            .record(&result, record)
            .await
            .map_err(|source| ItemError::Sink {
                result: result.clone(),
                source,
            })?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaItem;
    use crate::sink::LogOnlySink;
    use crate::testing::FakePlatform;
    use crate::uploader::{UploaderConfig, VideoDefaults};
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedProber(MediaKind);

    #[async_trait]
    impl MediaProber for FixedProber {
        async fn probe(&self, _path: &Path) -> Result<MediaKind, MediaError> {
            Ok(self.0)
        }
    }

    /// Copies the input and remembers where it wrote
    #[derive(Default)]
    struct CopyTranscoder {
        outputs: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Transcoder for CopyTranscoder {
        async fn to_mp3(&self, source: &Path, target: &Path) -> Result<(), MediaError> {
            tokio::fs::copy(source, target).await.unwrap();
            self.outputs.lock().unwrap().push(target.to_path_buf());
            Ok(())
        }
    }

    fn record_for(path: PathBuf) -> SourceRecord {
        SourceRecord::from_item(MediaItem {
            title: "song".to_string(),
            description: String::new(),
            file_path: path,
            created_at: Utc::now(),
        })
    }

    fn processor(platform: &FakePlatform, media: MediaOptions) -> UploadProcessor {
        let client = platform.client();
        let credentials = platform.credentials(client.clone());
        let uploader = Uploader::new(
            client,
            credentials.clone(),
            VideoDefaults::default(),
            UploaderConfig {
                chunk_size: 4,
                max_retries: 0,
                retry_delay: Duration::from_millis(1),
            },
        );
        UploadProcessor::new(credentials, uploader, Arc::new(LogOnlySink), media)
    }

    #[tokio::test]
    async fn test_audio_is_converted_and_temp_removed() {
        let platform = FakePlatform::start().await;
        let dir = TempDir::new().unwrap();
        let temp_folder = dir.path().join("tmp");
        std::fs::create_dir_all(&temp_folder).unwrap();
        let source = dir.path().join("song.wav");
        std::fs::write(&source, b"0123456789").unwrap();

        let transcoder = Arc::new(CopyTranscoder::default());
        let processor = processor(
            &platform,
            MediaOptions {
                prober: Some(Arc::new(FixedProber(MediaKind::Audio))),
                transcoder: Some(transcoder.clone()),
                temp_folder: temp_folder.clone(),
            },
        );

        let result = processor.process(&record_for(source.clone())).await.unwrap();
        assert_eq!(result.remote_id, 1);

        let outputs = transcoder.outputs.lock().unwrap().clone();
        assert_eq!(outputs.len(), 1);
        assert!(!outputs[0].exists());
        assert_eq!(std::fs::read_dir(&temp_folder).unwrap().count(), 0);
        assert!(source.exists());

        let uploads = platform.state.uploads.lock().unwrap();
        let upload = uploads.values().next().unwrap();
        assert!(upload.filename.ends_with(".mp3"));
    }

    #[tokio::test]
    async fn test_temp_removed_when_upload_fails() {
        let platform = FakePlatform::start().await;
        platform.state.fail_next_chunks.store(10, Ordering::SeqCst);
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("song.flac");
        std::fs::write(&source, b"0123456789").unwrap();

        let transcoder = Arc::new(CopyTranscoder::default());
        let processor = processor(
            &platform,
            MediaOptions {
                prober: Some(Arc::new(FixedProber(MediaKind::Audio))),
                transcoder: Some(transcoder.clone()),
                temp_folder: dir.path().to_path_buf(),
            },
        );

        let err = processor.process(&record_for(source)).await.unwrap_err();
        assert!(matches!(
            err,
            ItemError::Upload(UploadError::MaxRetriesExceeded { .. })
        ));
        let outputs = transcoder.outputs.lock().unwrap().clone();
        assert!(!outputs[0].exists());
    }

    #[tokio::test]
    async fn test_unknown_media_is_skipped() {
        let platform = FakePlatform::start().await;
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("data.bin");
        std::fs::write(&source, b"xx").unwrap();

        let processor = processor(
            &platform,
            MediaOptions {
                prober: Some(Arc::new(FixedProber(MediaKind::Unknown))),
                ..Default::default()
            },
        );

        let err = processor.process(&record_for(source)).await.unwrap_err();
        assert!(matches!(err, ItemError::Unsupported(_)));
        assert_eq!(platform.state.init_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_video_uploaded_without_media_detection() {
        let platform = FakePlatform::start().await;
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"abcdefgh").unwrap();

        let processor = processor(&platform, MediaOptions::default());
        processor.process(&record_for(source)).await.unwrap();

        assert_eq!(platform.state.password_grants.load(Ordering::SeqCst), 1);
        assert_eq!(platform.state.chunk_puts.load(Ordering::SeqCst), 2);
    }
}
