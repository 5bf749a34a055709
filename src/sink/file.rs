use super::{ResultSink, SinkError};
use crate::models::{MediaItem, SourceRecord, UploadResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Serialize)]
struct LogLine<'a> {
    media: &'a MediaItem,
    video: &'a UploadResult,
    identifiers: Map<String, Value>,
}

/// Appends one JSON object per upload to a shared file
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    fn line(result: &UploadResult, record: &SourceRecord) -> Result<String, SinkError> {
        let identifiers: Map<String, Value> = record
            .identifiers
            .iter()
            .map(|(name, value)| serde_json::to_value(value).map(|v| (name.clone(), v)))
            .collect::<Result<_, serde_json::Error>>()?;

        let mut line = serde_json::to_string(&LogLine {
            media: &record.item,
            video: result,
            identifiers,
        })?;
        line.push('\n');
        Ok(line)
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn record(&self, result: &UploadResult, record: &SourceRecord) -> Result<(), SinkError> {
        let line = Self::line(result, record)?;

        // Whole line in one write under the lock, so records never interleave
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        tracing::debug!(
            target: "sink",
            log_file = %self.path.display(),
            video_id = result.remote_id,
            "Upload recorded"
        );
        Ok(())
    }
}
