//! Persistence of upload outcomes

mod database;
mod file;
mod mapping;

pub use database::DatabaseSink;
pub use file::FileSink;
pub use mapping::{ColumnMapping, ColumnSource, ResolvedColumns};

use crate::config::{AppConfig, SinkKind};
use crate::database::DatabaseError;
use crate::models::{SourceRecord, UploadResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("No value for log column {0:?}")]
    MissingColumn(String),

    #[error("Failed to write log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode log record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Records the outcome of a completed upload
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, result: &UploadResult, record: &SourceRecord) -> Result<(), SinkError>;
}

/// Only logs completed uploads
pub struct LogOnlySink;

#[async_trait]
impl ResultSink for LogOnlySink {
    async fn record(&self, result: &UploadResult, record: &SourceRecord) -> Result<(), SinkError> {
        tracing::info!(
            target: "sink",
            path = %record.item.file_path.display(),
            video_id = result.remote_id,
            "done uploading"
        );
        Ok(())
    }
}

/// Sink selected by `load.log_type`
pub async fn build(config: &AppConfig) -> Result<Arc<dyn ResultSink>> {
    match config.load.log_type {
        SinkKind::None => Ok(Arc::new(LogOnlySink)),
        SinkKind::File => {
            let sink = FileSink::open(&config.load.log_file)
                .await
                .with_context(|| format!("Failed to open log file {}", config.load.log_file.display()))?;
            Ok(Arc::new(sink))
        }
        SinkKind::Db => {
            let db = config
                .database
                .as_ref()
                .context("database section is required for the db log type")?;
            let sink = DatabaseSink::from_config(db, config.load.source)
                .await
                .context("Failed to prepare log table")?;
            Ok(Arc::new(sink))
        }
    }
}
