//! Producers of media items
//!
//! A source pushes records into a bounded channel and returns once it is
//! exhausted. Dropping the sender is what tells the workers the run is over.

mod database;
mod folder;

pub use database::DatabaseSource;
pub use folder::FolderSource;

use crate::models::SourceRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The source cannot continue; the run is aborted
    #[error("Media source failed: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait MediaSource: Send {
    /// Send every record to `tx`. Stops early if the receiver goes away.
    async fn produce(self: Box<Self>, tx: mpsc::Sender<SourceRecord>) -> Result<(), SourceError>;
}

/// Extension allow-list
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    enabled: bool,
    /// Lowercase, each with a leading dot
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new(enabled: bool, extensions: &[String]) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty() && e != ".")
            .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
            .collect();
        Self {
            enabled,
            extensions,
        }
    }

    /// Accept everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            extensions: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }
}

/// Video title for a file.
///
/// With filtering on, the last extension is dropped and underscores become
/// spaces; otherwise the file name is used as is.
pub fn derive_title(path: &Path, filtering: bool) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !filtering {
        return name;
    }

    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name.as_str(),
    };
    stem.replace('_', " ")
}

/// File modification time, or now when the file cannot be inspected
pub fn modified_time(path: &Path) -> DateTime<Utc> {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(time) => DateTime::<Utc>::from(time),
        Err(e) => {
            tracing::warn!(
                target: "source",
                path = %path.display(),
                error = %e,
                "Cannot read modification time, using current time"
            );
            Utc::now()
        }
    }
}
