use super::{ExtensionFilter, MediaSource, SourceError, derive_title, modified_time};
use crate::models::{MediaItem, SourceRecord};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Recursive directory walk
pub struct FolderSource {
    root: PathBuf,
    filter: ExtensionFilter,
}

impl FolderSource {
    pub fn new(root: PathBuf, filter: ExtensionFilter) -> Self {
        Self { root, filter }
    }

    fn walk(&self, tx: &mpsc::Sender<SourceRecord>) -> usize {
        if let Err(e) = std::fs::metadata(&self.root) {
            error!(
                target: "source",
                root = %self.root.display(),
                error = %e,
                "Media folder is not accessible"
            );
            return 0;
        }

        let mut produced = 0;
        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(target: "source", error = %e, "Skipping unreadable path");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if !self.filter.accepts(path) {
                debug!(target: "source", path = %path.display(), "Skipping filtered file");
                continue;
            }

            let item = MediaItem {
                title: derive_title(path, self.filter.is_enabled()),
                description: String::new(),
                file_path: path.to_path_buf(),
                created_at: modified_time(path),
            };

            if tx.blocking_send(SourceRecord::from_item(item)).is_err() {
                debug!(target: "source", "Receiver closed, stopping folder walk");
                break;
            }
            produced += 1;
        }
        produced
    }
}

#[async_trait]
impl MediaSource for FolderSource {
    async fn produce(self: Box<Self>, tx: mpsc::Sender<SourceRecord>) -> Result<(), SourceError> {
        info!(target: "source", root = %self.root.display(), "Walking media folder");
        let produced = tokio::task::spawn_blocking(move || self.walk(&tx))
            .await
            .map_err(|e| SourceError::Fatal(format!("folder walk panicked: {}", e)))?;
        info!(target: "source", produced, "Folder walk finished");
        Ok(())
    }
}
