//! Media inspection and conversion through external tools

mod mime;
mod probe;
mod transcode;

pub use mime::content_type_for;
pub use probe::FfprobeProber;
pub use transcode::FfmpegTranscoder;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    /// No audio or video stream found
    Unknown,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Classifies a file by the streams it contains
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaKind, MediaError>;
}

/// Converts audio files to mp3
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn to_mp3(&self, source: &Path, target: &Path) -> Result<(), MediaError>;
}

/// Removes the wrapped file when dropped
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(target: "media", path = %self.path.display(), "Temporary file removed");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    target: "media",
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove temporary file"
                );
            }
        }
    }
}

/// Unique mp3 path in `temp_folder` for a transcoded copy of `source`
pub fn temp_mp3_path(temp_folder: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    temp_folder.join(format!("{}-{}.mp3", stem, uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_file_removed_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("x.mp3");
        std::fs::write(&path, b"data").unwrap();

        {
            let guard = TempFile::new(path.clone());
            assert!(guard.path().exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_file_missing_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        drop(TempFile::new(dir.path().join("never-created.mp3")));
    }

    #[test]
    fn test_temp_mp3_path_is_unique() {
        let dir = Path::new("/tmp/work");
        let a = temp_mp3_path(dir, Path::new("/music/song.wav"));
        let b = temp_mp3_path(dir, Path::new("/music/song.wav"));
        assert_ne!(a, b);
        assert!(a.starts_with(dir));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("song-"));
        assert_eq!(a.extension().unwrap(), "mp3");
    }
}
