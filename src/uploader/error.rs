use peertube_api::ApiError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that end one file's upload
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Authorization failed: {0}")]
    Auth(#[source] ApiError),

    #[error("Upload session could not be opened: {0}")]
    Init(#[source] ApiError),

    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Chunk at byte {offset} still failing after {attempts} retries: {last_error}")]
    MaxRetriesExceeded {
        offset: u64,
        attempts: u32,
        last_error: String,
    },

    #[error("Unreadable server response: {0}")]
    Parse(#[source] ApiError),

    #[error("Reached end of file at byte {sent} of {total} without a completion response")]
    Incomplete { sent: u64, total: u64 },
}
