use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata sent to `/videos/upload-resumable` to open an upload session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResumableUploadRequest {
    pub channel_id: i64,
    pub filename: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub comments_policy: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub download_enabled: bool,
    pub privacy: i32,
    pub wait_transcoding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originally_published_at: Option<String>,
}

/// Identifiers of a created video
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct VideoIds {
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "shortUUID")]
    pub short_uuid: String,
}

/// Body of the final chunk response
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct VideoCreated {
    pub video: VideoIds,
}

/// Inclusive byte span of one chunk, rendered as a `Content-Range` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    /// Range covering `length` bytes starting at `start`. `length` must be non-zero.
    pub fn new(start: u64, length: u64, total: u64) -> Self {
        Self {
            start,
            end: start + length - 1,
            total,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Outcome of a single chunk PUT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkResponse {
    /// 308: chunk stored, send the next one
    Continue,
    /// 200: last chunk stored and the video was created
    Complete(VideoCreated),
    /// Any other status; the caller decides whether to retry
    Rejected { status: u16, message: String },
}
