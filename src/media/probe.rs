use super::{MediaError, MediaKind, MediaProber};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
}

/// Any video stream makes the file a video, otherwise any audio stream makes it audio
fn classify(output: &FfprobeOutput) -> MediaKind {
    let has = |kind: &str| {
        output
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some(kind))
    };

    if has("video") {
        MediaKind::Video
    } else if has("audio") {
        MediaKind::Audio
    } else {
        MediaKind::Unknown
    }
}

pub struct FfprobeProber {
    ffprobe_path: String,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaKind, MediaError> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MediaError::Spawn {
                tool: self.ffprobe_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                tool: self.ffprobe_path.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let kind = classify(&parsed);
        tracing::debug!(
            target: "media",
            path = %path.display(),
            kind = ?kind,
            streams = parsed.streams.len(),
            "Probed media"
        );
        Ok(kind)
    }
}
