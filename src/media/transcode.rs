use super::{MediaError, Transcoder};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_mp3(&self, source: &Path, target: &Path) -> Result<(), MediaError> {
        tracing::info!(
            target: "media",
            source = %source.display(),
            target_path = %target.display(),
            "Converting audio to mp3"
        );

        let output = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(source)
            .arg(target)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MediaError::Spawn {
                tool: self.ffmpeg_path.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // ffmpeg prints its banner first; the cause is at the end
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(MediaError::Failed {
                tool: self.ffmpeg_path.clone(),
                status: output.status,
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }

        Ok(())
    }
}
