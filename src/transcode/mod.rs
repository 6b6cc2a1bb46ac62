use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::Result;

/// Converts fetched media into an MP3 audio file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write the audio track of `input` to `output` as MP3 at `bitrate_kbps`
    async fn to_mp3(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> Result<()>;
}

/// Transcoder backed by the ffmpeg binary
#[derive(Debug, Clone)]
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

fn ffmpeg_args(input: &Path, output: &Path, bitrate_kbps: u32) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(), // Overwrite output file
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-vn".to_string(), // No video
        "-acodec".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        format!("{}k", bitrate_kbps),
        output.to_string_lossy().into_owned(),
    ]
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_mp3(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> Result<()> {
        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            bitrate_kbps,
            "Converting to MP3"
        );

        let result = Command::new(&self.ffmpeg_path)
            .args(ffmpeg_args(input, output, bitrate_kbps))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run {}: {}", self.ffmpeg_path, e))?;

        if !result.status.success() {
            let error = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("ffmpeg exited with {}: {}", result.status, error.trim());
        }

        Ok(())
    }
}
