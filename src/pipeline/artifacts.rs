use std::path::{Path, PathBuf};

use crate::extractors::cookie_jar_path;
use crate::utils::unique_temp_path;

/// The video-stage and audio-stage files of one request, plus the fetcher's scratch
/// cookie jar.
///
/// Paths are reserved, not created. A finished run removes them with [`release`], which
/// does not block the runtime. If the request future is dropped mid-stage, `Drop` removes
/// them instead.
///
/// [`release`]: TempArtifacts::release
#[derive(Debug)]
pub struct TempArtifacts {
    video: PathBuf,
    audio: PathBuf,
    cookie_jar: PathBuf,
    released: bool,
}

impl TempArtifacts {
    pub fn new(dir: &Path) -> Self {
        let video = unique_temp_path(dir, "video", "mp4");
        Self {
            cookie_jar: cookie_jar_path(&video),
            audio: unique_temp_path(dir, "audio", "mp3"),
            video,
            released: false,
        }
    }

    pub fn video(&self) -> &Path {
        &self.video
    }

    pub fn audio(&self) -> &Path {
        &self.audio
    }

    fn paths(&self) -> [&Path; 3] {
        [&self.video, &self.audio, &self.cookie_jar]
    }

    /// Remove every file of the run. Failures are logged and never surface to the caller.
    pub async fn release(mut self) {
        for path in self.paths() {
            log_removal(path, tokio::fs::remove_file(path).await);
        }
        self.released = true;
    }

    /// Blocking variant of [`release`](TempArtifacts::release), used from `Drop`
    pub fn cleanup(&self) {
        for path in self.paths() {
            log_removal(path, std::fs::remove_file(path));
        }
    }
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Cleaned up"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to delete temp file"),
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        if !self.released {
            self.cleanup();
        }
    }
}
