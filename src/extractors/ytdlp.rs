use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Fragments of upstream error output that mean "you are being throttled"
const RATE_LIMIT_MARKERS: &[&str] = &[
    "sign in to confirm you",
    "not a bot",
    "http error 429",
    "too many requests",
    "please wait a few minutes",
];

/// Errors that never clear on retry. They override the throttling markers when both match.
const PERMANENT_MARKERS: &[&str] = &["login required", "private", "video unavailable"];

/// Thin wrapper around the yt-dlp binary shared by the platform fetchers
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Download `url` into `dest`, passing `extra_args` before the URL.
    ///
    /// Only the exit status and stderr are inspected; a successful exit without a file at
    /// `dest` is treated as a failure.
    pub async fn download(&self, url: &str, dest: &Path, extra_args: &[String]) -> Result<(), FetchError> {
        tracing::debug!(url = %url, dest = %dest.display(), "Running yt-dlp");

        let output = Command::new(&self.binary)
            .args(base_args(dest))
            .args(extra_args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::Failed(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }

        match tokio::fs::metadata(dest).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(FetchError::Failed(format!(
                "yt-dlp exited successfully but produced no file at {}",
                dest.display()
            ))),
        }
    }
}

fn base_args(dest: &Path) -> Vec<String> {
    vec![
        "--no-playlist".to_string(),
        "--no-part".to_string(),
        "--force-overwrites".to_string(),
        "--no-progress".to_string(),
        "--add-header".to_string(),
        format!("User-Agent:{}", USER_AGENT),
        "--add-header".to_string(),
        format!("Accept-Language:{}", ACCEPT_LANGUAGE),
        "--output".to_string(),
        dest.to_string_lossy().into_owned(),
    ]
}

/// Turn yt-dlp's stderr into a typed error
pub fn classify_failure(stderr: &str) -> FetchError {
    let lowered = stderr.to_lowercase();
    let message = if stderr.is_empty() {
        "yt-dlp failed without output".to_string()
    } else {
        last_error_line(stderr).to_string()
    };

    let mentions = |markers: &[&str]| markers.iter().any(|marker| lowered.contains(marker));

    if mentions(RATE_LIMIT_MARKERS) && !mentions(PERMANENT_MARKERS) {
        FetchError::RateLimited(message)
    } else {
        FetchError::Failed(message)
    }
}

/// yt-dlp prints warnings before the fatal line; keep the part a caller cares about
fn last_error_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or(stderr)
        .trim()
}
