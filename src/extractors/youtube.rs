use anyhow::Context;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::ytdlp::YtDlp;
use super::{cookie_jar_path, FetchError, MediaFetcher, SourceKind};
use crate::config::{CookieExpiry, SessionCookie};
use crate::Result;

const DEFAULT_COOKIE_DOMAIN: &str = ".youtube.com";

/// YouTube audio fetcher using yt-dlp, optionally authenticated with session cookies
pub struct YoutubeFetcher {
    ytdlp: YtDlp,
    cookie_file: Option<PathBuf>,
}

impl YoutubeFetcher {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self {
            ytdlp,
            cookie_file: None,
        }
    }

    /// Write `cookies` to a Netscape cookie jar under `work_dir`.
    ///
    /// yt-dlp rewrites the jar it is given on exit, so this file is never handed to it
    /// directly: every fetch works on its own copy.
    pub fn with_cookies(ytdlp: YtDlp, cookies: &[SessionCookie], work_dir: &Path) -> Result<Self> {
        if cookies.is_empty() {
            tracing::warn!("No YouTube cookies provided, bot detection is more likely");
            return Ok(Self::new(ytdlp));
        }

        let path = work_dir.join("youtube-cookies.txt");
        fs_err::write(&path, render_cookie_jar(cookies)).context("Failed to write YouTube cookie jar")?;

        tracing::info!(
            cookies = ?cookies.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "Using YouTube cookies"
        );

        Ok(Self {
            ytdlp,
            cookie_file: Some(path),
        })
    }

    fn args(&self, cookie_jar: Option<&Path>) -> Vec<String> {
        let mut args = vec!["--format".to_string(), "bestaudio/best".to_string()];
        if let Some(path) = cookie_jar {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        args
    }
}

#[async_trait]
impl MediaFetcher for YoutubeFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::YouTube
    }

    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<(), FetchError> {
        tracing::info!(url = %url, "Fetching YouTube audio");

        let Some(cookie_file) = &self.cookie_file else {
            return self.ytdlp.download(url, dest, &self.args(None)).await;
        };

        let jar = cookie_jar_path(dest);
        tokio::fs::copy(cookie_file, &jar).await?;

        let result = self.ytdlp.download(url, dest, &self.args(Some(&jar))).await;

        if let Err(e) = tokio::fs::remove_file(&jar).await {
            tracing::debug!(path = %jar.display(), error = %e, "Cookie jar copy not removed");
        }
        result
    }
}

/// Render cookies in the Netscape format understood by yt-dlp's `--cookies`
pub fn render_cookie_jar(cookies: &[SessionCookie]) -> String {
    let mut jar = String::from("# Netscape HTTP Cookie File\n");

    for cookie in cookies {
        let domain = cookie.domain.as_deref().unwrap_or(DEFAULT_COOKIE_DOMAIN);
        let include_subdomains = if domain.starts_with('.') { "TRUE" } else { "FALSE" };
        let prefix = if cookie.http_only { "#HttpOnly_" } else { "" };
        let _ = writeln!(
            jar,
            "{}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            prefix,
            domain,
            include_subdomains,
            cookie.path.as_deref().unwrap_or("/"),
            if cookie.secure { "TRUE" } else { "FALSE" },
            cookie.expires.as_ref().map(CookieExpiry::unix_seconds).unwrap_or(0),
            cookie.name,
            cookie.value,
        );
    }

    jar
}
