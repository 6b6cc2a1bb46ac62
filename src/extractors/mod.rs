use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

pub mod instagram;
pub mod youtube;
pub mod ytdlp;

use crate::retry::RateLimitSignal;

/// Platforms the relay knows how to fetch from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    YouTube,
    Instagram,
    Unsupported,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "YouTube",
            SourceKind::Instagram => "Instagram",
            SourceKind::Unsupported => "Unsupported",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by fetch adapters.
///
/// Rate limiting is its own variant so the retry layer can match on it instead of
/// inspecting message text.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("upstream rate limit or bot check: {0}")]
    RateLimited(String),

    #[error("{0}")]
    CredentialsMissing(String),

    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateLimitSignal for FetchError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited(_))
    }
}

/// Downloads the media behind a URL to a local file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Which source kind this fetcher serves
    fn source(&self) -> SourceKind;

    /// Preconditions that retrying cannot fix, such as missing credentials.
    /// Checked once per request before any fetch attempt.
    fn ready(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Fetch the media at `url` into `dest`
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Scratch cookie jar for the fetch writing to `dest`. Lives next to `dest` so it is
/// unique per request and removed together with the request's other temp files.
pub fn cookie_jar_path(dest: &Path) -> PathBuf {
    dest.with_extension("cookies.txt")
}

/// One fetcher per enabled source
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: Vec<Arc<dyn MediaFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher, replacing any previous one for the same source
    pub fn register(&mut self, fetcher: Arc<dyn MediaFetcher>) {
        let source = fetcher.source();
        self.fetchers.retain(|existing| existing.source() != source);
        self.fetchers.push(fetcher);
    }

    pub fn get(&self, source: SourceKind) -> Option<&dyn MediaFetcher> {
        self.fetchers
            .iter()
            .find(|fetcher| fetcher.source() == source)
            .map(|fetcher| fetcher.as_ref())
    }

    pub fn is_enabled(&self, source: SourceKind) -> bool {
        self.get(source).is_some()
    }

    /// Enabled sources, in registration order
    pub fn sources(&self) -> Vec<SourceKind> {
        self.fetchers.iter().map(|fetcher| fetcher.source()).collect()
    }
}

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "gaming.youtube.com",
    "youtube-nocookie.com",
];

const INSTAGRAM_POST_KINDS: &[&str] = &["p", "reel", "reels", "tv"];

/// Pick a fetch strategy from the shape of the URL alone. Never touches the network.
pub fn classify(input: &str) -> SourceKind {
    let Ok(parsed) = Url::parse(input.trim()) else {
        return SourceKind::Unsupported;
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return SourceKind::Unsupported;
    }

    let Some(host) = normalized_host(&parsed) else {
        return SourceKind::Unsupported;
    };
    let host = host.as_str();

    if (host == "youtu.be" || YOUTUBE_HOSTS.contains(&host)) && youtube_video_id(&parsed).is_some()
    {
        return SourceKind::YouTube;
    }

    if (host == "instagram.com" || host.ends_with(".instagram.com")) && has_instagram_post(&parsed)
    {
        return SourceKind::Instagram;
    }

    SourceKind::Unsupported
}

/// Lowercased host without a leading `www.`
fn normalized_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    })
}

/// Extract the video id from the usual YouTube URL layouts
pub fn youtube_video_id(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let candidate = if normalized_host(url).as_deref() == Some("youtu.be") {
        segments.first().map(|id| id.to_string())
    } else {
        match segments.as_slice() {
            ["watch", ..] => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            ["embed" | "shorts" | "v" | "live", id, ..] => Some(id.to_string()),
            _ => None,
        }
    };

    candidate.filter(|id| {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

fn has_instagram_post(url: &Url) -> bool {
    let Some(segments) = url.path_segments() else {
        return false;
    };
    let segments: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();

    segments
        .windows(2)
        .any(|pair| INSTAGRAM_POST_KINDS.contains(&pair[0]))
}
