use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Downstream endpoint the MP3 is forwarded to
    pub forward: ForwardConfig,

    /// Working directory and output limits
    pub pipeline: PipelineConfig,

    /// Retry and rate-limit backoff tuning
    pub backoff: BackoffConfig,

    /// YouTube source settings
    pub youtube: YoutubeConfig,

    /// Instagram source settings
    pub instagram: InstagramConfig,

    /// External tool locations
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on (all interfaces)
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Upload URL of the downstream processing service
    pub url: String,

    /// Upload timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding per-request temp files
    pub work_dir: PathBuf,

    /// Refuse new requests below this much free space (MiB)
    pub min_free_mb: u64,

    /// Largest MP3 that may be forwarded (MiB)
    pub max_output_mb: u64,

    /// MP3 bitrate in kbps
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// How long fetches stay blocked after an upstream rate limit (seconds)
    pub cooldown_secs: u64,

    /// Attempts per fetch before giving up on a rate-limited upstream
    pub max_attempts: u32,

    /// First retry delay in seconds, doubled after every rate-limited attempt
    pub initial_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub enabled: bool,

    /// Browser session cookies handed to the fetcher
    pub cookies: Vec<SessionCookie>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub enabled: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp: String,
    pub ffmpeg: String,
}

/// A browser cookie, as exported by cookie-editor extensions or tough-cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    #[serde(alias = "key")]
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, alias = "expirationDate")]
    pub expires: Option<CookieExpiry>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

/// Cookie expiry as either epoch seconds or a date string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CookieExpiry {
    Timestamp(f64),
    Date(String),
}

impl CookieExpiry {
    /// Epoch seconds, or 0 (session cookie) when the value cannot be interpreted
    pub fn unix_seconds(&self) -> i64 {
        match self {
            CookieExpiry::Timestamp(secs) if secs.is_finite() && *secs > 0.0 => *secs as i64,
            CookieExpiry::Timestamp(_) => 0,
            CookieExpiry::Date(text) => chrono::DateTime::parse_from_rfc3339(text)
                .or_else(|_| chrono::DateTime::parse_from_rfc2822(text))
                .map(|date| date.timestamp())
                .unwrap_or(0),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("Uploads"),
            min_free_mb: 100,
            max_output_mb: 5,
            bitrate_kbps: 192,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 20 * 60,
            max_attempts: 5,
            initial_delay_secs: 10,
        }
    }
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookies: Vec::new(),
        }
    }
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            username: None,
            password: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

const MIB: u64 = 1024 * 1024;

impl Config {
    /// Load configuration from `path` (or the default locations), then apply the environment
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::read_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        serde_yaml::from_str(&content).context("Failed to parse config file")
    }

    /// Write this configuration to the default location
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path().context("Could not determine config directory")?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("scenefinder-relay").join("config.yaml"))
    }

    /// Overlay deployment environment variables onto the file/default values
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup("RENDER_UPLOAD_URL") {
            self.forward.url = url;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }
        if let Some(dir) = lookup("WORK_DIR") {
            self.pipeline.work_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("YOUTUBE_COOKIES") {
            self.youtube.cookies =
                serde_json::from_str(&raw).context("YOUTUBE_COOKIES must be a JSON array of cookies")?;
        }
        if let Some(enabled) = lookup("YOUTUBE_ENABLED") {
            self.youtube.enabled = parse_flag("YOUTUBE_ENABLED", &enabled)?;
        }
        if let Some(user) = lookup("INSTAGRAM_USERNAME") {
            self.instagram.username = Some(user);
        }
        if let Some(pass) = lookup("INSTAGRAM_PASSWORD") {
            self.instagram.password = Some(pass);
        }
        if let Some(enabled) = lookup("INSTAGRAM_ENABLED") {
            self.instagram.enabled = parse_flag("INSTAGRAM_ENABLED", &enabled)?;
        }
        if let Some(path) = lookup("YT_DLP_PATH") {
            self.tools.yt_dlp = path;
        }
        if let Some(path) = lookup("FFMPEG_PATH") {
            self.tools.ffmpeg = path;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.forward.url.is_empty() {
            anyhow::bail!("Forwarding URL must be configured (RENDER_UPLOAD_URL)");
        }
        crate::utils::validate_and_normalize_url(&self.forward.url)
            .context("Forwarding URL is invalid")?;

        if self.pipeline.max_output_mb == 0 {
            anyhow::bail!("pipeline.max_output_mb must be greater than zero");
        }
        if self.pipeline.bitrate_kbps == 0 {
            anyhow::bail!("pipeline.bitrate_kbps must be greater than zero");
        }
        if self.forward.timeout_secs == 0 {
            anyhow::bail!("forward.timeout_secs must be greater than zero");
        }
        if !self.youtube.enabled && !self.instagram.enabled {
            anyhow::bail!("At least one source (YouTube or Instagram) must be enabled");
        }

        Ok(())
    }

    /// Display current configuration, secrets redacted
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Port: {}", self.server.port);
        println!(
            "  Forward URL: {}",
            if self.forward.url.is_empty() { "(not set)" } else { self.forward.url.as_str() }
        );
        println!("  Forward Timeout: {}s", self.forward.timeout_secs);
        println!("  Work Dir: {}", self.pipeline.work_dir.display());
        println!("  Min Free Space: {} MB", self.pipeline.min_free_mb);
        println!("  Max Output: {} MB", self.pipeline.max_output_mb);
        println!("  Bitrate: {}k", self.pipeline.bitrate_kbps);
        println!(
            "  Backoff: {} attempts, {}s initial delay, {}s cooldown",
            self.backoff.max_attempts, self.backoff.initial_delay_secs, self.backoff.cooldown_secs
        );
        println!(
            "  YouTube: {} ({} cookies)",
            enabled_label(self.youtube.enabled),
            self.youtube.cookies.len()
        );
        println!(
            "  Instagram: {} (username: {}, password: {})",
            enabled_label(self.instagram.enabled),
            self.instagram.username.as_deref().unwrap_or("(not set)"),
            if self.instagram.password.is_some() { "********" } else { "(not set)" }
        );
        println!("  yt-dlp: {}", self.tools.yt_dlp);
        println!("  ffmpeg: {}", self.tools.ffmpeg);
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.backoff.max_attempts,
            initial_delay: Duration::from_secs(self.backoff.initial_delay_secs),
        }
    }

    pub fn backoff_cooldown(&self) -> Duration {
        Duration::from_secs(self.backoff.cooldown_secs)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward.timeout_secs)
    }

    pub fn min_free_bytes(&self) -> u64 {
        self.pipeline.min_free_mb.saturating_mul(MIB)
    }

    pub fn max_output_bytes(&self) -> u64 {
        self.pipeline.max_output_mb.saturating_mul(MIB)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("Invalid boolean for {}: {}", key, other),
    }
}

fn enabled_label(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}
