//! Request pipeline: classify → fetch → transcode → validate → forward, with cleanup
//!
//! One [`Pipeline`] is shared by every request. Each call to [`Pipeline::process`] owns a
//! fresh pair of temp files that is removed when the call returns, whatever the outcome.

use anyhow::Context;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

mod artifacts;

pub use artifacts::TempArtifacts;

use crate::config::Config;
use crate::extractors::instagram::InstagramFetcher;
use crate::extractors::youtube::YoutubeFetcher;
use crate::extractors::ytdlp::YtDlp;
use crate::extractors::{classify, FetchError, FetcherRegistry, MediaFetcher, SourceKind};
use crate::forward::{Forwarder, HttpForwarder};
use crate::retry::gate::BackoffGate;
use crate::retry::{with_backoff, RetryError, RetryPolicy};
use crate::transcode::{FfmpegTranscoder, Transcoder};
use crate::{OutputProblem, RelayError};

/// Per-deployment knobs of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub min_free_bytes: u64,
    pub max_output_bytes: u64,
    pub bitrate_kbps: u32,
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.pipeline.work_dir.clone(),
            min_free_bytes: config.min_free_bytes(),
            max_output_bytes: config.max_output_bytes(),
            bitrate_kbps: config.pipeline.bitrate_kbps,
            retry: config.retry_policy(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Where a run currently is. `Error` is not a variant: a failed run reports the stage it
/// failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Classifying,
    Fetching,
    Transcoding,
    Validating,
    Forwarding,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Classifying => "classifying",
            Stage::Fetching => "fetching",
            Stage::Transcoding => "transcoding",
            Stage::Validating => "validating",
            Stage::Forwarding => "forwarding",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    tracing::debug!(from = %stage, to = %next, "Pipeline stage");
    *stage = next;
}

pub struct Pipeline {
    settings: PipelineSettings,
    gate: Arc<BackoffGate>,
    fetchers: FetcherRegistry,
    transcoder: Arc<dyn Transcoder>,
    forwarder: Arc<dyn Forwarder>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        gate: Arc<BackoffGate>,
        fetchers: FetcherRegistry,
        transcoder: Arc<dyn Transcoder>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            settings,
            gate,
            fetchers,
            transcoder,
            forwarder,
        }
    }

    /// Wire the production adapters (yt-dlp, ffmpeg, HTTP upload) from configuration
    pub fn from_config(config: &Config, gate: Arc<BackoffGate>) -> crate::Result<Self> {
        let work_dir = &config.pipeline.work_dir;
        fs_err::create_dir_all(work_dir).context("Failed to create work directory")?;

        let ytdlp = YtDlp::new(&config.tools.yt_dlp);
        let mut fetchers = FetcherRegistry::new();

        if config.youtube.enabled {
            let youtube = YoutubeFetcher::with_cookies(ytdlp.clone(), &config.youtube.cookies, work_dir)?;
            fetchers.register(Arc::new(youtube));
        } else {
            tracing::info!("YouTube source disabled");
        }

        if config.instagram.enabled {
            if config.instagram.username.is_none() || config.instagram.password.is_none() {
                tracing::warn!("Instagram enabled without credentials, Instagram requests will fail");
            }
            fetchers.register(Arc::new(InstagramFetcher::new(
                ytdlp,
                config.instagram.username.clone(),
                config.instagram.password.clone(),
            )));
        } else {
            tracing::info!("Instagram source disabled");
        }

        let transcoder = Arc::new(FfmpegTranscoder::new(&config.tools.ffmpeg));
        let forwarder = Arc::new(HttpForwarder::new(&config.forward.url, config.forward_timeout())?);

        Ok(Self::new(
            PipelineSettings::from_config(config),
            gate,
            fetchers,
            transcoder,
            forwarder,
        ))
    }

    pub fn gate(&self) -> &BackoffGate {
        &self.gate
    }

    pub fn fetchers(&self) -> &FetcherRegistry {
        &self.fetchers
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one request end to end, returning the downstream payload
    pub async fn process(&self, url: Option<&str>) -> Result<Value, RelayError> {
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let span = tracing::info_span!("pipeline", request_id = %&request_id[..8]);

        async {
            let mut stage = Stage::Init;
            let result = self.execute(url, &mut stage).await;

            match &result {
                Ok(_) => tracing::info!("Pipeline finished"),
                Err(e) => tracing::warn!(
                    stage = %stage,
                    status = e.status_code(),
                    error = %e,
                    "Pipeline failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, url: Option<&str>, stage: &mut Stage) -> Result<Value, RelayError> {
        let url = url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| RelayError::InvalidInput("url must be a non-empty string".to_string()))?;

        advance(stage, Stage::Classifying);
        let source = classify(url);
        let fetcher = self.fetcher_for(source, url)?;
        tracing::info!(source = %source, url = %url, "Processing URL");

        fetcher
            .ready()
            .map_err(|e| self.fetch_error(RetryError::Failed(e)))?;

        self.ensure_disk_space()?;

        let artifacts = TempArtifacts::new(&self.settings.work_dir);
        let result = self.run_stages(url, fetcher, &artifacts, stage).await;
        // A cancelled run never gets here; dropping `artifacts` cleans up instead.
        artifacts.release().await;
        result
    }

    async fn run_stages(
        &self,
        url: &str,
        fetcher: &dyn MediaFetcher,
        artifacts: &TempArtifacts,
        stage: &mut Stage,
    ) -> Result<Value, RelayError> {
        advance(stage, Stage::Fetching);
        let video = artifacts.video();
        with_backoff(&self.gate, &self.settings.retry, || fetcher.fetch(url, video))
            .await
            .map_err(|e| self.fetch_error(e))?;

        advance(stage, Stage::Transcoding);
        self.transcoder
            .to_mp3(artifacts.video(), artifacts.audio(), self.settings.bitrate_kbps)
            .await
            .map_err(|e| RelayError::TranscodeFailed(format!("{:#}", e)))?;

        advance(stage, Stage::Validating);
        let size = validate_output(artifacts.audio(), self.settings.max_output_bytes)
            .await
            .map_err(RelayError::OutputInvalid)?;
        tracing::info!(bytes = size, "MP3 ready");

        advance(stage, Stage::Forwarding);
        let payload = self
            .forwarder
            .forward(artifacts.audio())
            .await
            .map_err(|e| RelayError::ForwardFailed(format!("{:#}", e)))?;

        advance(stage, Stage::Done);
        Ok(payload)
    }

    fn fetcher_for(&self, source: SourceKind, url: &str) -> Result<&dyn MediaFetcher, RelayError> {
        match source {
            SourceKind::Unsupported => Err(RelayError::UnsupportedSource(url.to_string())),
            kind => self.fetchers.get(kind).ok_or(RelayError::SourceDisabled(kind)),
        }
    }

    fn ensure_disk_space(&self) -> Result<(), RelayError> {
        let required = self.settings.min_free_bytes;

        match crate::utils::get_available_space(&self.settings.work_dir) {
            Ok(available) if available < required => {
                tracing::warn!(available, required, "Low disk space");
                Err(RelayError::InsufficientSpace { available, required })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to check disk space, continuing");
                Ok(())
            }
        }
    }

    fn fetch_error(&self, error: RetryError<FetchError>) -> RelayError {
        match error {
            RetryError::BackoffActive { remaining_secs } => RelayError::BackoffActive { remaining_secs },
            RetryError::Exhausted { last_error, .. } => RelayError::RateLimited {
                retry_after_secs: self.gate.cooldown().as_secs(),
                message: last_error.to_string(),
            },
            RetryError::Failed(FetchError::CredentialsMissing(message)) => {
                RelayError::CredentialsMissing(message)
            }
            RetryError::Failed(other) => RelayError::FetchFailed(other.to_string()),
        }
    }
}

/// Check the transcoded file before it is allowed downstream; returns its size
pub async fn validate_output(path: &Path, max_bytes: u64) -> Result<u64, OutputProblem> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(OutputProblem::Missing),
    };

    match metadata.len() {
        0 => Err(OutputProblem::Empty),
        size if size > max_bytes => Err(OutputProblem::Oversized {
            size,
            limit: max_bytes,
        }),
        size => Ok(size),
    }
}
