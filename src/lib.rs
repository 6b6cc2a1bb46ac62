//! SceneFinder relay - extracts the audio track of a social-media video and forwards it
//!
//! The library exposes the request pipeline (classification, rate-limit aware fetching,
//! transcoding, validation and forwarding) together with the HTTP API that drives it.

pub mod api;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod forward;
pub mod pipeline;
pub mod retry;
pub mod transcode;
pub mod utils;

#[cfg(all(test, unix))]
mod test_support;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{FetchError, FetcherRegistry, MediaFetcher, SourceKind};
pub use forward::{Forwarder, HttpForwarder};
pub use pipeline::{Pipeline, PipelineSettings};
pub use retry::{gate::BackoffGate, RetryPolicy};
pub use transcode::{FfmpegTranscoder, Transcoder};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Why a transcoded file was refused before forwarding
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputProblem {
    #[error("MP3 file is missing")]
    Missing,

    #[error("MP3 file is empty")]
    Empty,

    #[error(
        "MP3 exceeds {} limit: {}",
        utils::format_file_size(*.limit),
        utils::format_file_size(*.size)
    )]
    Oversized { size: u64, limit: u64 },
}

/// Errors a pipeline run can end with. Each one maps to exactly one HTTP status.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("Invalid or missing URL: {0}")]
    InvalidInput(String),

    #[error("Unsupported URL. Only YouTube and Instagram are supported: {0}")]
    UnsupportedSource(String),

    #[error("{0} processing is currently disabled")]
    SourceDisabled(SourceKind),

    #[error("Insufficient disk space: {available} bytes available, {required} required")]
    InsufficientSpace { available: u64, required: u64 },

    #[error("Rate limit or bot detection backoff active. Please wait {remaining_secs} seconds.")]
    BackoffActive { remaining_secs: u64 },

    #[error("Bot detection or rate limit exceeded. Please try again later. ({message})")]
    RateLimited { retry_after_secs: u64, message: String },

    #[error("Media fetch failed: {0}")]
    FetchFailed(String),

    #[error("Transcoding failed: {0}")]
    TranscodeFailed(String),

    #[error("Invalid output: {0}")]
    OutputInvalid(OutputProblem),

    #[error("Forwarding failed: {0}")]
    ForwardFailed(String),

    #[error("Credentials missing: {0}")]
    CredentialsMissing(String),
}

impl RelayError {
    /// HTTP status code reported to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidInput(_) | RelayError::UnsupportedSource(_) => 400,
            RelayError::BackoffActive { .. } | RelayError::RateLimited { .. } => 429,
            RelayError::SourceDisabled(_) => 503,
            RelayError::InsufficientSpace { .. }
            | RelayError::FetchFailed(_)
            | RelayError::TranscodeFailed(_)
            | RelayError::OutputInvalid(_)
            | RelayError::ForwardFailed(_)
            | RelayError::CredentialsMissing(_) => 500,
        }
    }

    /// Seconds a client should wait before retrying, for the 429 family
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RelayError::BackoffActive { remaining_secs } => Some(*remaining_secs),
            RelayError::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
