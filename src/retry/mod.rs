//! Rate-limit aware retry with exponential backoff
//!
//! Upstream media hosts answer scraping with bot checks and 429s. Those are worth waiting
//! out a few times; everything else (bad URL, private video, missing credentials) is
//! returned straight away. When the final attempt is still rate limited the shared
//! [`gate::BackoffGate`] is closed so other requests stop hammering the upstream.

use std::future::Future;
use std::time::Duration;

pub mod gate;

use gate::BackoffGate;

/// Classifies an error as an upstream abuse signal
pub trait RateLimitSignal {
    /// True for bot-detection and 429-style failures
    fn is_rate_limited(&self) -> bool;
}

/// How many times to try and how long to wait between rate-limited attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(10),
        }
    }
}

/// Outcome of a failed [`with_backoff`] call
#[derive(thiserror::Error, Debug)]
pub enum RetryError<E> {
    /// The gate was closed; the operation was never invoked
    #[error("rate limit backoff active, {remaining_secs}s remaining")]
    BackoffActive { remaining_secs: u64 },

    /// Every attempt was rate limited; the gate has been closed
    #[error("rate limited after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// A failure that retrying cannot fix
    #[error("{0}")]
    Failed(E),
}

/// Run `operation` under `policy`, consulting and feeding `gate`.
///
/// The gate is checked once, before the first attempt. Rate-limited failures sleep for
/// the current delay and double it; the last rate-limited failure records a signal on
/// the gate before it is returned.
pub async fn with_backoff<F, Fut, T, E>(
    gate: &BackoffGate,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitSignal + std::fmt::Display,
{
    if let Err(closed) = gate.check() {
        tracing::warn!(
            remaining_secs = closed.remaining_secs,
            "Fetch refused, rate limit backoff active"
        );
        return Err(RetryError::BackoffActive {
            remaining_secs: closed.remaining_secs,
        });
    }

    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() && attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) if e.is_rate_limited() => {
                tracing::error!(
                    error = %e,
                    attempts = attempt,
                    "Still rate limited after all attempts"
                );
                gate.record_signal();
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
            Err(e) => {
                tracing::debug!(error = %e, attempt = attempt, "Operation failed, not retryable");
                return Err(RetryError::Failed(e));
            }
        }
    }
}
