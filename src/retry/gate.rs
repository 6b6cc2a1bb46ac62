use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Default cooldown after the upstream flags us as a bot or rate limits us
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(20 * 60);

/// Returned by [`BackoffGate::check`] while the cooldown window is still open
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("backoff active, {remaining_secs}s remaining")]
pub struct BackoffActive {
    pub remaining_secs: u64,
}

/// Process-wide circuit breaker for upstream abuse signals.
///
/// One instance is shared by every in-flight request: the upstream block applies to the
/// whole process (one IP, one credential set), so a signal seen by any request closes
/// the gate for all of them until the cooldown elapses.
///
/// The last signal is kept as milliseconds since `origin` plus one (zero means "never
/// signaled") in a single atomic. Recording uses `fetch_max`, so racing recorders can
/// only move the stored time forward.
#[derive(Debug)]
pub struct BackoffGate {
    origin: Instant,
    cooldown: Duration,
    last_signal: AtomicU64,
}

impl BackoffGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            origin: Instant::now(),
            cooldown,
            last_signal: AtomicU64::new(0),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Mark "now" as the time of the most recent rate-limit signal
    pub fn record_signal(&self) {
        let stamp = self.now_stamp();
        let previous = self.last_signal.fetch_max(stamp, Ordering::AcqRel);
        tracing::warn!(
            cooldown_secs = self.cooldown.as_secs(),
            previously_signaled = previous != 0,
            "Upstream rate limit recorded, closing fetch gate"
        );
    }

    /// Time left before fetches are allowed again, `None` when the gate is open
    pub fn remaining(&self) -> Option<Duration> {
        let last = self.last_signal.load(Ordering::Acquire);
        if last == 0 {
            return None;
        }

        let since = Duration::from_millis(self.now_stamp().saturating_sub(last));
        self.cooldown.checked_sub(since).filter(|left| !left.is_zero())
    }

    /// Fail fast while the cooldown window is open
    pub fn check(&self) -> Result<(), BackoffActive> {
        match self.remaining() {
            Some(left) => Err(BackoffActive {
                remaining_secs: ceil_secs(left),
            }),
            None => Ok(()),
        }
    }

    fn now_stamp(&self) -> u64 {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX - 1) + 1
    }
}

impl Default for BackoffGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    millis.div_ceil(1000)
}
