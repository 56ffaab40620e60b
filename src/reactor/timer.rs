use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;

/// Injected clock used for request deadlines and drain ticks. `now` and
/// `sleep` must agree: sleeping for `d` advances `now` by at least `d`.
pub trait Timer: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Timer backed by the tokio runtime clock. Under `start_paused` tests the
/// clock auto-advances, which makes deadline tests deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Per-reactor request deadline settings, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeoutConfiguration {
    pub request_timeout_ms: i64,
    pub grace_delay_ms: u64,
}

impl Default for RequestTimeoutConfiguration {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            grace_delay_ms: 30,
        }
    }
}

impl RequestTimeoutConfiguration {
    #[must_use]
    pub const fn new(request_timeout_ms: i64, grace_delay_ms: u64) -> Self {
        Self {
            request_timeout_ms,
            grace_delay_ms,
        }
    }

    /// Deadline for the API stages, or `None` when `request_timeout_ms <= 0`
    /// (no deadline: long-polling and streaming APIs rely on this).
    #[must_use]
    pub fn budget(&self) -> Option<Duration> {
        u64::try_from(self.request_timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(|ms| Duration::from_millis(ms.saturating_add(self.grace_delay_ms)))
    }

    #[must_use]
    pub const fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    /// What is left of the deadline after `elapsed`, never less than the grace delay.
    #[must_use]
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.budget()
            .map(|budget| budget.saturating_sub(elapsed).max(self.grace_delay()))
    }
}
