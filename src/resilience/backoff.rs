//! Exponential backoff for dependency probes.

use std::time::Duration;

/// Initial wait between failed probe attempts.
pub const DEFAULT_INITIAL: Duration = Duration::from_millis(250);

/// Hard ceiling on the wait between probe attempts.
pub const DEFAULT_MAX: Duration = Duration::from_secs(30);

/// Doubling backoff schedule, capped at `max`.
///
/// Each call to [`Backoff::next_wait`] returns the current wait and doubles
/// the one after it. No jitter: a single probe per dependency cannot cause a
/// thundering herd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a schedule starting at `initial` and capped at `max`.
    ///
    /// `initial` is clamped to `max` so the first wait never exceeds the ceiling.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Return the wait for this attempt and advance the schedule.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        if self.current < self.max {
            self.current = self.current.saturating_mul(2).min(self.max);
        }
        wait
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL, DEFAULT_MAX)
    }
}
