//! Exponential backoff between upload attempts.

use std::time::Duration;

/// Maps a failed attempt number to the wait before the next attempt.
///
/// Attempt `n` failing waits `unit * 2^(n - 1)`: one unit after the first
/// failure, two after the second, four after the third, and so on. There is
/// no jitter. Growth is unbounded unless a clamp is set with
/// [`Backoff::with_max_wait`], so a large retry budget can stall a run for a
/// long time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    unit: Duration,
    max_wait: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Backoff {
    /// Creates an unclamped policy with the given time unit.
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            max_wait: None,
        }
    }

    /// Clamps every wait to at most `max_wait`.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }

    /// Returns how long to wait after attempt `attempt` failed.
    ///
    /// Attempt numbers start at 1; `0` is treated as `1`. Overflow saturates
    /// at [`Duration::MAX`] before the clamp is applied.
    pub fn wait(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let wait = 2u32
            .checked_pow(exp)
            .and_then(|factor| self.unit.checked_mul(factor))
            .unwrap_or(Duration::MAX);
        match self.max_wait {
            Some(max) => wait.min(max),
            None => wait,
        }
    }
}
