//! Bounded retry policy shared by every task

use crate::error::ErrorClass;
use crate::models::RetrySettings;
use std::time::Duration;

/// Fixed-backoff retry policy.
///
/// `max_attempts` counts the first attempt, so the default of 3 means one
/// run plus at most two retries, each 60 seconds after the previous failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.backoff_seconds),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Delay before the next attempt, or `None` when the task is done.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn next_delay(&self, attempt: u32, class: ErrorClass) -> Option<Duration> {
        if class.is_retryable() && attempt < self.max_attempts {
            Some(self.backoff)
        } else {
            None
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BACKOFF)
    }
}
