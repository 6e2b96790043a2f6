//! Bounded retry with exponential backoff

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Longest sleep between two attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Retry policy for a single tool invocation
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy making at most `max_attempts` attempts
    #[must_use]
    pub fn new(max_attempts: u32, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_factor,
        }
    }

    /// Maximum number of attempts
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep before the attempt following `attempt_index` (0-based), capped
    /// at [`MAX_BACKOFF`]
    #[must_use]
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let exp = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_factor.powi(exp))
            .map_or(MAX_BACKOFF, |wait| wait.min(MAX_BACKOFF))
    }

    /// Run `attempt` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Retryable errors (see [`crate::Error::is_retryable`]) are retried after
    /// a backoff sleep; any other error aborts immediately. Every failure ends
    /// as `None`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for index in 0..self.max_attempts {
            match attempt().await {
                Ok(value) => return value,
                Err(e) if e.is_retryable() => {
                    if index + 1 < self.max_attempts {
                        let wait = self.backoff(index);
                        tracing::debug!(
                            "Attempt {} failed, retrying in {:?}: {e}",
                            index + 1,
                            wait
                        );
                        tokio::time::sleep(wait).await;
                    } else {
                        tracing::error!("All {} attempts failed for {label}: {e}", self.max_attempts);
                    }
                }
                Err(e) => {
                    tracing::error!("Non-retryable error for {label}: {e}");
                    return None;
                }
            }
        }
        None
    }
}
