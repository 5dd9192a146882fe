//! Retry with exponential backoff for transient network failures.
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Exponential backoff policy: attempt `n` (1-based) sleeps
/// `base_delay * 2^(n-1)` before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            // A policy that never attempts is useless; floor at one try.
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retrying after the given 1-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `operation` up to `max_attempts` times, retrying only errors for
    /// which `is_retryable` returns true. The final error is returned as-is;
    /// intermediate failures are logged at `warn`.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        target: "sii::retry",
                        "{label} attempt {attempt}/{max} failed: {err}; retrying in {delay:?}",
                        max = self.max_attempts,
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
