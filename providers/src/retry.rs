//! Bounded retry with fixed backoff.
//!
//! # Retry Policy
//!
//! - Max attempts: 3 (initial attempt included)
//! - Delay between attempts: 5 seconds, constant
//! - No jitter, no exponential growth
//! - No sleep after the final attempt
//!
//! # Retryable Conditions
//!
//! Every [`CompletionError`] kind is retried the same way. A `401` is retried
//! exactly like a dropped connection; there is no per-endpoint failure memory
//! carried between calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{CompletionError, RetryExhausted};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than one.
    max_attempts: u32,
    /// Pause between consecutive attempts.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` of zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `attempt` until it succeeds or the attempt budget is spent.
    ///
    /// The closure receives the 1-based attempt number. The calling task is held
    /// for the whole sequence, sleeps included.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CompletionError>>,
    {
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => {
                    if number > 1 {
                        tracing::info!(attempt = number, "Completion succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if number >= self.max_attempts => {
                    tracing::error!(
                        attempts = number,
                        kind = ?error.kind(),
                        error = %error,
                        "Completion failed, retries exhausted"
                    );
                    return Err(RetryExhausted {
                        attempts: number,
                        last: error,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        attempt = number,
                        max_attempts = self.max_attempts,
                        kind = ?error.kind(),
                        error = %error,
                        delay_ms = self.delay.as_millis(),
                        "Completion attempt failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    number += 1;
                }
            }
        }
    }
}
