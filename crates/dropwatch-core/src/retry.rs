//! Bounded retry with exponential backoff
//!
//! Handlers that perform remote or otherwise transient work wrap that work in
//! [`RetryPolicy::run`]. The policy makes one initial attempt and up to
//! `attempts` retries. Before retry `i` it sleeps `base * e^(i-1)`, so with the
//! default 5 second base the waits are roughly 5s, 13.6s, 36.9s.
//!
//! Only [`HandlerError::Transient`] failures are retried. A fatal failure is
//! returned immediately; running out of retries yields
//! [`HandlerError::Exhausted`]. The attempt counter and delays live on the
//! stack of a single `run` call and are never shared across files.

use std::{future::Future, time::Duration};

use tracing::{debug, error, info, warn};

use crate::errors::HandlerError;

/// Default number of retries after the initial attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default backoff base.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Retry schedule for one handler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_BACKOFF_BASE)
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `attempts` retries with the given backoff base
    pub fn new(attempts: u32, base: Duration) -> Self {
        Self { attempts, base }
    }

    /// Number of retries after the initial attempt
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Backoff base
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay before retry number `retry` (1-based): `base * e^(retry-1)`
    ///
    /// Saturates at [`Duration::MAX`].
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = f64::from(retry.saturating_sub(1));
        Duration::try_from_secs_f64(self.base.as_secs_f64() * exponent.exp())
            .unwrap_or(Duration::MAX)
    }

    /// Delays before each retry, in order
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.attempts).map(|retry| self.delay_for(retry))
    }

    /// Runs `operation` until it succeeds, fails fatally or retries run out
    ///
    /// `operation` receives the 1-based attempt number. `subject` identifies
    /// the work in log records (usually the file path).
    pub async fn run<T, F, Fut>(&self, subject: &str, mut operation: F) -> Result<T, HandlerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, HandlerError>>,
    {
        let total = self.attempts.saturating_add(1);
        let mut attempt = 1;

        loop {
            debug!(subject, attempt, total, "Starting attempt");

            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(subject, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < total => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        subject,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    error!(subject, attempts = attempt, error = %err, "Retries exhausted");
                    return Err(HandlerError::Exhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    error!(subject, attempt, error = %err, "Fatal failure, not retrying");
                    return Err(err);
                }
            }
        }
    }
}
