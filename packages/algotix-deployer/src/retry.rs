//! Bounded exponential backoff around a single ledger call.
//!
//! The policy is stateless: wrap exactly one RPC per invocation. It retries
//! only errors its classifier accepts (by default [`Error::is_rate_limited`])
//! and sleeps `2^attempt` time units between attempts, `attempt` counting
//! from 1. Everything else propagates on the spot.

use crate::error::Error;
use crate::metrics::METRICS;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default backoff time unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Retry policy: attempt budget, time unit, optional cancellation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    cancel: Option<CancellationToken>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            cancel: None,
        }
    }

    pub fn from_config(config: &crate::Config) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// Abort with [`Error::Cancelled`] if `token` fires during a backoff sleep.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep before the retry that follows failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op`, retrying rate-limit failures.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.run_if(operation, Error::is_rate_limited, op).await
    }

    /// Run `op`, retrying the failures `is_transient` accepts.
    pub async fn run_if<T, F, Fut, C>(
        &self,
        operation: &str,
        is_transient: C,
        mut op: F,
    ) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
        C: Fn(&Error) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_transient(&err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient ledger error, backing off"
                    );
                    METRICS.retries.fetch_add(1, Ordering::Relaxed);
                    self.sleep(delay).await?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<(), Error> {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

/// Run `op` under the default time unit with `max_attempts` attempts.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    RetryPolicy::new(max_attempts, DEFAULT_BASE_DELAY)
        .run("ledger call", op)
        .await
}
