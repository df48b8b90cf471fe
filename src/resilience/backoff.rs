//! Exponential backoff for rate-limited remote calls.

use crate::error_code::FailureKind;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound for a single backoff delay.
pub const MAX_DELAY: Duration = Duration::from_millis(64_000);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts allowed, including the first one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(1_000),
            max_delay: MAX_DELAY,
        }
    }
}

impl RetryConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }
}

/// Retries an operation while it keeps failing with [`FailureKind::RateLimited`].
///
/// Any other failure is returned as-is on first occurrence. When every attempt
/// was rate limited, the last failure is surfaced as [`Error::RateLimited`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    cfg: RetryConfig,
}

impl RetryPolicy {
    pub fn new(cfg: RetryConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.cfg
    }

    /// Attempts per call; zero is treated as a single attempt.
    pub fn max_attempts(&self) -> u32 {
        self.cfg.max_retries.max(1)
    }

    /// Delay before retry number `retry` (0-based): `initial * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.cfg
            .initial_delay
            .saturating_mul(factor)
            .min(self.cfg.max_delay)
    }

    /// Delays slept between attempts when every attempt is rate limited.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts() - 1).map(move |retry| self.delay_for(retry))
    }

    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_admitted(admit_all, op, None).await
    }

    /// Like [`run`](Self::run), but a cancelled token aborts any pending backoff
    /// delay (and any attempt not yet started) with [`Error::Cancelled`].
    ///
    /// The token is not raced against an attempt already in flight; pass it to
    /// the operation itself for that.
    pub async fn run_cancellable<T, F, Fut>(&self, op: F, cancel: &CancellationToken) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_admitted(admit_all, op, Some(cancel)).await
    }

    /// Awaits `admit` before each attempt. `op` is only invoked once `admit`
    /// has succeeded; an `admit` failure ends the call unchanged.
    pub(crate) async fn run_admitted<T, A, AFut, F, Fut>(
        &self,
        mut admit: A,
        mut op: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T>
    where
        A: FnMut() -> AFut,
        AFut: Future<Output = Result<()>>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0u32;
        loop {
            if cancel.map_or(false, |c| c.is_cancelled()) {
                return Err(Error::cancelled("backoff"));
            }
            admit().await?;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;

            if err.failure_kind() != FailureKind::RateLimited {
                debug!(attempt, error = %err, "non-retryable failure");
                return Err(err);
            }
            if attempt >= max_attempts {
                debug!(attempts = attempt, error = %err, "rate limited on every attempt");
                return Err(exhausted(err, attempt));
            }

            let delay = self.delay_for(attempt - 1);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "rate limited, backing off"
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(Error::cancelled("backoff")),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

async fn admit_all() -> Result<()> {
    Ok(())
}

fn exhausted(err: Error, attempts: u32) -> Error {
    match err {
        Error::Remote(source) | Error::RateLimited { source, .. } => {
            Error::RateLimited { attempts, source }
        }
        other => other,
    }
}

/// Run `op` with up to `max_retries` attempts, starting at `initial_delay`.
///
/// Delays double after each rate-limited failure, capped at [`MAX_DELAY`].
pub async fn run_with_backoff<T, F, Fut>(op: F, max_retries: u32, initial_delay: Duration) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryPolicy::new(
        RetryConfig::new()
            .with_max_retries(max_retries)
            .with_initial_delay(initial_delay),
    )
    .run(op)
    .await
}
