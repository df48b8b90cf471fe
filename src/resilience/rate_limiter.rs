use crate::{Error, Result};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Point-in-time view of the limiter counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
    /// Whole tokens currently available (floored).
    pub tokens_available: u64,
    pub max_tokens: u32,
    pub request_count: u64,
    /// Number of `acquire` calls that had to pause for a token.
    pub rate_limit_wait_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Bucket capacity: requests allowed per window.
    pub max_requests: u32,
    /// Window over which `max_requests` tokens are refilled.
    pub window: Duration,
}

impl RateLimiterConfig {
    /// Create a new config with default values (60 requests per minute)
    pub fn new() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_millis(60_000),
        }
    }

    /// Set the bucket capacity
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Set the refill window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Tokens added per millisecond of elapsed time.
    pub fn refill_rate_per_ms(&self) -> f64 {
        let window_ms = (self.window.as_secs_f64() * 1000.0).max(1.0);
        self.max_requests as f64 / window_ms
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last_refill: Instant,
    request_count: u64,
    rate_limit_wait_count: u64,
}

impl State {
    fn full(max_tokens: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: Instant::now(),
            request_count: 0,
            rate_limit_wait_count: 0,
        }
    }
}

/// Token-bucket rate limiter.
///
/// - Tokens refill lazily on each acquisition attempt, never on a timer
/// - Waiters are admitted in arrival order (FIFO)
/// - `stats`/`reset` never wait behind a sleeping acquirer
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    /// Queue of acquirers; tokio's mutex hands the lock out in FIFO order.
    turnstile: tokio::sync::Mutex<()>,
    state: Mutex<State>,
}

impl RateLimiter {
    /// Zero capacities or windows are clamped to the smallest usable value
    /// (1 token, 1 ms); use [`crate::config::ResilienceConfig::validate`] to reject them instead.
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let cfg = RateLimiterConfig {
            max_requests: cfg.max_requests.max(1),
            window: cfg.window.max(Duration::from_millis(1)),
        };
        let state = Mutex::new(State::full(cfg.max_requests as f64));
        Self {
            cfg,
            turnstile: tokio::sync::Mutex::new(()),
            state,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn projected_tokens(&self, st: &State, now: Instant) -> f64 {
        let max = self.cfg.max_requests as f64;
        let elapsed_ms = now.duration_since(st.last_refill).as_secs_f64() * 1000.0;
        (st.tokens + elapsed_ms * self.cfg.refill_rate_per_ms()).min(max)
    }

    fn refill_locked(&self, st: &mut State) {
        let now = Instant::now();
        st.tokens = self.projected_tokens(st, now);
        st.last_refill = now;
    }

    /// Refill, then consume one token if available.
    ///
    /// Returns the time to wait for the next token otherwise.
    fn refill_and_consume(&self) -> Option<(Duration, f64)> {
        let mut st = self.lock_state();
        self.refill_locked(&mut st);
        if st.tokens >= 1.0 {
            st.tokens -= 1.0;
            st.request_count += 1;
            return None;
        }
        let missing_ms = (1.0 - st.tokens) / self.cfg.refill_rate_per_ms();
        Some((Duration::from_secs_f64(missing_ms / 1000.0), st.tokens))
    }

    /// Acquire one token, suspending until one is available.
    pub async fn acquire(&self) {
        // Without a cancellation token the inner loop cannot fail.
        let _ = self.acquire_inner(None).await;
    }

    /// Acquire one token, giving up with [`Error::Cancelled`] if `cancel` fires first.
    pub async fn acquire_cancellable(&self, cancel: &CancellationToken) -> Result<()> {
        self.acquire_inner(Some(cancel)).await
    }

    async fn acquire_inner(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let _turn = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Err(Error::cancelled("rate_limiter")),
            turn = self.turnstile.lock() => turn,
        };

        let mut waited = false;
        loop {
            let (wait, tokens) = match self.refill_and_consume() {
                None => return Ok(()),
                Some(w) => w,
            };

            if !waited {
                waited = true;
                self.lock_state().rate_limit_wait_count += 1;
                warn!(
                    wait_ms = wait.as_millis() as u64,
                    tokens,
                    max_tokens = self.cfg.max_requests,
                    "rate limiter pausing to respect rate limits"
                );
            }

            tokio::select! {
                biased;
                _ = cancelled(cancel) => return Err(Error::cancelled("rate_limiter")),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Try to acquire a token without waiting, returns true if successful.
    ///
    /// Fails while another caller is queued in `acquire`, so it never takes
    /// the token a waiter is sleeping for.
    pub fn try_acquire(&self) -> bool {
        match self.turnstile.try_lock() {
            Ok(_turn) => self.refill_and_consume().is_none(),
            Err(_) => false,
        }
    }

    /// How long an `acquire` issued now would wait, ignoring queued waiters.
    pub fn estimated_wait(&self) -> Duration {
        let st = self.lock_state();
        let tokens = self.projected_tokens(&st, Instant::now());
        if tokens >= 1.0 {
            Duration::ZERO
        } else {
            let missing_ms = (1.0 - tokens) / self.cfg.refill_rate_per_ms();
            Duration::from_secs_f64(missing_ms / 1000.0)
        }
    }

    /// Current token count including refill accrued since the last acquisition.
    pub fn available_tokens(&self) -> f64 {
        let st = self.lock_state();
        self.projected_tokens(&st, Instant::now())
    }

    pub fn stats(&self) -> RateLimiterStats {
        let st = self.lock_state();
        let tokens = self.projected_tokens(&st, Instant::now());
        RateLimiterStats {
            tokens_available: tokens.max(0.0).floor() as u64,
            max_tokens: self.cfg.max_requests,
            request_count: st.request_count,
            rate_limit_wait_count: st.rate_limit_wait_count,
        }
    }

    /// Refill the bucket and zero the counters.
    pub fn reset(&self) {
        *self.lock_state() = State::full(self.cfg.max_requests as f64);
    }
}

async fn cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
