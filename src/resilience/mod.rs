//! # Resilience Primitives Module
//!
//! Throttling and retry primitives for calls to a rate-limited remote API.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Token bucket limiter, FIFO admission, lazy refill |
//! | [`backoff`] | Exponential backoff that retries only rate-limited failures |
//!
//! ## Rate Limiter
//!
//! ```rust
//! use api_resilience::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let config = RateLimiterConfig::new()
//!     .with_max_requests(60)
//!     .with_window(Duration::from_secs(60));
//! let limiter = RateLimiter::new(config);
//!
//! limiter.acquire().await; // suspends when the bucket is empty
//! # }
//! ```
//!
//! ## Backoff
//!
//! ```rust
//! use api_resilience::resilience::backoff::run_with_backoff;
//! use std::time::Duration;
//!
//! # async fn demo() -> api_resilience::Result<()> {
//! let body = run_with_backoff(
//!     || async { Ok::<_, api_resilience::Error>("response body") },
//!     5,
//!     Duration::from_millis(1000),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod rate_limiter;

pub use backoff::{run_with_backoff, RetryConfig, RetryPolicy, MAX_DELAY};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterStats};
