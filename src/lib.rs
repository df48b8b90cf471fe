//! # api-resilience
//!
//! Client-side resilience layer for calls to a third-party, rate-limited remote API.
//!
//! ## Overview
//!
//! Every outbound call goes through three independent pieces:
//!
//! - **Throttling**: a token-bucket [`RateLimiter`] keeps the request rate under
//!   the remote API's published limit (60 requests/minute by default)
//! - **Backoff**: a [`RetryPolicy`] retries calls that failed because the remote
//!   side throttled them, doubling the delay each time
//! - **Memoization**: a [`CacheRegistry`] of TTL-bounded LRU caches, one per
//!   result category, avoids repeating calls whose answer is still fresh
//!
//! The [`Guard`] composes them in the usual order: fingerprint the request,
//! consult the category cache, and on a miss acquire a token, run the remote
//! operation under the retry policy, and cache the result.
//!
//! The remote operation itself is opaque: any `FnMut() -> impl Future<Output = Result<T>>`.
//! Failures it reports as [`Error::Remote`] are classified by status code,
//! provider code, and (as a fallback) message text; see [`error_code`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use api_resilience::{CacheCategory, Error, Guard, RemoteError, ResilienceConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> api_resilience::Result<()> {
//!     let guard = Guard::new(&ResilienceConfig::from_env().await?)?;
//!
//!     let key = guard.fingerprint("subreddit_info", &json!({"name": "rust"}));
//!     let about: String = guard
//!         .fetch(CacheCategory::Metadata, &key, || async {
//!             // perform one request; map HTTP failures to RemoteError
//!             Err(Error::Remote(RemoteError::new(429, "Too Many Requests")))
//!         })
//!         .await?;
//!     println!("{about}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`resilience`] | Token-bucket limiter and rate-limit backoff |
//! | [`cache`] | TTL-LRU caches, the category registry and request fingerprints |
//! | [`error_code`] | Failure classification |
//! | [`config`] | Serde configuration with defaults |
//! | [`guard`] | The composed layer |

pub mod cache;
pub mod config;
pub mod error_code;
pub mod guard;
pub mod resilience;

pub use cache::{CacheCategory, CacheKey, CacheKeyGenerator, CacheRegistry, CacheStats, TtlLruCache};
pub use config::ResilienceConfig;
pub use error_code::{FailureKind, RemoteError};
pub use guard::{Guard, GuardStats};
pub use resilience::{
    run_with_backoff, RateLimiter, RateLimiterConfig, RateLimiterStats, RetryConfig, RetryPolicy,
};
pub use tokio_util::sync::CancellationToken;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
