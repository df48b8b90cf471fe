//! The composed resilience layer handed to callers.

use crate::cache::{CacheCategory, CacheKey, CacheKeyGenerator, CacheRegistry, CacheStats};
use crate::config::ResilienceConfig;
use crate::resilience::backoff::RetryPolicy;
use crate::resilience::rate_limiter::{RateLimiter, RateLimiterStats};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Combined statistics for the limiter and every cache.
#[derive(Debug, Clone, Serialize)]
pub struct GuardStats {
    pub limiter: RateLimiterStats,
    pub caches: BTreeMap<&'static str, CacheStats>,
}

struct GuardInner {
    limiter: RateLimiter,
    retry: RetryPolicy,
    caches: CacheRegistry,
    keys: CacheKeyGenerator,
}

/// Owns one limiter, one retry policy and one cache registry.
///
/// Cloning is cheap and every clone shares the same state, so a single
/// `Guard` built at startup (or per test) can be handed to every caller.
///
/// ```rust,no_run
/// use api_resilience::{CacheCategory, Guard, ResilienceConfig};
/// use serde_json::json;
///
/// # async fn demo() -> api_resilience::Result<()> {
/// let guard = Guard::new(&ResilienceConfig::default())?;
/// let key = guard.fingerprint("search", &json!({"query": "rust", "limit": 25}));
///
/// let posts: Vec<String> = guard
///     .fetch(CacheCategory::Queries, &key, || async {
///         // one network request + parse
///         Ok(vec!["post-1".to_string()])
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Guard {
    inner: Arc<GuardInner>,
}

impl Guard {
    pub fn new(cfg: &ResilienceConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self::build(cfg))
    }

    fn build(cfg: &ResilienceConfig) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                limiter: RateLimiter::new(cfg.limiter_config()),
                retry: RetryPolicy::new(cfg.retry_config()),
                caches: CacheRegistry::new(&cfg.caches),
                keys: CacheKeyGenerator::new(),
            }),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub fn caches(&self) -> &CacheRegistry {
        &self.inner.caches
    }

    /// Cache key for `operation` called with `params`.
    pub fn fingerprint(&self, operation: &str, params: &serde_json::Value) -> CacheKey {
        self.inner.keys.generate(operation, params)
    }

    /// Run `op` under the retry policy, taking one limiter token per attempt.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.call_inner(op, None).await
    }

    /// Like [`call`](Self::call); `cancel` aborts a pending token wait or backoff delay.
    pub async fn call_cancellable<T, F, Fut>(&self, op: F, cancel: &CancellationToken) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.call_inner(op, Some(cancel)).await
    }

    async fn call_inner<T, F, Fut>(&self, op: F, cancel: Option<&CancellationToken>) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limiter = &self.inner.limiter;
        let admit = move || async move {
            match cancel {
                Some(token) => limiter.acquire_cancellable(token).await,
                None => {
                    limiter.acquire().await;
                    Ok(())
                }
            }
        };
        self.inner.retry.run_admitted(admit, op, cancel).await
    }

    /// Serve from the `category` cache, or call `op` and cache its result.
    ///
    /// Failures are never cached.
    pub async fn fetch<T, F, Fut>(&self, category: CacheCategory, key: &CacheKey, op: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.fetch_inner(category, key, op, None).await
    }

    pub async fn fetch_cancellable<T, F, Fut>(
        &self,
        category: CacheCategory,
        key: &CacheKey,
        op: F,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.fetch_inner(category, key, op, Some(cancel)).await
    }

    async fn fetch_inner<T, F, Fut>(
        &self,
        category: CacheCategory,
        key: &CacheKey,
        op: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let caches = &self.inner.caches;
        if let Some(cached) = caches.get(category, key) {
            match serde_json::from_value::<T>(cached) {
                Ok(value) => {
                    trace!(category = %category, key = %key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(category = %category, key = %key, error = %e, "dropping undecodable cache entry");
                    caches.cache(category).delete(key);
                }
            }
        }

        trace!(category = %category, key = %key, "cache miss");
        let value = self.call_inner(op, cancel).await?;
        caches.set(category, key.clone(), serde_json::to_value(&value)?);
        Ok(value)
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            limiter: self.inner.limiter.stats(),
            caches: self.inner.caches.stats_all(),
        }
    }

    /// Refill the limiter and empty every cache.
    pub fn reset(&self) {
        self.inner.limiter.reset();
        self.inner.caches.clear_all();
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::build(&ResilienceConfig::default())
    }
}
