//! Configuration for the resilience layer.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```yaml
//! limiter:
//!   max_requests: 60
//!   window_ms: 60000
//! retry:
//!   max_retries: 5
//!   initial_delay_ms: 1000
//!   max_delay_ms: 64000
//! caches:
//!   details:  { capacity: 100, ttl_ms: 300000 }
//!   metadata: { capacity: 50,  ttl_ms: 3600000 }
//!   queries:  { capacity: 100, ttl_ms: 600000 }
//! ```

use crate::resilience::backoff::{RetryConfig, MAX_DELAY};
use crate::resilience::rate_limiter::RateLimiterConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable pointing at a YAML or JSON configuration file.
pub const CONFIG_ENV_VAR: &str = "API_RESILIENCE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub limiter: LimiterSettings,
    pub retry: RetrySettings,
    pub caches: CachesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
        }
    }
}

impl From<&LimiterSettings> for RateLimiterConfig {
    fn from(s: &LimiterSettings) -> Self {
        RateLimiterConfig::new()
            .with_max_requests(s.max_requests)
            .with_window(Duration::from_millis(s.window_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per call, including the first.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: MAX_DELAY.as_millis() as u64,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        RetryConfig::new()
            .with_max_retries(s.max_retries)
            .with_initial_delay(Duration::from_millis(s.initial_delay_ms))
            .with_max_delay(Duration::from_millis(s.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl_ms: u64,
}

impl CacheSettings {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Per-category cache settings.
///
/// Each category has its own defaults, so a partial override such as
/// `queries: { capacity: 7 }` keeps the remaining fields of that category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CachesOverrides")]
pub struct CachesConfig {
    pub details: CacheSettings,
    pub metadata: CacheSettings,
    pub queries: CacheSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CacheOverride {
    capacity: Option<usize>,
    ttl_ms: Option<u64>,
}

impl CacheOverride {
    fn apply(self, base: CacheSettings) -> CacheSettings {
        CacheSettings {
            capacity: self.capacity.unwrap_or(base.capacity),
            ttl_ms: self.ttl_ms.unwrap_or(base.ttl_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CachesOverrides {
    details: CacheOverride,
    metadata: CacheOverride,
    queries: CacheOverride,
}

impl From<CachesOverrides> for CachesConfig {
    fn from(o: CachesOverrides) -> Self {
        let base = CachesConfig::default();
        Self {
            details: o.details.apply(base.details),
            metadata: o.metadata.apply(base.metadata),
            queries: o.queries.apply(base.queries),
        }
    }
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            details: CacheSettings::new(100, Duration::from_secs(5 * 60)),
            metadata: CacheSettings::new(50, Duration::from_secs(60 * 60)),
            queries: CacheSettings::new(100, Duration::from_secs(10 * 60)),
        }
    }
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limiter(mut self, max_requests: u32, window: Duration) -> Self {
        self.limiter = LimiterSettings {
            max_requests,
            window_ms: window.as_millis() as u64,
        };
        self
    }

    pub fn with_retry(mut self, max_retries: u32, initial_delay: Duration) -> Self {
        self.retry.max_retries = max_retries;
        self.retry.initial_delay_ms = initial_delay.as_millis() as u64;
        self
    }

    pub fn with_caches(mut self, caches: CachesConfig) -> Self {
        self.caches = caches;
        self
    }

    pub fn limiter_config(&self) -> RateLimiterConfig {
        (&self.limiter).into()
    }

    pub fn retry_config(&self) -> RetryConfig {
        (&self.retry).into()
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a `.json` file, or YAML for any other extension.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Load from the file named by [`CONFIG_ENV_VAR`], or defaults when it is unset.
    pub async fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()).await,
            _ => Ok(Self::default()),
        }
    }

    /// Reject values that would make a component useless.
    pub fn validate(&self) -> Result<()> {
        let positive: [(&str, u64); 10] = [
            ("limiter.max_requests", self.limiter.max_requests as u64),
            ("limiter.window_ms", self.limiter.window_ms),
            ("retry.max_retries", self.retry.max_retries as u64),
            ("retry.max_delay_ms", self.retry.max_delay_ms),
            ("caches.details.capacity", self.caches.details.capacity as u64),
            ("caches.details.ttl_ms", self.caches.details.ttl_ms),
            ("caches.metadata.capacity", self.caches.metadata.capacity as u64),
            ("caches.metadata.ttl_ms", self.caches.metadata.ttl_ms),
            ("caches.queries.capacity", self.caches.queries.capacity as u64),
            ("caches.queries.ttl_ms", self.caches.queries.ttl_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.initial_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, msg: &str) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("config"),
    )
}
