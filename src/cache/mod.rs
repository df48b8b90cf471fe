//! # Response Caching Module
//!
//! Bounded, time-expiring memo of prior remote results, so repeated requests
//! do not spend rate-limit budget.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TtlLruCache`] | Thread-safe LRU cache with per-entry TTL and hit/miss stats |
//! | [`CacheRegistry`] | One cache per [`CacheCategory`], each with its own TTL |
//! | [`CacheKey`] | Request fingerprint |
//! | [`CacheKeyGenerator`] | Deterministic fingerprints from request parameters |
//!
//! ## Example
//!
//! ```rust
//! use api_resilience::cache::{CacheCategory, CacheKeyGenerator, CacheRegistry};
//! use serde_json::json;
//!
//! let registry: CacheRegistry = CacheRegistry::default();
//! let key = CacheKeyGenerator::new().generate("search", &json!({"query": "rust", "limit": 25}));
//!
//! registry.set(CacheCategory::Queries, key.clone(), json!(["post-1", "post-2"]));
//! assert!(registry.get(CacheCategory::Queries, &key).is_some());
//! ```
//!
//! Expiry is lazy: stale entries are dropped when a lookup finds them.

mod key;
mod registry;
mod ttl_lru;

pub use key::{CacheKey, CacheKeyGenerator};
pub use registry::{CacheCategory, CacheRegistry};
pub use ttl_lru::{CacheStats, TtlLruCache};
