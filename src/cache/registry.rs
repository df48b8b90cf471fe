//! Named caches, one per result category.

use super::key::CacheKey;
use super::ttl_lru::{CacheStats, TtlLruCache};
use crate::config::{CacheSettings, CachesConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Result categories with their own capacity and time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    /// Short-lived detail content (e.g. a thread and its comments).
    Details,
    /// Slow-changing metadata (e.g. community descriptions).
    Metadata,
    /// Query result sets.
    Queries,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 3] = [Self::Details, Self::Metadata, Self::Queries];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::Metadata => "metadata",
            Self::Queries => "queries",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct NamedCache<V> {
    cache: TtlLruCache<CacheKey, V>,
    ttl: Duration,
}

impl<V: Clone> NamedCache<V> {
    fn new(settings: &CacheSettings) -> Self {
        Self {
            cache: TtlLruCache::new(settings.capacity),
            ttl: settings.ttl(),
        }
    }
}

/// Fixed set of caches keyed by [`CacheCategory`].
///
/// Built once by its owner (usually a [`crate::Guard`]) and shared by reference;
/// there is no process-wide instance.
pub struct CacheRegistry<V = Value> {
    details: NamedCache<V>,
    metadata: NamedCache<V>,
    queries: NamedCache<V>,
}

impl<V: Clone> CacheRegistry<V> {
    pub fn new(cfg: &CachesConfig) -> Self {
        Self {
            details: NamedCache::new(&cfg.details),
            metadata: NamedCache::new(&cfg.metadata),
            queries: NamedCache::new(&cfg.queries),
        }
    }

    fn slot(&self, category: CacheCategory) -> &NamedCache<V> {
        match category {
            CacheCategory::Details => &self.details,
            CacheCategory::Metadata => &self.metadata,
            CacheCategory::Queries => &self.queries,
        }
    }

    pub fn cache(&self, category: CacheCategory) -> &TtlLruCache<CacheKey, V> {
        &self.slot(category).cache
    }

    /// Default time-to-live for entries stored under `category`.
    pub fn ttl(&self, category: CacheCategory) -> Duration {
        self.slot(category).ttl
    }

    pub fn get(&self, category: CacheCategory, key: &CacheKey) -> Option<V> {
        self.cache(category).get(key)
    }

    /// Store `value` with the category's TTL.
    pub fn set(&self, category: CacheCategory, key: CacheKey, value: V) {
        let slot = self.slot(category);
        slot.cache.set(key, value, slot.ttl);
    }

    pub fn clear_all(&self) {
        for category in CacheCategory::ALL {
            self.cache(category).clear();
        }
    }

    pub fn stats_all(&self) -> BTreeMap<&'static str, CacheStats> {
        CacheCategory::ALL
            .iter()
            .map(|category| (category.name(), self.cache(*category).stats()))
            .collect()
    }
}

impl<V: Clone> Default for CacheRegistry<V> {
    fn default() -> Self {
        Self::new(&CachesConfig::default())
    }
}
