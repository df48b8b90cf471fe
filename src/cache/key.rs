//! Cache key generation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Request fingerprint used to address a cache.
///
/// Equality and hashing use `hash` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    /// Operation the fingerprint was derived from, for diagnostics only.
    pub operation: Option<String>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into(), operation: None }
    }
    pub fn with_operation(mut self, op: impl Into<String>) -> Self { self.operation = Some(op.into()); self }
    pub fn as_str(&self) -> &str { &self.hash }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool { self.hash == other.hash }
}

impl Eq for CacheKey {}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { std::hash::Hash::hash(&self.hash, state) }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.hash) }
}

impl From<&str> for CacheKey { fn from(s: &str) -> Self { Self::new(s) } }
impl From<String> for CacheKey { fn from(s: String) -> Self { Self::new(s) } }

/// Derives deterministic [`CacheKey`]s from an operation name and its parameters.
///
/// Object keys are sorted recursively before hashing, so parameter order never
/// changes the fingerprint.
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self { Self { salt: None } }
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self { self.salt = Some(salt.into()); self }

    pub fn generate(&self, operation: &str, params: &Value) -> CacheKey {
        let mut parts: BTreeMap<&str, Value> = BTreeMap::new();
        parts.insert("operation", Value::String(operation.to_string()));
        parts.insert("params", canonicalize(params));
        if let Some(ref s) = self.salt { parts.insert("salt", Value::String(s.clone())); }
        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();
        CacheKey::new(hash).with_operation(operation)
    }

    /// Fingerprint any serializable parameter struct.
    pub fn generate_for<P: Serialize>(&self, operation: &str, params: &P) -> crate::Result<CacheKey> {
        let value = serde_json::to_value(params)?;
        Ok(self.generate(operation, &value))
    }
}

impl Default for CacheKeyGenerator { fn default() -> Self { Self::new() } }

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
