//! Metadata cache seam
//!
//! Driver metadata and lookup lists are cached process-wide. Population is
//! racy on miss; recomputation yields the same value so the last writer wins.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Key/value cache for JSON-shaped metadata
pub trait MetadataCache: Send + Sync {
    fn load(&self, key: &str) -> Option<serde_json::Value>;
    fn save(&self, key: &str, value: serde_json::Value);
}

/// Deterministic cache key for a cached computation
pub fn cache_key(method: &str, parameter: &str) -> String {
    format!("grid:builder:{}:{}", method, parameter)
}

/// In-memory cache backed by a `RwLock<HashMap>`
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance
    pub fn shared() -> Arc<MemoryCache> {
        static SHARED: OnceLock<Arc<MemoryCache>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(MemoryCache::new())).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.entries.write() {
            map.clear();
        }
    }
}

impl MetadataCache for MemoryCache {
    fn load(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn save(&self, key: &str, value: serde_json::Value) {
        match self.entries.write() {
            Ok(mut map) => {
                map.insert(key.to_string(), value);
            }
            Err(_) => tracing::warn!(key, "Metadata cache lock poisoned, entry not saved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(cache_key("attached", "products"), "grid:builder:attached:products");
        assert_eq!(cache_key("list", "t.c"), "grid:builder:list:t.c");
    }

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        assert!(cache.load("k").is_none());
        cache.save("k", serde_json::json!({"a": 1}));
        assert_eq!(cache.load("k"), Some(serde_json::json!({"a": 1})));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = MemoryCache::new();
        cache.save("k", serde_json::json!(1));
        cache.save("k", serde_json::json!(2));
        assert_eq!(cache.load("k"), Some(serde_json::json!(2)));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_is_same_instance() {
        assert!(Arc::ptr_eq(&MemoryCache::shared(), &MemoryCache::shared()));
    }
}
