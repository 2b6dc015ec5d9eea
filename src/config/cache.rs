//! Validated-configuration cache.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::schema::ValidatedConfig;

/// Storage for validated configurations, keyed by `"{config_dir}-{env}"`.
///
/// Entries are only ever inserted or cleared all at once.
pub trait ConfigCache: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Option<ValidatedConfig>;
    fn set(&self, key: &str, config: ValidatedConfig);
    fn clear(&self);
}

/// In-memory cache. Concurrent inserts for one key are last-write-wins.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, ValidatedConfig>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by every loader that is not given its own.
    pub fn global() -> Arc<MemoryCache> {
        static GLOBAL: OnceLock<Arc<MemoryCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(MemoryCache::new())).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ConfigCache for MemoryCache {
    fn get(&self, key: &str) -> Option<ValidatedConfig> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, config: ValidatedConfig) {
        self.entries.write().insert(key.to_string(), config);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Clears every entry in the process-wide cache, whichever loader stored it.
pub fn clear_cache() {
    MemoryCache::global().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn config(value: Value) -> ValidatedConfig {
        match value {
            Value::Object(map) => ValidatedConfig::new(map),
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_set_get_clear() {
        let cache = MemoryCache::new();
        assert!(cache.get("config-test").is_none());

        cache.set("config-test", config(json!({"port": 1})));
        cache.set("config-production", config(json!({"port": 2})));
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get("config-test").unwrap().get("port"),
            Some(&json!(1))
        );

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = MemoryCache::new();
        cache.set("k", config(json!({"v": 1})));
        cache.set("k", config(json!({"v": 2})));

        assert_eq!(cache.get("k").unwrap().get("v"), Some(&json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&MemoryCache::global(), &MemoryCache::global()));
    }
}
