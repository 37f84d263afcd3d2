//! Process-wide resource cache keyed by REST path.
//!
//! Entries live until explicitly invalidated or the process exits; there
//! is no TTL and no persistence across restarts. Keys are hierarchical
//! (`/restaurant/3/orders/` is a prefix of `/restaurant/3/orders/42/`), so
//! prefix invalidation lets a collection drop all of its nested item
//! entries in one call.
//!
//! The cache is an injectable value so coherence is unit-testable with a
//! private instance; `ResourceCache::shared()` provides the process-global
//! instance that display hosts use in production.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use serde_json::Value;
use tracing::trace;

#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: Mutex<HashMap<String, Value>>,
}

static SHARED: OnceLock<Arc<ResourceCache>> = OnceLock::new();

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by all surfaces in a host process.
    pub fn shared() -> Arc<ResourceCache> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(ResourceCache::new())))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned cache lock only means another thread panicked while
        // holding it; the map itself is still usable.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        trace!(key, "cache store");
        self.lock().insert(key.to_string(), value);
    }

    /// Remove an exact entry. Returns whether an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            trace!(key, "cache invalidate");
        }
        removed
    }

    /// Remove every entry whose key starts with `prefix`. Returns the
    /// number of entries removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            trace!(prefix, removed, "cache prefix invalidate");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn get_returns_what_set_stored() {
        let cache = ResourceCache::new();
        assert_eq!(cache.get("/restaurant/1/orders/"), None);
        cache.set("/restaurant/1/orders/", serde_json::json!([1, 2]));
        assert_eq!(
            cache.get("/restaurant/1/orders/"),
            Some(serde_json::json!([1, 2]))
        );
    }

    #[test]
    fn invalidate_removes_only_the_exact_key() {
        let cache = ResourceCache::new();
        cache.set("/restaurant/1/orders/", serde_json::json!([]));
        cache.set("/restaurant/1/orders/42/", serde_json::json!({ "id": 42 }));

        assert!(cache.invalidate("/restaurant/1/orders/42/"));
        assert!(!cache.invalidate("/restaurant/1/orders/42/"), "already gone");
        assert!(cache.get("/restaurant/1/orders/").is_some());
    }

    #[test]
    fn prefix_invalidation_drops_nested_item_keys() {
        let cache = ResourceCache::new();
        cache.set("/restaurant/1/orders/", serde_json::json!([]));
        cache.set("/restaurant/1/orders/42/", serde_json::json!({}));
        cache.set("/restaurant/1/orders/42/items/", serde_json::json!([]));
        cache.set("/restaurant/1/menu/", serde_json::json!([]));

        let removed = cache.invalidate_prefix("/restaurant/1/orders/");
        assert_eq!(removed, 3);
        assert!(
            cache.get("/restaurant/1/menu/").is_some(),
            "unrelated resource must survive"
        );
    }

    #[test]
    #[serial]
    fn shared_cache_is_the_same_instance_process_wide() {
        let a = ResourceCache::shared();
        let b = ResourceCache::shared();
        a.clear();
        a.set("/restaurant/9/orders/", serde_json::json!([]));
        assert!(b.get("/restaurant/9/orders/").is_some());
        a.clear();
    }
}
