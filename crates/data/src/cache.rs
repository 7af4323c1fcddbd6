//! Query result cache
//!
//! Keys are a pure function of (intent, canonicalized entities) so identical
//! inputs within TTL always short-circuit to the same mapped result. Expiry
//! is lazy: an expired entry is evicted on its next lookup, not by a sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use callflow_core::EntityMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

struct CacheEntry {
    value: Map<String, Value>,
    stored_at: Instant,
}

/// Cache state snapshot for the operations endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub entries: usize,
    pub ttl_secs: u64,
    pub keys: Vec<String>,
}

/// TTL-bounded memoization of backend query results
pub struct QueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Canonical cache key for an (intent, entities) pair.
    ///
    /// Entity types sort lexicographically and each value list sorts
    /// internally, so the key never depends on extraction order.
    pub fn canonical_key(intent: &str, entities: &EntityMap) -> String {
        let mut types: Vec<&String> = entities.keys().collect();
        types.sort();

        let mut key = String::from(intent);
        for ty in types {
            let mut values = entities[ty].clone();
            values.sort();
            key.push('|');
            key.push_str(ty);
            key.push('=');
            key.push_str(&values.join(","));
        }
        key
    }

    /// Fetch a live entry, evicting it first if the TTL has lapsed
    pub fn get(&self, key: &str) -> Option<Map<String, Value>> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // expired, take the write lock to evict
        self.entries.write().remove(key);
        None
    }

    pub fn store(&self, key: String, value: Map<String, Value>) {
        self.entries.write().insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn info(&self) -> CacheInfo {
        let entries = self.entries.read();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheInfo {
            entries: entries.len(),
            ttl_secs: self.ttl.as_secs(),
            keys,
        }
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(pairs: &[(&str, &[&str])]) -> EntityMap {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_canonical_key_ignores_insertion_order() {
        let a = entities(&[("tracking_id", &["A1"]), ("name", &["omar"])]);
        let mut b = EntityMap::new();
        b.insert("name".to_string(), vec!["omar".to_string()]);
        b.insert("tracking_id".to_string(), vec!["A1".to_string()]);

        assert_eq!(
            QueryCache::canonical_key("shipment_inquiry", &a),
            QueryCache::canonical_key("shipment_inquiry", &b),
        );
    }

    #[test]
    fn test_canonical_key_sorts_value_lists() {
        let a = entities(&[("number", &["2", "1"])]);
        let b = entities(&[("number", &["1", "2"])]);
        assert_eq!(
            QueryCache::canonical_key("general_inquiry", &a),
            QueryCache::canonical_key("general_inquiry", &b),
        );
    }

    #[test]
    fn test_different_intents_never_collide() {
        let e = entities(&[("account_id", &["12345678"])]);
        assert_ne!(
            QueryCache::canonical_key("account_balance", &e),
            QueryCache::canonical_key("shipment_inquiry", &e),
        );
    }

    #[test]
    fn test_store_and_get_within_ttl() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let mut value = Map::new();
        value.insert("status".to_string(), Value::String("in transit".to_string()));

        cache.store("k".to_string(), value.clone());
        assert_eq!(cache.get("k"), Some(value));
        assert_eq!(cache.info().entries, 1);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache = QueryCache::new(Duration::from_millis(0));
        cache.store("k".to_string(), Map::new());

        assert_eq!(cache.get("k"), None);
        // the lazy eviction removed it
        assert_eq!(cache.info().entries, 0);
    }

    #[test]
    fn test_clear_reports_count() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache.store("a".to_string(), Map::new());
        cache.store("b".to_string(), Map::new());
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.info().entries, 0);
    }
}
