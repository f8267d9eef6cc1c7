//! Cache Store Module
//!
//! The per-environment cache engine: a key/value map with TTL expiry,
//! key-pattern filtering, approximate size accounting and optional
//! write-through persistence.
//!
//! The store itself is not synchronized; the registry wraps each instance
//! in a mutex and every operation runs for the full duration of the lock.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::{current_timestamp_ms, CacheItem, KeyFilter};
use crate::persist::Persistence;

// == Cache Store ==
/// In-memory store scoped to exactly one environment.
pub struct CacheStore {
    /// Environment that owns this store
    environment_id: String,
    /// Key-value storage
    items: HashMap<String, CacheItem>,
    /// Running total of stored value bytes
    total_size: u64,
    /// Optional durable mirror for items flagged with persist
    persistence: Option<Arc<dyn Persistence>>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store for `environment_id`.
    pub fn new(environment_id: impl Into<String>, persistence: Option<Arc<dyn Persistence>>) -> Self {
        Self {
            environment_id: environment_id.into(),
            items: HashMap::new(),
            total_size: 0,
            persistence,
        }
    }

    /// Environment this store belongs to.
    pub fn environment_id(&self) -> &str {
        &self.environment_id
    }

    // == Hydrate ==
    /// Loads previously persisted items into memory.
    ///
    /// Called once when the engine is constructed. A load failure leaves the
    /// store empty; persistence is best-effort.
    pub fn hydrate(&mut self) {
        let Some(persistence) = self.persistence.clone() else {
            return;
        };
        match persistence.load_all(&self.environment_id) {
            Ok(items) => {
                let count = items.len();
                for item in items {
                    self.total_size += item.size();
                    self.items.insert(item.key.clone(), item);
                }
                if count > 0 {
                    debug!(
                        "Hydrated {} persisted items for environment {}",
                        count, self.environment_id
                    );
                }
            }
            Err(e) => warn!(
                "Failed to hydrate environment {}: {}",
                self.environment_id, e
            ),
        }
    }

    // == Add ==
    /// Stores an item, replacing any existing item with the same key.
    ///
    /// The replaced item's size is subtracted before the new size is added,
    /// so `total_size` never double-counts a key. `created_at` and the
    /// owning environment are stamped here, never taken from the client.
    /// Items flagged with persist are mirrored write-through; a mirror
    /// failure is logged and does not roll back the in-memory add.
    pub fn add(&mut self, mut item: CacheItem) {
        item.created_at = current_timestamp_ms();
        item.environment_id = self.environment_id.clone();

        if let Some(existing) = self.items.remove(&item.key) {
            self.remove_item(&existing);
        }

        if item.persist {
            if let Some(persistence) = &self.persistence {
                if let Err(e) = persistence.save(&item) {
                    warn!("Failed to persist {}: {}", item.key, e);
                }
            }
        }

        self.total_size += item.size();
        self.items.insert(item.key.clone(), item);
    }

    // == Get ==
    /// Retrieves an item by key.
    ///
    /// An expired item is deleted on read (lazy expiry) and reported absent.
    pub fn get(&mut self, key: &str) -> Option<CacheItem> {
        let now = current_timestamp_ms();
        match self.items.get(key) {
            Some(item) if item.is_expired(now) => {
                self.delete(key);
                None
            }
            Some(item) => Some(item.clone()),
            None => None,
        }
    }

    // == Delete ==
    /// Removes an item by key, returning whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.items.remove(key) {
            Some(item) => {
                self.remove_item(&item);
                true
            }
            None => false,
        }
    }

    // == Delete All ==
    /// Empties the store and clears persisted entries for the environment.
    pub fn delete_all(&mut self) {
        let items: Vec<CacheItem> = self.items.drain().map(|(_, item)| item).collect();
        for item in &items {
            self.remove_item(item);
        }
        self.total_size = 0;
    }

    // == Keys By Filter ==
    /// Returns the keys of live items matching `filter`, sorted
    /// lexicographically for deterministic output.
    ///
    /// Expired items encountered during the scan are evicted.
    pub fn keys_by_filter(&mut self, filter: &KeyFilter) -> Vec<String> {
        let now = current_timestamp_ms();

        let expired: Vec<String> = self
            .items
            .values()
            .filter(|item| item.is_expired(now))
            .map(|item| item.key.clone())
            .collect();
        for key in expired {
            self.delete(&key);
        }

        let mut keys: Vec<String> = self
            .items
            .keys()
            .filter(|key| filter.matches(key))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    // == Sweep Expired ==
    /// Walks all keys once and deletes the expired ones.
    ///
    /// Returns the number of items removed. Run periodically by the worker
    /// scheduler's maintenance job; the same expiry predicate also applies
    /// lazily on reads.
    pub fn sweep_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired: Vec<String> = self
            .items
            .values()
            .filter(|item| item.is_expired(now))
            .map(|item| item.key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            self.delete(&key);
        }
        count
    }

    // == Counters ==
    /// Current number of items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Approximate total size in bytes of stored values.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Removes an already-detached item's size and persisted mirror.
    fn remove_item(&mut self, item: &CacheItem) {
        self.total_size = self.total_size.saturating_sub(item.size());
        if item.persist {
            if let Some(persistence) = &self.persistence {
                if let Err(e) = persistence.remove(&self.environment_id, &item.key) {
                    warn!("Failed to remove persisted {}: {}", item.key, e);
                }
            }
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::FilePersistence;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    fn item(key: &str, value: &[u8], expiry_millis: u64) -> CacheItem {
        CacheItem::new(key, value.to_vec(), "bytes", expiry_millis, false)
    }

    #[test]
    fn test_store_new() {
        let store = CacheStore::new("env1", None);
        assert_eq!(store.item_count(), 0);
        assert_eq!(store.total_size(), 0);
    }

    #[test]
    fn test_store_add_and_get() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("key1", b"value1", 0));
        let found = store.get("key1").unwrap();

        assert_eq!(found.value, b"value1".to_vec());
        assert_eq!(found.environment_id, "env1");
        assert!(found.created_at > 0, "created_at stamped by the store");
        assert_eq!(store.item_count(), 1);
        assert_eq!(store.total_size(), 6);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = CacheStore::new("env1", None);
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_store_replace_adjusts_total_size() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("key1", &[0u8; 60], 0));
        assert_eq!(store.total_size(), 60);

        store.add(item("key1", &[0u8; 10], 0));
        assert_eq!(store.item_count(), 1);
        assert_eq!(store.total_size(), 10, "only the new size counts");
        assert_eq!(store.get("key1").unwrap().value.len(), 10);
    }

    #[test]
    fn test_store_delete() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("key1", b"value1", 0));
        assert!(store.delete("key1"));

        assert_eq!(store.item_count(), 0);
        assert_eq!(store.total_size(), 0);
        assert!(store.get("key1").is_none());
    }

    #[test]
    fn test_store_delete_nonexistent() {
        let mut store = CacheStore::new("env1", None);
        assert!(!store.delete("nonexistent"));
    }

    #[test]
    fn test_store_delete_all() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("key1", b"value1", 0));
        store.add(item("key2", b"value2", 0));
        store.delete_all();

        assert_eq!(store.item_count(), 0);
        assert_eq!(store.total_size(), 0);
    }

    #[test]
    fn test_store_zero_ttl_never_expires() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("permanent", b"value", 0));
        sleep(Duration::from_millis(50));

        assert!(store.get("permanent").is_some());
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn test_store_huge_ttl_survives_get() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("forever", b"value", u64::MAX));

        assert!(store.get("forever").is_some());
        assert_eq!(store.item_count(), 1);
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn test_store_lazy_expiry_on_get() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("key1", b"value1", 100));
        assert!(store.get("key1").is_some());

        sleep(Duration::from_millis(150));

        // No sweep has run; the read itself evicts
        assert!(store.get("key1").is_none());
        assert_eq!(store.item_count(), 0);
        assert_eq!(store.total_size(), 0);
    }

    #[test]
    fn test_store_sweep_expired() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("short", b"value1", 100));
        store.add(item("long", b"value2", 60_000));

        sleep(Duration::from_millis(150));

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.item_count(), 1);
        assert!(store.get("long").is_some());
    }

    #[test]
    fn test_store_keys_by_filter_sorted() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("charlie", b"3", 0));
        store.add(item("alpha", b"1", 0));
        store.add(item("bravo", b"2", 0));

        let keys = store.keys_by_filter(&KeyFilter::all());
        assert_eq!(keys, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_store_keys_by_filter_conditions() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("user:1:meta", b"1", 0));
        store.add(item("user:2:data", b"2", 0));
        store.add(item("session:1:meta", b"3", 0));

        let filter = KeyFilter {
            starts_with: Some("user:".to_string()),
            ends_with: Some(":meta".to_string()),
            contains: None,
        };
        assert_eq!(store.keys_by_filter(&filter), vec!["user:1:meta"]);
    }

    #[test]
    fn test_store_keys_by_filter_excludes_and_evicts_expired() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("stale", b"1", 100));
        store.add(item("fresh", b"2", 0));

        sleep(Duration::from_millis(150));

        let keys = store.keys_by_filter(&KeyFilter::all());
        assert_eq!(keys, vec!["fresh"]);
        assert_eq!(store.item_count(), 1, "expired item evicted during scan");
    }

    #[test]
    fn test_store_total_size_matches_item_sum() {
        let mut store = CacheStore::new("env1", None);

        store.add(item("a", &[0u8; 10], 0));
        store.add(item("b", &[0u8; 20], 0));
        store.add(item("a", &[0u8; 5], 0));
        store.delete("b");

        assert_eq!(store.total_size(), 5);
    }

    #[test]
    fn test_store_write_through_persistence() {
        let dir = TempDir::new().unwrap();
        let persistence: Arc<dyn Persistence> =
            Arc::new(FilePersistence::new(dir.path()).unwrap());

        let mut store = CacheStore::new("env1", Some(Arc::clone(&persistence)));
        let mut persisted = item("durable", b"value", 0);
        persisted.persist = true;
        store.add(persisted);
        store.add(item("volatile", b"value", 0));

        let mirrored = persistence.load_all("env1").unwrap();
        assert_eq!(mirrored.len(), 1, "only persist-flagged items mirrored");
        assert_eq!(mirrored[0].key, "durable");
    }

    #[test]
    fn test_store_delete_removes_persisted_mirror() {
        let dir = TempDir::new().unwrap();
        let persistence: Arc<dyn Persistence> =
            Arc::new(FilePersistence::new(dir.path()).unwrap());

        let mut store = CacheStore::new("env1", Some(Arc::clone(&persistence)));
        let mut persisted = item("durable", b"value", 0);
        persisted.persist = true;
        store.add(persisted);
        store.delete("durable");

        assert!(persistence.load_all("env1").unwrap().is_empty());
    }

    #[test]
    fn test_store_delete_all_clears_persisted_mirror() {
        let dir = TempDir::new().unwrap();
        let persistence: Arc<dyn Persistence> =
            Arc::new(FilePersistence::new(dir.path()).unwrap());

        let mut store = CacheStore::new("env1", Some(Arc::clone(&persistence)));
        for key in ["a", "b"] {
            let mut persisted = item(key, b"value", 0);
            persisted.persist = true;
            store.add(persisted);
        }
        store.delete_all();

        assert!(persistence.load_all("env1").unwrap().is_empty());
    }

    #[test]
    fn test_store_hydrate_restores_items_and_size() {
        let dir = TempDir::new().unwrap();
        let persistence: Arc<dyn Persistence> =
            Arc::new(FilePersistence::new(dir.path()).unwrap());

        {
            let mut store = CacheStore::new("env1", Some(Arc::clone(&persistence)));
            let mut persisted = item("durable", &[0u8; 32], 0);
            persisted.persist = true;
            store.add(persisted);
        }

        let mut restored = CacheStore::new("env1", Some(persistence));
        restored.hydrate();
        assert_eq!(restored.item_count(), 1);
        assert_eq!(restored.total_size(), 32);
        assert!(restored.get("durable").is_some());
    }
}
