//! Persistence Module
//!
//! Optional durable mirror for cache items flagged with `persist`. Writes
//! are best-effort: failures are logged by the engine and never propagated
//! to the caller of add/delete.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::CacheItem;

// == Persistence Trait ==
/// External persistence collaborator.
///
/// Invoked only for items whose `persist` flag is set. Implementations are
/// called while the owning engine's lock is held, so each method must stay
/// bounded and fast.
pub trait Persistence: Send + Sync {
    /// Saves or replaces one item.
    fn save(&self, item: &CacheItem) -> anyhow::Result<()>;

    /// Removes one item.
    fn remove(&self, environment_id: &str, key: &str) -> anyhow::Result<()>;

    /// Loads all persisted items for an environment, used to hydrate a
    /// freshly constructed engine.
    fn load_all(&self, environment_id: &str) -> anyhow::Result<Vec<CacheItem>>;
}

// == File Persistence ==
/// Stores each environment's persisted items as one JSON document under a
/// data directory.
#[derive(Debug)]
pub struct FilePersistence {
    data_dir: PathBuf,
}

impl FilePersistence {
    // == Constructor ==
    /// Creates the store, creating `data_dir` if necessary.
    pub fn new(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn environment_path(&self, environment_id: &str) -> PathBuf {
        self.data_dir.join(format!("{environment_id}.json"))
    }

    fn read_items(&self, path: &Path) -> anyhow::Result<Vec<CacheItem>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn write_items(&self, path: &Path, items: &[CacheItem]) -> anyhow::Result<()> {
        // Write to a temp file first so a crash never truncates the document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(items)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Persistence for FilePersistence {
    fn save(&self, item: &CacheItem) -> anyhow::Result<()> {
        let path = self.environment_path(&item.environment_id);
        let mut items = self.read_items(&path)?;
        items.retain(|existing| existing.key != item.key);
        items.push(item.clone());
        self.write_items(&path, &items)
    }

    fn remove(&self, environment_id: &str, key: &str) -> anyhow::Result<()> {
        let path = self.environment_path(environment_id);
        let mut items = self.read_items(&path)?;
        let before = items.len();
        items.retain(|existing| existing.key != key);
        if items.len() != before {
            self.write_items(&path, &items)?;
        }
        Ok(())
    }

    fn load_all(&self, environment_id: &str) -> anyhow::Result<Vec<CacheItem>> {
        self.read_items(&self.environment_path(environment_id))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::current_timestamp_ms;
    use tempfile::TempDir;

    fn persisted_item(environment_id: &str, key: &str, value: &[u8]) -> CacheItem {
        let mut item = CacheItem::new(key, value.to_vec(), "bytes", 0, true);
        item.environment_id = environment_id.to_string();
        item.created_at = current_timestamp_ms();
        item
    }

    #[test]
    fn test_save_and_load_all() {
        let dir = TempDir::new().unwrap();
        let store = FilePersistence::new(dir.path()).unwrap();

        store.save(&persisted_item("env1", "a", b"1")).unwrap();
        store.save(&persisted_item("env1", "b", b"2")).unwrap();

        let items = store.load_all("env1").unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_save_replaces_existing_key() {
        let dir = TempDir::new().unwrap();
        let store = FilePersistence::new(dir.path()).unwrap();

        store.save(&persisted_item("env1", "a", b"old")).unwrap();
        store.save(&persisted_item("env1", "a", b"new")).unwrap();

        let items = store.load_all("env1").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value, b"new".to_vec());
    }

    #[test]
    fn test_remove_deletes_only_matching_key() {
        let dir = TempDir::new().unwrap();
        let store = FilePersistence::new(dir.path()).unwrap();

        store.save(&persisted_item("env1", "a", b"1")).unwrap();
        store.save(&persisted_item("env1", "b", b"2")).unwrap();
        store.remove("env1", "a").unwrap();

        let items = store.load_all("env1").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "b");
    }

    #[test]
    fn test_environments_are_isolated() {
        let dir = TempDir::new().unwrap();
        let store = FilePersistence::new(dir.path()).unwrap();

        store.save(&persisted_item("env1", "a", b"1")).unwrap();
        store.save(&persisted_item("env2", "a", b"2")).unwrap();

        assert_eq!(store.load_all("env1").unwrap().len(), 1);
        assert_eq!(store.load_all("env2").unwrap()[0].value, b"2".to_vec());
    }

    #[test]
    fn test_load_all_empty_environment() {
        let dir = TempDir::new().unwrap();
        let store = FilePersistence::new(dir.path()).unwrap();
        assert!(store.load_all("missing").unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = FilePersistence::new(dir.path()).unwrap();
        assert!(store.remove("env1", "missing").is_ok());
    }
}
