//! Environment Registry Module
//!
//! Maps security keys to environments and owns the singleton cache engine
//! per environment. Engines are constructed lazily on first reference and
//! live for the rest of the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::cache::CacheStore;
use crate::models::Environment;
use crate::persist::Persistence;

/// One live cache engine, serialized behind its own lock.
///
/// Every operation acquires the lock for its full duration, so the engine
/// is strictly serialized internally. Different environments' engines are
/// independent and run concurrently.
pub type SharedEngine = Arc<Mutex<CacheStore>>;

// == Environment Registry ==
/// Registry of environments and their cache engines.
pub struct EnvironmentRegistry {
    environments: RwLock<Vec<Environment>>,
    engines: Mutex<HashMap<String, SharedEngine>>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl EnvironmentRegistry {
    // == Constructor ==
    /// Creates an empty registry.
    pub fn new(persistence: Option<Arc<dyn Persistence>>) -> Self {
        Self {
            environments: RwLock::new(Vec::new()),
            engines: Mutex::new(HashMap::new()),
            persistence,
        }
    }

    // == Bootstrap ==
    /// Creates the default environment when the registry is empty.
    ///
    /// Returns the created environment, or None when one already exists.
    pub async fn bootstrap_default(
        &self,
        security_key: &str,
        max_size_bytes: u64,
    ) -> Option<Environment> {
        let mut environments = self.environments.write().await;
        if !environments.is_empty() {
            return None;
        }

        let environment = Environment::new("Default", security_key, max_size_bytes, 200, 90);
        environments.push(environment.clone());
        info!("Created default cache environment {}", environment.id);
        Some(environment)
    }

    // == Administration ==
    /// Registers an environment.
    pub async fn add_environment(&self, environment: Environment) {
        self.environments.write().await.push(environment);
    }

    /// All registered environments.
    pub async fn environments(&self) -> Vec<Environment> {
        self.environments.read().await.clone()
    }

    // == Resolve ==
    /// Finds the environment whose security key exactly matches `key`.
    ///
    /// No partial matches, no case folding.
    pub async fn resolve_by_security_key(&self, key: &str) -> Option<Environment> {
        self.environments
            .read()
            .await
            .iter()
            .find(|environment| environment.security_key == key)
            .cloned()
    }

    // == Engine For ==
    /// Returns the singleton engine for an environment.
    ///
    /// When absent and `create_if_missing` is set, the engine is constructed
    /// and hydrated from the persistence collaborator. Callers share the
    /// returned handle; they never hold their own copy of engine state.
    ///
    /// Hydration reads the persisted document synchronously while the engine
    /// map lock is held, blocking other environments' first access for that
    /// duration. Persisted documents are expected to stay small; only items
    /// explicitly flagged with persist are mirrored.
    pub async fn engine_for(&self, environment_id: &str, create_if_missing: bool) -> Option<SharedEngine> {
        let mut engines = self.engines.lock().await;
        if let Some(engine) = engines.get(environment_id) {
            return Some(Arc::clone(engine));
        }
        if !create_if_missing {
            return None;
        }

        let mut store = CacheStore::new(environment_id, self.persistence.clone());
        store.hydrate();
        let engine = Arc::new(Mutex::new(store));
        engines.insert(environment_id.to_string(), Arc::clone(&engine));
        Some(engine)
    }

    // == Live Engines ==
    /// Snapshot of all constructed engines, keyed by environment id.
    ///
    /// Used by maintenance jobs (expiry sweep, capacity warnings).
    pub async fn live_engines(&self) -> Vec<(String, SharedEngine)> {
        self.engines
            .lock()
            .await
            .iter()
            .map(|(id, engine)| (id.clone(), Arc::clone(engine)))
            .collect()
    }
}
