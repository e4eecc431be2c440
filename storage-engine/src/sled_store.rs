use async_trait::async_trait;
use relay::domain::{AdapterConfig, CacheEntry, CacheKey};
use relay::ports::{CacheStore, StoreFactory};
use serde_json::Value;
use shared::{Clock, Error, Result, SystemClock};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const TREE_NAME: &str = "relay-cache";

/// Sled-based cache adapter; entries outlive the process.
///
/// Entries are stored as JSON. `max_age` is enforced on read; `max_entries` is not supported.
pub struct SledStore {
    tree: sled::Tree,
    max_age: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl SledStore {
    /// Open (or create) a store at `path`
    /// Creates the parent directory if it doesn't exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = open_db(path)?;
        Self::from_db(&db, None, Arc::new(SystemClock))
    }

    fn from_db(db: &sled::Db, max_age: Option<Duration>, clock: Arc<dyn Clock>) -> Result<Self> {
        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|e| Error::Adapter(format!("Failed to open tree: {}", e)))?;

        Ok(Self {
            tree,
            max_age,
            clock,
        })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn expired(&self, entry: &CacheEntry) -> bool {
        let Some(max_age) = self.max_age else {
            return false;
        };

        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => self.clock.now() - entry.cached_at >= max_age,
            Err(_) => false,
        }
    }

    /// Remove `key` only if it still holds `read`; a concurrent `set` wins.
    fn evict(&self, key: &CacheKey, read: &[u8]) -> Result<()> {
        let swapped = self
            .tree
            .compare_and_swap(key.as_bytes(), Some(read), None as Option<&[u8]>)
            .map_err(|e| Error::Adapter(format!("Failed to evict entry: {}", e)))?;

        if swapped.is_err() {
            debug!(%key, "Entry replaced while evicting, keeping it");
        }

        Ok(())
    }
}

fn open_db(path: impl AsRef<Path>) -> Result<sled::Db> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Adapter(format!("Failed to create directory: {}", e)))?;
    }

    sled::open(path).map_err(|e| Error::Adapter(format!("Failed to open Sled database: {}", e)))
}

#[async_trait]
impl CacheStore for SledStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let value = self
            .tree
            .get(key.as_bytes())
            .map_err(|e| Error::Adapter(format!("Failed to get entry: {}", e)))?;

        let Some(bytes) = value else {
            return Ok(None);
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                // Written by an incompatible version; treat as a miss
                warn!(%key, error = %e, "Dropping undecodable cache entry");
                self.evict(key, &bytes)?;
                return Ok(None);
            }
        };

        if self.expired(&entry) {
            debug!(%key, "Entry past max age");
            self.evict(key, &bytes)?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn set(&self, key: CacheKey, value: Value) -> Result<()> {
        let entry = CacheEntry::new(value, self.clock.now());
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| Error::Adapter(format!("Failed to serialize entry: {}", e)))?;

        self.tree
            .insert(key.as_bytes(), bytes)
            .map_err(|e| Error::Adapter(format!("Failed to save entry: {}", e)))?;

        Ok(())
    }

    async fn unset(&self, key: &CacheKey) -> Result<()> {
        self.tree
            .remove(key.as_bytes())
            .map_err(|e| Error::Adapter(format!("Failed to delete entry: {}", e)))?;

        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        self.tree
            .clear()
            .map_err(|e| Error::Adapter(format!("Failed to clear tree: {}", e)))?;

        // Make the clear durable right away
        self.tree
            .flush_async()
            .await
            .map_err(|e| Error::Adapter(format!("Failed to flush database: {}", e)))?;

        Ok(())
    }
}

impl Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("entries", &self.tree.len())
            .field("max_age", &self.max_age)
            .finish()
    }
}

/// Builds [`SledStore`]s over one database.
///
/// Every instance shares the same tree, so reconfiguring keeps what was cached.
#[derive(Clone)]
pub struct SledStoreFactory {
    db: sled::Db,
    clock: Arc<dyn Clock>,
}

impl SledStoreFactory {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            db: open_db(path)?,
            clock,
        })
    }
}

impl StoreFactory for SledStoreFactory {
    fn create_from_config(&self, config: &AdapterConfig) -> Result<Arc<dyn CacheStore>> {
        if let Some(max_entries) = config.max_entries {
            warn!(max_entries, "Sled cache adapter ignores max_entries");
        }

        let store = SledStore::from_db(&self.db, config.max_age, Arc::clone(&self.clock))?;
        Ok(Arc::new(store))
    }
}

impl Debug for SledStoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStoreFactory")
            .field("tree", &TREE_NAME)
            .finish_non_exhaustive()
    }
}
