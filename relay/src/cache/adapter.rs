use crate::adapters::{InMemoryStore, VoidStore};
use crate::domain::AdapterConfig;
use crate::ports::{CacheStore, StoreFactory};
use crate::reactive::Store;
use shared::Result;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Reactive handle on a live adapter instance.
///
/// Callers look the instance up on every operation through [`CacheAdapter::instance`],
/// so swapping it (see [`CacheAdapter::replace`] and [`CacheAdapter::reconfigure`])
/// is observed by every later call.
#[derive(Clone)]
pub struct CacheAdapter {
    instance: Store<Arc<dyn CacheStore>>,
}

impl CacheAdapter {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            instance: Store::new(store),
        }
    }

    /// Unbounded in-memory adapter without expiry.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new(None, None)))
    }

    /// Adapter that never stores anything.
    pub fn void() -> Self {
        Self::new(Arc::new(VoidStore))
    }

    /// Build the first instance from a factory.
    pub fn from_factory(factory: &dyn StoreFactory, config: &AdapterConfig) -> Result<Self> {
        Ok(Self::new(factory.create_from_config(config)?))
    }

    /// Current instance.
    pub fn instance(&self) -> Arc<dyn CacheStore> {
        self.instance.get()
    }

    pub fn replace(&self, store: Arc<dyn CacheStore>) {
        self.instance.set(store);
    }

    /// Rebuild the instance from new configuration; the old instance is dropped.
    pub fn reconfigure(&self, factory: &dyn StoreFactory, config: &AdapterConfig) -> Result<()> {
        let store = factory.create_from_config(config)?;
        debug!(?config, "Swapping cache adapter instance");
        self.replace(store);
        Ok(())
    }

    /// The reactive instance store itself.
    pub fn handle(&self) -> &Store<Arc<dyn CacheStore>> {
        &self.instance
    }
}

impl Default for CacheAdapter {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Debug for CacheAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAdapter")
            .field("instance", &"<dyn CacheStore>")
            .finish()
    }
}
