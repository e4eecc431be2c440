use crate::domain::{AdapterConfig, CacheEntry, CacheKey};
use crate::ports::{CacheStore, StoreFactory};
use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;
use shared::{Clock, Result, SystemClock};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Moka-based in-memory adapter
/// Lock-free and concurrent, with optional entry bound and max age
pub struct InMemoryStore {
    cache: Cache<CacheKey, CacheEntry>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Counters of an [`InMemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    /// Approximate, moka updates it lazily.
    pub entry_count: u64,
}

impl StoreStats {
    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl InMemoryStore {
    /// Create a store with optional max entries and max age, stamping entries with the system clock
    pub fn new(max_entries: Option<u64>, max_age: Option<Duration>) -> Self {
        Self::with_clock(max_entries, max_age, Arc::new(SystemClock))
    }

    pub fn with_clock(
        max_entries: Option<u64>,
        max_age: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut builder = Cache::builder().name("relay-in-memory");

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        if let Some(ttl) = max_age {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &AdapterConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(config.max_entries, config.max_age, clock)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        // Either never stored, purged, evicted or past max age
        let entry = self.cache.get(key).await;
        let counter = if entry.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(entry)
    }

    async fn set(&self, key: CacheKey, value: Value) -> Result<()> {
        let entry = CacheEntry::new(value, self.clock.now());
        self.cache.insert(key, entry).await;
        Ok(())
    }

    async fn unset(&self, key: &CacheKey) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        self.cache.invalidate_all();
        Ok(())
    }
}

impl Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}

/// Builds [`InMemoryStore`]s sharing one clock.
#[derive(Debug, Clone)]
pub struct InMemoryStoreFactory {
    clock: Arc<dyn Clock>,
}

impl InMemoryStoreFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for InMemoryStoreFactory {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl StoreFactory for InMemoryStoreFactory {
    fn create_from_config(&self, config: &AdapterConfig) -> Result<Arc<dyn CacheStore>> {
        Ok(Arc::new(InMemoryStore::from_config(
            config,
            Arc::clone(&self.clock),
        )))
    }
}
