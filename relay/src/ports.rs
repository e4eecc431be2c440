#![deny(clippy::all)]

use crate::domain::{AdapterConfig, CacheEntry, CacheKey, CachedResult};
use async_trait::async_trait;
use serde_json::Value;
use shared::Result;
use std::sync::Arc;

// Ports are the pluggable extension points for cache backends and result providers

/// Port for creating cache adapter instances from configuration
/// This allows an adapter to be rebuilt when its configuration changes
pub trait StoreFactory: Send + Sync + 'static {
    /// Create a new live adapter instance from configuration
    fn create_from_config(&self, config: &AdapterConfig) -> Result<Arc<dyn CacheStore>>;
}

/// Port for a live cache adapter instance (in-memory map, sled tree, ...)
///
/// Every operation must tolerate keys that do not exist.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// `None` is a miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    /// Overwrites any existing entry, stamping it with the current time.
    async fn set(&self, key: CacheKey, value: Value) -> Result<()>;
    async fn unset(&self, key: &CacheKey) -> Result<()>;
    /// Clears every entry regardless of key.
    async fn purge(&self) -> Result<()>;
}

/// Port for one link in an operation's ordered chain of result providers
///
/// The operation runtime consults its data sources front to back and knows
/// nothing about what each one is backed by.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Hint for the runtime: a disabled source is skipped, not failed.
    fn enabled(&self) -> bool;

    async fn get(&self, params: &Value) -> Result<Option<CachedResult>>;

    async fn set(&self, params: &Value, result: &Value) -> Result<()>;

    async fn unset(&self, params: &Value) -> Result<()>;
}
