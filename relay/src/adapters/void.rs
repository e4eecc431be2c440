use crate::domain::{AdapterConfig, CacheEntry, CacheKey};
use crate::ports::{CacheStore, StoreFactory};
use async_trait::async_trait;
use serde_json::Value;
use shared::Result;
use std::sync::Arc;

/// Adapter that accepts every write and never returns anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoidStore;

#[async_trait]
impl CacheStore for VoidStore {
    async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(None)
    }

    async fn set(&self, _key: CacheKey, _value: Value) -> Result<()> {
        Ok(())
    }

    async fn unset(&self, _key: &CacheKey) -> Result<()> {
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        Ok(())
    }
}

impl StoreFactory for VoidStore {
    fn create_from_config(&self, _config: &AdapterConfig) -> Result<Arc<dyn CacheStore>> {
        Ok(Arc::new(VoidStore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_void_store_never_hits() {
        let store = VoidStore;
        let key = CacheKey::new("k");

        store.set(key.clone(), json!(1)).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        store.unset(&key).await.unwrap();
        store.purge().await.unwrap();
    }
}
