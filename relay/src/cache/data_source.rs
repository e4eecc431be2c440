use crate::cache::adapter::CacheAdapter;
use crate::cache::key::try_derive_key;
use crate::cache::sourced::{Sourced, resolve_all};
use crate::domain::{CacheKey, CachedResult, OperationId};
use crate::ports::{CacheStore, DataSource};
use crate::reactive::Store;
use async_trait::async_trait;
use serde_json::Value;
use shared::{Clock, Result};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Data source serving a query's results from a [`CacheAdapter`].
///
/// Every call looks the adapter instance up once and uses that snapshot
/// throughout, so a concurrent swap never splits one call across two instances.
pub struct CacheDataSource {
    id: OperationId,
    adapter: CacheAdapter,
    stale_after: Option<Duration>,
    enabled: Store<bool>,
    sourced: Vec<Sourced>,
    params_are_meaningless: bool,
    clock: Arc<dyn Clock>,
}

impl CacheDataSource {
    pub const NAME: &'static str = "cache";

    pub fn new(
        id: OperationId,
        adapter: CacheAdapter,
        stale_after: Option<Duration>,
        enabled: Store<bool>,
        sourced: Vec<Sourced>,
        params_are_meaningless: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            adapter,
            stale_after,
            enabled,
            sourced,
            params_are_meaningless,
            clock,
        }
    }

    pub fn operation_id(&self) -> &OperationId {
        &self.id
    }

    pub fn adapter(&self) -> &CacheAdapter {
        &self.adapter
    }

    /// `Ok(None)` when the call is not cacheable.
    pub async fn key_for(&self, params: &Value) -> Result<Option<CacheKey>> {
        let sources = resolve_all(&self.sourced, params).await?;
        let params = (!self.params_are_meaningless).then_some(params);

        match try_derive_key(&self.id, params, &sources) {
            Ok(key) => Ok(Some(key)),
            Err(reason) => {
                debug!(operation = %self.id, %reason, "Call bypasses the cache");
                Ok(None)
            }
        }
    }

    async fn read(&self, store: &dyn CacheStore, params: &Value) -> Result<Option<CachedResult>> {
        let Some(key) = self.key_for(params).await? else {
            return Ok(None);
        };

        let Some(entry) = store.get(&key).await? else {
            trace!(operation = %self.id, %key, "Cache miss");
            return Ok(None);
        };

        let stale = entry.is_stale(self.stale_after, self.clock.now());
        trace!(operation = %self.id, %key, stale, "Cache hit");

        Ok(Some(CachedResult {
            result: entry.value,
            stale,
        }))
    }

    async fn write(&self, store: &dyn CacheStore, params: &Value, result: &Value) -> Result<()> {
        if let Some(key) = self.key_for(params).await? {
            store.set(key, result.clone()).await?;
        }
        Ok(())
    }

    async fn remove(&self, store: &dyn CacheStore, params: &Value) -> Result<()> {
        if let Some(key) = self.key_for(params).await? {
            store.unset(&key).await?;
        }
        Ok(())
    }

    /// Clear the whole adapter instance, whether or not caching is enabled.
    pub async fn purge(&self) -> Result<()> {
        self.adapter.instance().purge().await
    }
}

#[async_trait]
impl DataSource for CacheDataSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        self.enabled.get()
    }

    async fn get(&self, params: &Value) -> Result<Option<CachedResult>> {
        let store = self.adapter.instance();
        self.read(store.as_ref(), params).await
    }

    async fn set(&self, params: &Value, result: &Value) -> Result<()> {
        let store = self.adapter.instance();
        self.write(store.as_ref(), params, result).await
    }

    async fn unset(&self, params: &Value) -> Result<()> {
        let store = self.adapter.instance();
        self.remove(store.as_ref(), params).await
    }
}

impl Debug for CacheDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDataSource")
            .field("id", &self.id)
            .field("stale_after", &self.stale_after)
            .field("enabled", &self.enabled.get())
            .field("sourced", &self.sourced.len())
            .field("params_are_meaningless", &self.params_are_meaningless)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::CacheEntry;
    use serde_json::json;
    use shared::{Error, ManualClock, SystemClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every call that reaches the adapter.
    struct CountingStore {
        inner: InMemoryStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(None, None),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CacheStore for CountingStore {
        async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn set(&self, key: CacheKey, value: Value) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }

        async fn unset(&self, key: &CacheKey) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.unset(key).await
        }

        async fn purge(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.purge().await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
            Err(Error::Adapter("connection refused".to_string()))
        }

        async fn set(&self, _key: CacheKey, _value: Value) -> Result<()> {
            Err(Error::Adapter("connection refused".to_string()))
        }

        async fn unset(&self, _key: &CacheKey) -> Result<()> {
            Err(Error::Adapter("connection refused".to_string()))
        }

        async fn purge(&self) -> Result<()> {
            Err(Error::Adapter("connection refused".to_string()))
        }
    }

    fn source(adapter: CacheAdapter, stale_after: Option<Duration>) -> CacheDataSource {
        CacheDataSource::new(
            OperationId::new("userById").unwrap(),
            adapter,
            stale_after,
            Store::new(true),
            Vec::new(),
            false,
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let source = source(CacheAdapter::in_memory(), None);
        let params = json!({"id": 1});

        assert!(source.get(&params).await.unwrap().is_none());

        source.set(&params, &json!({"name": "A"})).await.unwrap();
        let hit = source.get(&params).await.unwrap().unwrap();
        assert_eq!(hit.result, json!({"name": "A"}));
        // No policy: every hit is stale
        assert!(hit.stale);

        assert!(source.get(&json!({"id": 2})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unset_removes_only_that_call() {
        let source = source(CacheAdapter::in_memory(), None);

        source.set(&json!(1), &json!("one")).await.unwrap();
        source.set(&json!(2), &json!("two")).await.unwrap();
        source.unset(&json!(1)).await.unwrap();

        assert!(source.get(&json!(1)).await.unwrap().is_none());
        assert!(source.get(&json!(2)).await.unwrap().is_some());
        // Missing entries are fine
        source.unset(&json!(3)).await.unwrap();
    }

    #[tokio::test]
    async fn test_staleness_follows_the_clock() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let adapter = CacheAdapter::new(Arc::new(InMemoryStore::with_clock(
            None,
            None,
            clock.clone(),
        )));
        let source = CacheDataSource::new(
            OperationId::new("userById").unwrap(),
            adapter,
            Some(Duration::from_millis(1000)),
            Store::new(true),
            Vec::new(),
            false,
            clock.clone(),
        );

        source.set(&json!(1), &json!("A")).await.unwrap();

        clock.advance(Duration::from_millis(999));
        assert!(!source.get(&json!(1)).await.unwrap().unwrap().stale);

        clock.advance(Duration::from_millis(2));
        assert!(source.get(&json!(1)).await.unwrap().unwrap().stale);
    }

    #[tokio::test]
    async fn test_unresolved_source_never_touches_the_adapter() {
        let store = Arc::new(CountingStore::new());
        let locale: Store<Option<Value>> = Store::new(None);
        let source = CacheDataSource::new(
            OperationId::new("userById").unwrap(),
            CacheAdapter::new(store.clone()),
            None,
            Store::new(true),
            vec![Sourced::store(locale.clone())],
            false,
            Arc::new(SystemClock),
        );

        source.set(&json!(1), &json!("A")).await.unwrap();
        assert!(source.get(&json!(1)).await.unwrap().is_none());
        source.unset(&json!(1)).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);

        locale.set(Some(json!("en")));
        source.set(&json!(1), &json!("A")).await.unwrap();
        assert!(source.get(&json!(1)).await.unwrap().is_some());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sourced_values_split_entries() {
        let locale = Store::new(Some(json!("en")));
        let source = CacheDataSource::new(
            OperationId::new("greeting").unwrap(),
            CacheAdapter::in_memory(),
            None,
            Store::new(true),
            vec![Sourced::store(locale.clone())],
            false,
            Arc::new(SystemClock),
        );

        source.set(&json!(1), &json!("hello")).await.unwrap();

        locale.set(Some(json!("fr")));
        assert!(source.get(&json!(1)).await.unwrap().is_none());

        locale.set(Some(json!("en")));
        assert_eq!(
            source.get(&json!(1)).await.unwrap().unwrap().result,
            json!("hello")
        );
    }

    #[tokio::test]
    async fn test_meaningless_params_share_one_entry() {
        let source = CacheDataSource::new(
            OperationId::new("allUsers").unwrap(),
            CacheAdapter::in_memory(),
            None,
            Store::new(true),
            Vec::new(),
            true,
            Arc::new(SystemClock),
        );

        source.set(&json!({"page": 1}), &json!(["A"])).await.unwrap();
        let hit = source.get(&json!({"page": 2})).await.unwrap().unwrap();
        assert_eq!(hit.result, json!(["A"]));
    }

    #[tokio::test]
    async fn test_adapter_swap_is_picked_up() {
        let adapter = CacheAdapter::in_memory();
        let source = source(adapter.clone(), None);

        source.set(&json!(1), &json!("old")).await.unwrap();
        adapter.replace(Arc::new(InMemoryStore::new(None, None)));

        assert!(source.get(&json!(1)).await.unwrap().is_none());
        source.set(&json!(1), &json!("new")).await.unwrap();
        assert_eq!(
            source.get(&json!(1)).await.unwrap().unwrap().result,
            json!("new")
        );
    }

    #[tokio::test]
    async fn test_adapter_failures_propagate() {
        let source = source(CacheAdapter::new(Arc::new(FailingStore)), None);

        assert!(matches!(
            source.get(&json!(1)).await,
            Err(Error::Adapter(_))
        ));
        assert!(matches!(
            source.set(&json!(1), &json!("A")).await,
            Err(Error::Adapter(_))
        ));
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let source = CacheDataSource::new(
            OperationId::new("userById").unwrap(),
            CacheAdapter::in_memory(),
            None,
            Store::new(true),
            vec![Sourced::effect(|_| async {
                Err(Error::Internal("lookup failed".to_string()))
            })],
            false,
            Arc::new(SystemClock),
        );

        assert!(matches!(
            source.get(&json!(1)).await,
            Err(Error::SourceResolution(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_source_still_operates() {
        let enabled = Store::new(false);
        let source = CacheDataSource::new(
            OperationId::new("userById").unwrap(),
            CacheAdapter::in_memory(),
            None,
            enabled.clone(),
            Vec::new(),
            false,
            Arc::new(SystemClock),
        );

        assert!(!source.enabled());
        source.set(&json!(1), &json!("A")).await.unwrap();
        assert!(source.get(&json!(1)).await.unwrap().is_some());

        enabled.set(true);
        assert!(source.enabled());
    }

    #[tokio::test]
    async fn test_purge_clears_all_calls() {
        let source = source(CacheAdapter::in_memory(), None);

        source.set(&json!(1), &json!("one")).await.unwrap();
        source.set(&json!(2), &json!("two")).await.unwrap();
        source.purge().await.unwrap();

        assert!(source.get(&json!(1)).await.unwrap().is_none());
        assert!(source.get(&json!(2)).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_sets_leave_one_whole_result() {
        let source = Arc::new(source(CacheAdapter::in_memory(), Some(Duration::from_secs(3600))));
        let params = json!({"id": 1});

        let writers: Vec<_> = (0..16u64)
            .map(|writer| {
                let source = Arc::clone(&source);
                let params = params.clone();
                tokio::spawn(async move {
                    let result = json!({"writer": writer, "payload": vec![writer; 64]});
                    source.set(&params, &result).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let hit = source.get(&params).await.unwrap().unwrap();
        let writer = hit.result["writer"].as_u64().unwrap();
        assert!(writer < 16);
        assert_eq!(hit.result["payload"], json!(vec![writer; 64]));
        assert!(!hit.stale);

        source.set(&params, &json!("last")).await.unwrap();
        assert_eq!(source.get(&params).await.unwrap().unwrap().result, json!("last"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_purge_racing_set_keeps_nothing_or_the_new_result() {
        let source = Arc::new(source(CacheAdapter::in_memory(), None));

        for round in 0..50 {
            let params = json!({"id": round});
            source.set(&params, &json!("old")).await.unwrap();

            let setter = tokio::spawn({
                let source = Arc::clone(&source);
                let params = params.clone();
                async move { source.set(&params, &json!("new")).await }
            });
            let purger = tokio::spawn({
                let source = Arc::clone(&source);
                async move { source.purge().await }
            });
            let (set, purge) = tokio::join!(setter, purger);
            set.unwrap().unwrap();
            purge.unwrap().unwrap();

            if let Some(hit) = source.get(&params).await.unwrap() {
                assert_eq!(hit.result, json!("new"));
            }
        }
    }
}
