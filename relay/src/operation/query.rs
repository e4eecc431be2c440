use crate::cache::Sourced;
use crate::domain::OperationId;
use crate::operation::remote_source::RemoteDataSource;
use crate::operation::{
    Handler, MapParams, OperationOutput, OperationParams, RemoteOperation, handler as boxed, remap,
};
use crate::ports::DataSource;
use crate::reactive::Store;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use shared::{Error, Result};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// What cache installation and attachment need from a query, beyond its public surface.
pub struct LowLevelApi {
    data_sources: RwLock<Vec<Arc<dyn DataSource>>>,
    sourced: Vec<Sourced>,
    params_are_meaningless: bool,
}

impl LowLevelApi {
    /// Snapshot of the chain, front first.
    pub fn data_sources(&self) -> Vec<Arc<dyn DataSource>> {
        self.data_sources.read().clone()
    }

    pub fn prepend_data_source(&self, source: Arc<dyn DataSource>) {
        self.data_sources.write().insert(0, source);
    }

    pub fn sourced(&self) -> &[Sourced] {
        &self.sourced
    }

    pub fn params_are_meaningless(&self) -> bool {
        self.params_are_meaningless
    }
}

struct QueryInner<P, R> {
    name: String,
    sid: Option<String>,
    handler: Handler<P, R>,
    attachable: bool,
    low_level: LowLevelApi,
    data: Store<Option<R>>,
    stale: Store<bool>,
    // Bumped by every invalidation; write-backs started before it are dropped
    epoch: AtomicU64,
}

/// A cacheable read operation.
///
/// Calls resolve through the query's data sources front to back. The remote
/// handler is always the last one.
pub struct Query<P, R> {
    inner: Arc<QueryInner<P, R>>,
}

impl<P, R> Clone for Query<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub struct QueryBuilder<P, R> {
    name: String,
    sid: Option<String>,
    handler: Handler<P, R>,
    sourced: Vec<Sourced>,
    params_are_meaningless: bool,
    attachable: bool,
}

impl<P, R> QueryBuilder<P, R>
where
    P: OperationParams,
    R: OperationOutput,
{
    /// Explicit cache id. Queries sharing one share cached entries.
    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Declare an input, other than params, that the result depends on.
    pub fn sourced(mut self, sourced: Sourced) -> Self {
        self.sourced.push(sourced);
        self
    }

    /// Every call shares one cache entry whatever its params.
    pub fn params_are_meaningless(mut self, meaningless: bool) -> Self {
        self.params_are_meaningless = meaningless;
        self
    }

    /// Build a query that refuses to be attached to.
    pub fn without_attach_hook(mut self) -> Self {
        self.attachable = false;
        self
    }

    pub fn build(self) -> Query<P, R> {
        let remote: Arc<dyn DataSource> =
            Arc::new(RemoteDataSource::new(self.name.clone(), self.handler.clone()));

        Query {
            inner: Arc::new(QueryInner {
                name: self.name,
                sid: self.sid,
                handler: self.handler,
                attachable: self.attachable,
                low_level: LowLevelApi {
                    data_sources: RwLock::new(vec![remote]),
                    sourced: self.sourced,
                    params_are_meaningless: self.params_are_meaningless,
                },
                data: Store::new(None),
                stale: Store::new(false),
                epoch: AtomicU64::new(0),
            }),
        }
    }
}

impl<P, R> Query<P, R>
where
    P: OperationParams,
    R: OperationOutput,
{
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self::builder(name, handler).build()
    }

    pub fn builder<F, Fut>(name: impl Into<String>, handler: F) -> QueryBuilder<P, R>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        QueryBuilder {
            name: name.into(),
            sid: None,
            handler: boxed(handler),
            sourced: Vec::new(),
            params_are_meaningless: false,
            attachable: true,
        }
    }

    fn from_handler(name: String, handler: Handler<P, R>) -> Self {
        QueryBuilder {
            name,
            sid: None,
            handler,
            sourced: Vec::new(),
            params_are_meaningless: false,
            attachable: true,
        }
        .build()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Cache namespace: the sid when given, the name otherwise.
    pub fn unique_id(&self) -> Result<OperationId> {
        OperationId::new(self.inner.sid.as_deref().unwrap_or(&self.inner.name))
    }

    pub fn low_level(&self) -> &LowLevelApi {
        &self.inner.low_level
    }

    /// Latest result, stale or not.
    pub fn data(&self) -> Store<Option<R>> {
        self.inner.data.clone()
    }

    /// Whether [`Query::data`] currently holds a stale result.
    pub fn stale(&self) -> Store<bool> {
        self.inner.stale.clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolve one call.
    ///
    /// A fresh hit ends the call and is written back to the enabled sources in
    /// front of the one that served it. A stale hit is published right away while
    /// later sources are still consulted. Failures of any source but the last are
    /// logged and skipped.
    pub async fn start(&self, params: P) -> Result<R> {
        let raw = serde_json::to_value(&params)?;
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let sources = self.inner.low_level.data_sources();
        let last = sources.len().saturating_sub(1);

        for (index, source) in sources.iter().enumerate() {
            if !source.enabled() {
                continue;
            }

            let hit = match source.get(&raw).await {
                Ok(hit) => hit,
                Err(err) if index < last => {
                    warn!(
                        operation = %self.inner.name,
                        source = source.name(),
                        error = %err,
                        "Data source failed, trying the next one"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            let Some(hit) = hit else {
                continue;
            };

            let result = match self.decode(&hit.result) {
                Ok(result) => result,
                Err(err) if index < last => {
                    warn!(
                        operation = %self.inner.name,
                        source = source.name(),
                        error = %err,
                        "Discarding unreadable result"
                    );
                    if let Err(err) = source.unset(&raw).await {
                        warn!(
                            operation = %self.inner.name,
                            source = source.name(),
                            error = %err,
                            "Failed to evict unreadable result"
                        );
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };

            if hit.stale {
                debug!(operation = %self.inner.name, source = source.name(), "Serving stale result");
                self.publish(&result, true);
                continue;
            }

            self.write_back(&sources[..index], &raw, &hit.result, epoch)
                .await;
            self.publish(&result, false);
            return Ok(result);
        }

        Err(Error::Internal(format!(
            "no data source of '{}' produced a result",
            self.inner.name
        )))
    }

    /// Drop every source's entry for `params`. In-flight write-backs are abandoned.
    pub async fn invalidate(&self, params: &P) -> Result<()> {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let raw = serde_json::to_value(params)?;

        for source in self.inner.low_level.data_sources() {
            source.unset(&raw).await?;
        }

        self.inner.stale.set(true);
        Ok(())
    }

    fn decode(&self, result: &Value) -> Result<R> {
        Ok(R::deserialize(result)?)
    }

    fn publish(&self, result: &R, stale: bool) {
        self.inner.data.set(Some(result.clone()));
        self.inner.stale.set(stale);
    }

    async fn write_back(
        &self,
        sources: &[Arc<dyn DataSource>],
        params: &Value,
        result: &Value,
        epoch: u64,
    ) {
        for source in sources.iter().filter(|source| source.enabled()) {
            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                debug!(operation = %self.inner.name, "Invalidated during the call, skipping write-back");
                return;
            }

            if let Err(err) = source.set(params, result).await {
                warn!(operation = %self.inner.name, source = source.name(), error = %err, "Write-back failed");
                continue;
            }

            // An invalidation landed while writing
            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                if let Err(err) = source.unset(params).await {
                    warn!(operation = %self.inner.name, source = source.name(), error = %err, "Failed to undo write-back");
                }
                return;
            }
        }
    }
}

impl<P, R> RemoteOperation for Query<P, R>
where
    P: OperationParams,
    R: OperationOutput,
{
    type Params = P;
    type Output = R;
    type Attached<NewParams: OperationParams> = Query<NewParams, R>;

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn attach_hook<NewParams, S>(
        &self,
        name: String,
        source: Store<S>,
        map_params: MapParams<NewParams, P, S>,
    ) -> Option<Query<NewParams, R>>
    where
        NewParams: OperationParams,
        S: Clone + Send + Sync + 'static,
    {
        if !self.inner.attachable {
            return None;
        }

        let handler = remap(self.inner.handler.clone(), source, map_params);
        Some(Query::from_handler(name, handler))
    }
}

impl<P, R> Debug for Query<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.inner.name)
            .field("sid", &self.inner.sid)
            .field("data_sources", &self.inner.low_level.data_sources.read().len())
            .field("stale", &self.inner.stale.get())
            .finish()
    }
}
