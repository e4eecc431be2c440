//! Cache layer for queries.
//!
//! [`cache`] resolves a [`CacheOptions`], builds a [`CacheDataSource`] for the
//! query and puts it at the front of the query's data sources. From then on,
//! every call first asks the cache and falls back to the remote handler.

pub mod adapter;
pub mod data_source;
pub mod key;
pub mod sourced;

pub use adapter::CacheAdapter;
pub use data_source::CacheDataSource;
pub use key::{Uncacheable, derive_key, try_derive_key};
pub use sourced::{Sourced, resolve_all};

use crate::operation::{OperationOutput, OperationParams, Query};
use crate::reactive::{Event, Reactive, Store};
use shared::config::Config;
use shared::{Clock, Result, SystemClock, parse_time};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How to cache a query. Everything is optional.
#[derive(Clone, Default)]
pub struct CacheOptions {
    /// Defaults to a fresh unbounded in-memory adapter.
    pub adapter: Option<CacheAdapter>,
    /// Duration string such as `"10s"` or `"1h 30min"`. Unset means every hit is stale.
    pub stale_after: Option<String>,
    /// Emitting this clears the adapter instance.
    pub purge: Option<Event<()>>,
    /// Defaults to enabled.
    pub enabled: Option<Reactive<bool>>,
    /// Defaults to the system clock.
    pub clock: Option<Arc<dyn Clock>>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Staleness and enablement from environment configuration. The adapter is left to the caller.
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_after: config.stale_after.clone(),
            enabled: Some(Reactive::Static(config.cache_enabled)),
            ..Self::default()
        }
    }

    pub fn with_adapter(mut self, adapter: CacheAdapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn with_stale_after(mut self, stale_after: impl Into<String>) -> Self {
        self.stale_after = Some(stale_after.into());
        self
    }

    pub fn with_purge(mut self, purge: Event<()>) -> Self {
        self.purge = Some(purge);
        self
    }

    pub fn with_enabled(mut self, enabled: impl Into<Reactive<bool>>) -> Self {
        self.enabled = Some(enabled.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl Debug for CacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptions")
            .field("adapter", &self.adapter)
            .field("stale_after", &self.stale_after)
            .field("purge", &self.purge)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// [`CacheOptions`] with every default applied and `stale_after` parsed.
#[derive(Clone)]
pub struct CacheSettings {
    pub adapter: CacheAdapter,
    pub stale_after: Option<Duration>,
    pub purge: Option<Event<()>>,
    pub enabled: Store<bool>,
    pub clock: Arc<dyn Clock>,
}

impl CacheSettings {
    pub fn resolve(options: CacheOptions) -> Result<Self> {
        let stale_after = options
            .stale_after
            .as_deref()
            .map(parse_time)
            .transpose()?;

        Ok(Self {
            adapter: options.adapter.unwrap_or_default(),
            stale_after,
            purge: options.purge,
            enabled: options
                .enabled
                .unwrap_or(Reactive::Static(true))
                .into_store(),
            clock: options.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

/// Install a cache in front of `query`.
///
/// Installing twice stacks two cache sources; the later one is consulted first.
pub fn cache<P, R>(query: &Query<P, R>, options: CacheOptions) -> Result<Arc<CacheDataSource>>
where
    P: OperationParams,
    R: OperationOutput,
{
    let settings = CacheSettings::resolve(options)?;
    let id = query.unique_id()?;
    let low_level = query.low_level();

    let source = Arc::new(CacheDataSource::new(
        id.clone(),
        settings.adapter.clone(),
        settings.stale_after,
        settings.enabled.clone(),
        low_level.sourced().to_vec(),
        low_level.params_are_meaningless(),
        settings.clock,
    ));
    low_level.prepend_data_source(source.clone());

    if let Some(purge) = settings.purge {
        let adapter = settings.adapter;
        let operation = id.clone();
        // Not gated by `enabled`
        purge.watch(move |()| {
            let store = adapter.instance();
            let operation = operation.clone();
            async move {
                info!(%operation, "Purging cache adapter");
                store.purge().await
            }
        });
    }

    info!(
        operation = %id,
        stale_after = ?settings.stale_after,
        enabled = settings.enabled.get(),
        "Cache installed"
    );

    Ok(source)
}
