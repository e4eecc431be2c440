//! Derive a new operation from an existing one, remapping its params.
//!
//! The derived operation shares the original's remote handler. Its params are
//! mapped to the original's on every call, optionally reading a live source.

use crate::operation::{MapParams, OperationParams, RemoteOperation};
use crate::reactive::Store;
use shared::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// How to attach: the params mapping, its source and an optional name.
pub struct AttachConfig<NP, P, S = ()> {
    source: Store<S>,
    map_params: MapParams<NP, P, S>,
    name: Option<String>,
}

impl<NP, P> AttachConfig<NP, P, ()>
where
    NP: 'static,
    P: 'static,
{
    /// Map params without reading any source.
    pub fn map_params<F>(f: F) -> Self
    where
        F: Fn(NP) -> P + Send + Sync + 'static,
    {
        Self {
            source: Store::new(()),
            map_params: Arc::new(move |params: NP, _: &()| f(params)),
            name: None,
        }
    }
}

impl<NP, P, S> AttachConfig<NP, P, S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Map params using the current value of `source`, read on every call.
    pub fn with_source<F>(source: Store<S>, f: F) -> Self
    where
        F: Fn(NP, &S) -> P + Send + Sync + 'static,
    {
        Self {
            source,
            map_params: Arc::new(f),
            name: None,
        }
    }

    /// Name of the attached operation. Defaults to `"<original>.attached"`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Attach without any mapping: the operation itself.
pub fn attach_operation<O: RemoteOperation>(operation: &O) -> O {
    operation.clone()
}

/// Attach with `config`. Fails when `operation` exposes no attach hook.
pub fn attach_operation_with<O, NP, S>(
    operation: &O,
    config: AttachConfig<NP, O::Params, S>,
) -> Result<O::Attached<NP>>
where
    O: RemoteOperation,
    NP: OperationParams,
    S: Clone + Send + Sync + 'static,
{
    let name = config
        .name
        .unwrap_or_else(|| format!("{}.attached", operation.name()));

    debug!(operation = operation.name(), attached = %name, "Attaching operation");

    operation
        .attach_hook(name, config.source, config.map_params)
        .ok_or_else(|| Error::AttachUnavailable(operation.name().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheAdapter, CacheOptions, cache};
    use crate::operation::{Mutation, Query};
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Lookup {
        id: u32,
    }

    fn recording_query() -> (Query<u32, String>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let query = Query::new("userById", move |id: u32| {
            log.lock().push(id);
            async move { Ok(format!("user-{}", id)) }
        });
        (query, seen)
    }

    #[tokio::test]
    async fn test_attach_without_config_is_identity() {
        let (query, seen) = recording_query();
        let attached = attach_operation(&query);

        assert!(attached.ptr_eq(&query));
        assert_eq!(attached.start(3).await.unwrap(), "user-3");
        assert_eq!(*seen.lock(), vec![3]);
    }

    #[tokio::test]
    async fn test_map_params() {
        let (query, seen) = recording_query();
        let attached: Query<Lookup, String> =
            attach_operation_with(&query, AttachConfig::map_params(|lookup: Lookup| lookup.id))
                .unwrap();

        assert_eq!(attached.start(Lookup { id: 7 }).await.unwrap(), "user-7");
        assert_eq!(*seen.lock(), vec![7]);
        assert_eq!(attached.name(), "userById.attached");
    }

    #[tokio::test]
    async fn test_source_is_read_per_call() {
        let greet: Query<String, String> =
            Query::new("greet", |key: String| async move { Ok(format!("hello {}", key)) });
        let locale = Store::new("en".to_string());

        let attached = attach_operation_with(
            &greet,
            AttachConfig::with_source(locale.clone(), |name: String, locale: &String| {
                format!("{}:{}", locale, name)
            })
            .named("localizedGreet"),
        )
        .unwrap();

        assert_eq!(attached.name(), "localizedGreet");
        assert_eq!(attached.start("ann".to_string()).await.unwrap(), "hello en:ann");

        locale.set("fr".to_string());
        assert_eq!(attached.start("ann".to_string()).await.unwrap(), "hello fr:ann");
    }

    #[tokio::test]
    async fn test_missing_hook_is_an_error() {
        let query: Query<u32, String> =
            Query::builder("sealed", |id: u32| async move { Ok(id.to_string()) })
                .without_attach_hook()
                .build();

        let result = attach_operation_with(&query, AttachConfig::map_params(|id: u64| id as u32));
        assert!(matches!(result, Err(Error::AttachUnavailable(name)) if name == "sealed"));

        // Attaching with no config never needs the hook
        assert!(attach_operation(&query).ptr_eq(&query));
    }

    #[tokio::test]
    async fn test_attach_mutation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let delete: Mutation<u32, ()> = Mutation::new("deleteUser", move |id: u32| {
            log.lock().push(id);
            async { Ok(()) }
        });

        let attached: Mutation<Lookup, ()> =
            attach_operation_with(&delete, AttachConfig::map_params(|lookup: Lookup| lookup.id))
                .unwrap();
        attached.start(Lookup { id: 9 }).await.unwrap();
        assert_eq!(*seen.lock(), vec![9]);

        let detached: Mutation<u32, ()> = Mutation::detached("purgeAll", |_id: u32| async { Ok(()) });
        assert!(matches!(
            attach_operation_with(&detached, AttachConfig::map_params(|id: u32| id)),
            Err(Error::AttachUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_attached_query_caches_under_its_own_id() {
        let (query, seen) = recording_query();
        let attached: Query<Lookup, String> =
            attach_operation_with(&query, AttachConfig::map_params(|lookup: Lookup| lookup.id))
                .unwrap();

        let adapter = CacheAdapter::in_memory();
        cache(
            &attached,
            CacheOptions::new()
                .with_adapter(adapter)
                .with_stale_after("1h"),
        )
        .unwrap();

        attached.start(Lookup { id: 1 }).await.unwrap();
        attached.start(Lookup { id: 1 }).await.unwrap();
        assert_eq!(*seen.lock(), vec![1]);

        // The original has no cache of its own
        query.start(1).await.unwrap();
        assert_eq!(*seen.lock(), vec![1, 1]);
    }
}
