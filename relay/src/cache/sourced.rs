use crate::reactive::Store;
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::Value;
use shared::{Error, Result};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

type Reader = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync>;

/// An auxiliary input a query's result depends on besides its params.
///
/// Whatever shape it is declared in, it is read the same way: an async
/// function of the current params. `Ok(None)` means "unresolved", which makes
/// the call uncacheable.
#[derive(Clone)]
pub struct Sourced {
    kind: &'static str,
    reader: Reader,
}

impl Sourced {
    /// A constant.
    pub fn value(value: Value) -> Self {
        Self::sync("value", move |_| Some(value.clone()))
    }

    /// The current value of a store; `None` in the store is unresolved.
    pub fn store(store: Store<Option<Value>>) -> Self {
        Self::sync("store", move |_| store.get())
    }

    /// A function of the params.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self::sync("fn", f)
    }

    /// A function of the params and the current value of `source`.
    pub fn with_source<S, F>(source: Store<S>, f: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(&Value, &S) -> Option<Value> + Send + Sync + 'static,
    {
        Self::sync("source", move |params| source.with(|value| f(params, value)))
    }

    /// An async reader, e.g. one that looks something up remotely.
    pub fn effect<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        Self {
            kind: "effect",
            reader: Arc::new(move |params: Value| f(params).boxed()),
        }
    }

    fn sync<F>(kind: &'static str, f: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            kind,
            reader: Arc::new(move |params: Value| {
                let value: Result<Option<Value>> = Ok(f(&params));
                async move { value }.boxed()
            }),
        }
    }

    pub async fn read(&self, params: &Value) -> Result<Option<Value>> {
        (self.reader)(params.clone()).await.map_err(|err| match err {
            Error::SourceResolution(_) => err,
            other => Error::SourceResolution(format!("{} reader: {}", self.kind, other)),
        })
    }
}

impl Debug for Sourced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sourced").field("kind", &self.kind).finish()
    }
}

/// Resolve every declared sourced value for `params`, concurrently.
///
/// Output order matches declaration order. Any failure fails the whole
/// resolution; no partial results are returned.
pub async fn resolve_all(sourced: &[Sourced], params: &Value) -> Result<Vec<Option<Value>>> {
    try_join_all(sourced.iter().map(|reader| reader.read(params))).await
}
