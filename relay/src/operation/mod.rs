//! Remote operations: [`Query`] (read, cacheable) and [`Mutation`] (write).
//!
//! Both wrap an async handler performing the actual remote call and expose a
//! low-level attach hook used by [`crate::attach`].

pub mod mutation;
pub mod query;
pub mod remote_source;

pub use mutation::Mutation;
pub use query::{LowLevelApi, Query, QueryBuilder};
pub use remote_source::RemoteDataSource;

use crate::reactive::Store;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::Result;
use std::future::Future;
use std::sync::Arc;

/// Anything usable as operation params. Params cross the cache boundary as JSON.
pub trait OperationParams: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> OperationParams for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Anything usable as an operation result. Results are cached as JSON.
pub trait OperationOutput: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> OperationOutput for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// The remote call behind an operation.
pub type Handler<P, R> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Maps the params of an attached operation, plus its source value, to the original params.
pub type MapParams<NP, P, S> = Arc<dyn Fn(NP, &S) -> P + Send + Sync>;

pub(crate) fn handler<P, R, F, Fut>(f: F) -> Handler<P, R>
where
    P: Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    Arc::new(move |params: P| f(params).boxed())
}

/// Wrap `original` so it is called with remapped params. `source` is read on every call.
pub(crate) fn remap<NP, P, R, S>(
    original: Handler<P, R>,
    source: Store<S>,
    map_params: MapParams<NP, P, S>,
) -> Handler<NP, R>
where
    NP: Send + 'static,
    P: 'static,
    R: 'static,
    S: Clone + Send + Sync + 'static,
{
    Arc::new(move |params: NP| {
        let mapped = source.with(|value| map_params(params, value));
        original(mapped)
    })
}

/// Common surface of queries and mutations.
pub trait RemoteOperation: Clone + Send + Sync + 'static {
    type Params: OperationParams;
    type Output: OperationOutput;
    /// Attaching keeps the operation kind: a query stays a query.
    type Attached<NewParams: OperationParams>: RemoteOperation<Params = NewParams, Output = Self::Output>;

    fn name(&self) -> &str;

    /// Low-level attach hook. `None` when this operation cannot be attached to.
    fn attach_hook<NewParams, S>(
        &self,
        name: String,
        source: Store<S>,
        map_params: MapParams<NewParams, Self::Params, S>,
    ) -> Option<Self::Attached<NewParams>>
    where
        NewParams: OperationParams,
        S: Clone + Send + Sync + 'static;
}
