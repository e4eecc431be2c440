use crate::operation::{
    Handler, MapParams, OperationOutput, OperationParams, RemoteOperation, handler as boxed, remap,
};
use crate::reactive::Store;
use shared::Result;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

struct MutationInner<P, R> {
    name: String,
    handler: Handler<P, R>,
    attachable: bool,
}

/// A write operation. Never cached.
pub struct Mutation<P, R> {
    inner: Arc<MutationInner<P, R>>,
}

impl<P, R> Clone for Mutation<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R> Mutation<P, R>
where
    P: OperationParams,
    R: OperationOutput,
{
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self::from_handler(name.into(), boxed(handler), true)
    }

    /// A mutation that refuses to be attached to.
    pub fn detached<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self::from_handler(name.into(), boxed(handler), false)
    }

    fn from_handler(name: String, handler: Handler<P, R>, attachable: bool) -> Self {
        Self {
            inner: Arc::new(MutationInner {
                name,
                handler,
                attachable,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn start(&self, params: P) -> Result<R> {
        debug!(operation = %self.inner.name, "Starting mutation");
        (self.inner.handler)(params).await
    }
}

impl<P, R> RemoteOperation for Mutation<P, R>
where
    P: OperationParams,
    R: OperationOutput,
{
    type Params = P;
    type Output = R;
    type Attached<NewParams: OperationParams> = Mutation<NewParams, R>;

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn attach_hook<NewParams, S>(
        &self,
        name: String,
        source: Store<S>,
        map_params: MapParams<NewParams, P, S>,
    ) -> Option<Mutation<NewParams, R>>
    where
        NewParams: OperationParams,
        S: Clone + Send + Sync + 'static,
    {
        if !self.inner.attachable {
            return None;
        }

        let handler = remap(self.inner.handler.clone(), source, map_params);
        Some(Mutation::from_handler(name, handler, true))
    }
}

impl<P, R> Debug for Mutation<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutation")
            .field("name", &self.inner.name)
            .field("attachable", &self.inner.attachable)
            .finish()
    }
}
