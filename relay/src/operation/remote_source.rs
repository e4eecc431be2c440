use crate::domain::CachedResult;
use crate::operation::{Handler, OperationOutput, OperationParams};
use crate::ports::DataSource;
use async_trait::async_trait;
use serde_json::Value;
use shared::Result;
use tracing::debug;

/// Last link of every query's chain: calls the remote handler.
///
/// Always answers fresh. Writes are no-ops; the remote is the source of truth.
pub struct RemoteDataSource<P, R> {
    operation: String,
    handler: Handler<P, R>,
}

impl<P, R> RemoteDataSource<P, R> {
    pub const NAME: &'static str = "remote";

    pub fn new(operation: String, handler: Handler<P, R>) -> Self {
        Self { operation, handler }
    }
}

#[async_trait]
impl<P, R> DataSource for RemoteDataSource<P, R>
where
    P: OperationParams,
    R: OperationOutput,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn get(&self, params: &Value) -> Result<Option<CachedResult>> {
        let params: P = serde_json::from_value(params.clone())?;
        debug!(operation = %self.operation, "Calling remote");

        let result = (self.handler)(params).await?;
        Ok(Some(CachedResult::fresh(serde_json::to_value(result)?)))
    }

    async fn set(&self, _params: &Value, _result: &Value) -> Result<()> {
        Ok(())
    }

    async fn unset(&self, _params: &Value) -> Result<()> {
        Ok(())
    }
}
