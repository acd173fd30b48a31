//! Handler contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use cadence_db::DatabaseRegistry;

/// Resources available to a running handler.
///
/// Handlers do their database work through the transaction coordinator
/// (`cadence_db::transaction`) against the registry carried here; the
/// worker itself never holds a transaction across a handler invocation.
#[derive(Clone)]
pub struct HandlerContext {
    registry: Arc<DatabaseRegistry>,
}

impl HandlerContext {
    pub fn new(registry: Arc<DatabaseRegistry>) -> Self {
        Self { registry }
    }

    pub fn databases(&self) -> &DatabaseRegistry {
        &self.registry
    }
}

/// One unit of user-supplied batch logic.
///
/// `params` is the execution row's snapshotted JSON; the returned value is
/// stored in the row's `result` column. Any error marks the attempt FAILED
/// with the error's string as `error_message`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(&self, ctx: &HandlerContext, params: Value) -> anyhow::Result<Value>;
}
