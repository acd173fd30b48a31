//! Echo handler: returns its parameters unchanged. Useful as a smoke test
//! for the whole dispatch → claim → execute path.

use async_trait::async_trait;
use serde_json::Value;

use crate::handler::{Handler, HandlerContext};

pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn execute(&self, _ctx: &HandlerContext, params: Value) -> anyhow::Result<Value> {
        Ok(params)
    }
}
