//! Configurable test handler.
//!
//! Params:
//! ```json
//! { "sleep_seconds": 1, "should_fail": false, "message": "hello" }
//! ```

use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::handler::{Handler, HandlerContext};

fn default_message() -> String {
    "sample job executed".to_string()
}

#[derive(Debug, Deserialize)]
struct SampleParams {
    #[serde(default)]
    sleep_seconds: f64,
    #[serde(default)]
    should_fail: bool,
    #[serde(default = "default_message")]
    message: String,
}

pub struct SampleHandler;

#[async_trait]
impl Handler for SampleHandler {
    async fn execute(&self, _ctx: &HandlerContext, params: Value) -> anyhow::Result<Value> {
        let params: SampleParams = serde_json::from_value(params)?;

        if params.sleep_seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(params.sleep_seconds)).await;
        }

        if params.should_fail {
            bail!("simulated failure: {}", params.message);
        }

        Ok(json!({ "action": "execute", "message": params.message }))
    }
}
