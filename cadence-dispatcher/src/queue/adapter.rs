//! Queue adapter contract.
//!
//! Adapters deliver decoded envelopes with an opaque delivery token; the
//! dispatcher acknowledges with `complete` or returns a message to the
//! queue with `abandon`. Kafka ships in this crate (feature `kafka`);
//! other buses plug in through the same surface.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::QueueError;

/// Broker coordinates of one delivery, used to commit or rewind it.
#[derive(Debug, Clone, Default)]
pub struct DeliveryToken {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// One decoded queue message.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub handler_name: String,
    pub params: Map<String, Value>,
    pub job_id: Option<i64>,
    pub token: DeliveryToken,
}

#[async_trait]
pub trait QueueAdapter: Send {
    async fn connect(&mut self) -> Result<(), QueueError>;

    async fn disconnect(&mut self) -> Result<(), QueueError>;

    /// The next decoded message. `None` means the poll produced nothing
    /// usable this round (timeout, or a malformed payload that was
    /// dropped); callers just poll again.
    async fn next_message(&mut self) -> Result<Option<QueueMessage>, QueueError>;

    /// Acknowledge a processed message.
    async fn complete(&mut self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Return a message to the queue for redelivery.
    async fn abandon(&mut self, message: &QueueMessage) -> Result<(), QueueError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    // The original producer fleet used both field names.
    #[serde(default, alias = "handler")]
    handler_name: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    job_id: Option<i64>,
}

/// Decode a JSON envelope: `{ handler_name, params?, job_id? }`.
pub fn parse_envelope(payload: &[u8]) -> Result<(String, Map<String, Value>, Option<i64>), QueueError> {
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| QueueError::Malformed(e.to_string()))?;

    let handler_name = envelope.handler_name.unwrap_or_default();
    if handler_name.is_empty() {
        return Err(QueueError::Malformed(
            "missing or empty handler_name".to_string(),
        ));
    }

    let params = match envelope.params {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(QueueError::Malformed(format!(
                "params must be an object, got {other}"
            )))
        }
    };

    Ok((handler_name, params, envelope.job_id))
}
