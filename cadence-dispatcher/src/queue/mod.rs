//! Queue dispatcher.
//!
//! Consumes envelopes from an external queue adapter and converts each to
//! one `job_executions` row with `param_source = event`. Base parameters
//! come from the referenced cron job (by id, else first match on handler
//! name) and are shallow-merged with the message parameters; message keys
//! win on conflict.

pub mod adapter;
#[cfg(feature = "kafka")]
pub mod kafka;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cadence_db::{current_tx, transaction, DatabaseRegistry, SqlParam, TxMode};

use crate::config::QueueDispatcherConfig;
use crate::error::QueueError;
use crate::queries;
use adapter::{QueueAdapter, QueueMessage};

pub struct QueueDispatcher<A: QueueAdapter> {
    registry: Arc<DatabaseRegistry>,
    config: QueueDispatcherConfig,
    adapter: A,
    shutdown: CancellationToken,
}

impl<A: QueueAdapter> QueueDispatcher<A> {
    pub fn new(
        registry: Arc<DatabaseRegistry>,
        config: QueueDispatcherConfig,
        adapter: A,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            config,
            adapter,
            shutdown,
        }
    }

    /// Consume until shutdown. Connect failures propagate (startup fault);
    /// per-message failures abandon the message and continue.
    pub async fn run(&mut self) -> Result<(), QueueError> {
        self.adapter.connect().await?;
        info!(topic = %self.config.topic, "queue dispatcher started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.adapter.next_message() => match received {
                    Ok(Some(message)) => self.handle_message(message).await,
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "queue receive failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        self.adapter.disconnect().await?;
        info!("queue dispatcher stopped");
        Ok(())
    }

    async fn handle_message(&mut self, message: QueueMessage) {
        match self.process_message(&message).await {
            Ok(execution_id) => {
                info!(
                    execution_id,
                    handler = %message.handler_name,
                    job_id = ?message.job_id,
                    "created event execution"
                );
                if let Err(e) = self.adapter.complete(&message).await {
                    error!(error = %e, "failed to acknowledge message");
                }
            }
            Err(e @ QueueError::Malformed(_)) => {
                // Redelivery cannot fix these; acknowledge and drop.
                warn!(error = %e, "dropping undeliverable message");
                if let Err(ack_err) = self.adapter.complete(&message).await {
                    error!(error = %ack_err, "failed to acknowledge dropped message");
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    handler = %message.handler_name,
                    "failed to process message, abandoning for redelivery"
                );
                if let Err(abandon_err) = self.adapter.abandon(&message).await {
                    error!(error = %abandon_err, "failed to abandon message");
                }
            }
        }
    }

    async fn process_message(&self, message: &QueueMessage) -> Result<i64, QueueError> {
        let base = self.resolve_base_params(message).await?;

        let mut merged = base;
        for (key, value) in &message.params {
            merged.insert(key.clone(), value.clone());
        }

        self.insert_event_execution(message, Value::Object(merged))
            .await
    }

    /// Base parameters from the referenced cron job: by `job_id` when the
    /// message carries one, otherwise the first enabled cron job bound to
    /// the same handler. No match is fine (empty base).
    async fn resolve_base_params(
        &self,
        message: &QueueMessage,
    ) -> Result<Map<String, Value>, QueueError> {
        let database = self.config.database.as_str();
        let job = transaction(&self.registry, &[database], TxMode::ReadOnly, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            let row = match message.job_id {
                Some(job_id) => {
                    tx.fetch_optional(
                        queries::cron_job_by_id(kind),
                        &[SqlParam::from(job_id)],
                    )
                    .await?
                }
                None => {
                    tx.fetch_optional(
                        queries::cron_job_by_handler(kind),
                        &[SqlParam::from(message.handler_name.as_str())],
                    )
                    .await?
                }
            };
            match row {
                Some(row) => Ok(Some(queries::cron_job_from_row(&row)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(QueueError::Db)?;

        Ok(match job.and_then(|j| j.handler_params) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        })
    }

    async fn insert_event_execution(
        &self,
        message: &QueueMessage,
        params: Value,
    ) -> Result<i64, QueueError> {
        let database = self.config.database.as_str();
        let handler_name = message.handler_name.clone();
        transaction(&self.registry, &[database], TxMode::ReadWrite, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let now = Utc::now();
            let bind = [
                SqlParam::from(message.job_id),
                SqlParam::from(message.handler_name.as_str()),
                SqlParam::from(now),
                SqlParam::from(params.clone()),
                SqlParam::from(now),
            ];
            let kind = tx.kind();
            tx.execute_returning_id(queries::insert_event_execution(kind), &bind)
                .await
        })
        .await
        .map_err(|source| QueueError::Insert {
            handler: handler_name,
            source,
        })
    }
}
