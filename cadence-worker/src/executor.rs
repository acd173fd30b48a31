//! Execution of one claimed row.
//!
//! The supervisor has already won the PENDING→RUNNING claim; this module
//! looks up the handler, runs it under the per-attempt deadline and
//! records the outcome. FAILED/TIMEOUT increment `retry_count` in the same
//! statement; the row re-queues while the incremented count stays within
//! the owning cron job's budget. A missing handler is terminal (the cause
//! is not transient), so its budget is spent but no re-queue happens.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cadence_db::{current_tx, transaction, DatabaseRegistry, DbError, SqlParam, TxMode};

use crate::error::WorkerError;
use crate::handler::HandlerContext;
use crate::queries::{self, PendingExecution};
use crate::registry::HandlerRegistry;

enum Outcome {
    Success(Value),
    Failed(String),
    TimedOut,
}

pub(crate) struct Executor {
    registry: Arc<DatabaseRegistry>,
    handlers: Arc<HandlerRegistry>,
    database: String,
}

impl Executor {
    pub(crate) fn new(
        registry: Arc<DatabaseRegistry>,
        handlers: Arc<HandlerRegistry>,
        database: String,
    ) -> Self {
        Self {
            registry,
            handlers,
            database,
        }
    }

    /// Run one claimed execution to a terminal or re-queued state.
    ///
    /// `force_cancel` fires when the shutdown grace period is over; it
    /// takes the same path as a deadline expiry, so the row is recorded as
    /// TIMEOUT rather than left RUNNING forever.
    pub(crate) async fn execute(&self, execution: &PendingExecution, force_cancel: CancellationToken) {
        info!(
            execution_id = execution.id,
            job_id = ?execution.job_id,
            job = ?execution.job_name,
            handler = %execution.handler_name,
            scheduled_time = %execution.scheduled_time,
            retry_count = execution.retry_count,
            "starting execution"
        );

        let Some(handler) = self.handlers.instantiate(&execution.handler_name) else {
            let missing = WorkerError::HandlerNotFound(execution.handler_name.clone());
            error!(execution_id = execution.id, error = %missing, "handler lookup failed");
            if let Err(e) = self.mark_failed(execution.id, &missing.to_string()).await {
                error!(execution_id = execution.id, error = %e, "failed to record failure");
            }
            // Non-transient: never re-queue.
            return;
        };

        let params = execution
            .params
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let ctx = HandlerContext::new(self.registry.clone());
        let deadline = Duration::from_secs(execution.timeout_seconds.max(1) as u64);

        let invocation = AssertUnwindSafe(handler.execute(&ctx, params)).catch_unwind();
        let outcome = tokio::select! {
            _ = force_cancel.cancelled() => Outcome::TimedOut,
            finished = tokio::time::timeout(deadline, invocation) => match finished {
                Err(_) => Outcome::TimedOut,
                Ok(Err(panic)) => Outcome::Failed(panic_message(panic)),
                Ok(Ok(Err(e))) => Outcome::Failed(format!("{e:#}")),
                Ok(Ok(Ok(value))) => Outcome::Success(value),
            },
        };

        let recorded = match outcome {
            Outcome::Success(value) => {
                info!(execution_id = execution.id, "execution succeeded");
                self.mark_success(execution.id, value).await
            }
            Outcome::Failed(message) => {
                warn!(execution_id = execution.id, error = %message, "execution failed");
                match self.mark_failed(execution.id, &message).await {
                    Ok(()) => self.maybe_requeue(execution).await,
                    Err(e) => Err(e),
                }
            }
            Outcome::TimedOut => {
                warn!(
                    execution_id = execution.id,
                    timeout_seconds = execution.timeout_seconds,
                    "execution timed out"
                );
                match self.mark_timed_out(execution.id).await {
                    Ok(()) => self.maybe_requeue(execution).await,
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = recorded {
            error!(execution_id = execution.id, error = %e, "failed to record outcome");
        }
    }

    async fn mark_success(&self, execution_id: i64, result: Value) -> Result<(), DbError> {
        let database = self.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadWrite, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            tx.execute(
                queries::complete_execution(kind),
                &[
                    SqlParam::from(Utc::now()),
                    SqlParam::from(result.clone()),
                    SqlParam::from(execution_id),
                ],
            )
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_failed(&self, execution_id: i64, message: &str) -> Result<(), DbError> {
        let database = self.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadWrite, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            tx.execute(
                queries::fail_execution(kind),
                &[
                    SqlParam::from(Utc::now()),
                    SqlParam::from(message),
                    SqlParam::from(execution_id),
                ],
            )
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_timed_out(&self, execution_id: i64) -> Result<(), DbError> {
        let database = self.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadWrite, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            tx.execute(
                queries::timeout_execution(kind),
                &[SqlParam::from(Utc::now()), SqlParam::from(execution_id)],
            )
            .await?;
            Ok(())
        })
        .await
    }

    /// Re-queue while the incremented retry count stays within budget.
    /// Total attempts per row = 1 + max_retry.
    async fn maybe_requeue(&self, execution: &PendingExecution) -> Result<(), DbError> {
        let database = self.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadWrite, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            let row = tx
                .fetch_one(
                    queries::current_retry_count(kind),
                    &[SqlParam::from(execution.id)],
                )
                .await?;
            let retry_count = row.get_i32("retry_count")?;
            if retry_count <= execution.max_retry {
                info!(
                    execution_id = execution.id,
                    retry_count,
                    max_retry = execution.max_retry,
                    "re-queueing for retry"
                );
                tx.execute(
                    queries::requeue_execution(kind),
                    &[SqlParam::from(execution.id)],
                )
                .await?;
            }
            Ok(())
        })
        .await
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
