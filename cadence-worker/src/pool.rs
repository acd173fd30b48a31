//! Worker pool supervisor.
//!
//! Polls for PENDING rows oldest-first, claims each with the status CAS
//! and dispatches winners to execution units bounded by a semaphore of
//! `pool_size` permits. On shutdown, polling stops immediately; in-flight
//! units get `shutdown_timeout_seconds` to finish before the force-cancel
//! token pushes them down the TIMEOUT path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cadence_db::{current_tx, transaction, DatabaseRegistry, DbError, SqlParam, TxMode};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::executor::Executor;
use crate::queries::{self, PendingExecution};
use crate::registry::HandlerRegistry;

pub struct WorkerPool {
    registry: Arc<DatabaseRegistry>,
    handlers: Arc<HandlerRegistry>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        registry: Arc<DatabaseRegistry>,
        handlers: Arc<HandlerRegistry>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            handlers,
            config,
            shutdown,
        }
    }

    /// Supervisor loop. Runs until the shutdown token fires, then drains.
    pub async fn run(&self) {
        info!(
            pool_size = self.config.pool_size,
            poll_interval = self.config.poll_interval_seconds,
            handlers = self.handlers.len(),
            "worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.pool_size));
        let force_cancel = CancellationToken::new();
        let executor = Arc::new(Executor::new(
            self.registry.clone(),
            self.handlers.clone(),
            self.config.database.clone(),
        ));
        let mut units: JoinSet<()> = JoinSet::new();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            // Reap finished units so the set does not grow unbounded.
            while let Some(finished) = units.try_join_next() {
                if let Err(e) = finished {
                    error!(error = %e, "execution unit failed");
                }
            }

            // Take permits first: never claim more rows than can start.
            let mut permits = Vec::new();
            while permits.len() < self.config.claim_batch_size {
                match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permits.push(permit),
                    Err(_) => break,
                }
            }

            if permits.is_empty() {
                debug!("no free execution units, skipping poll");
            } else {
                match self.poll_and_claim(permits.len()).await {
                    Ok(claimed) => {
                        for (execution, permit) in claimed.into_iter().zip(permits.drain(..)) {
                            let executor = executor.clone();
                            let force = force_cancel.clone();
                            units.spawn(async move {
                                let _permit = permit;
                                executor.execute(&execution, force).await;
                            });
                        }
                        // Leftover permits release on drop.
                    }
                    Err(WorkerError::Db(DbError::PoolExhausted(reason))) => {
                        warn!(%reason, "connection pool exhausted, retrying next tick");
                    }
                    Err(e) => {
                        error!(error = %e, "poll failed");
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_seconds)) => {}
            }
        }

        self.drain(units, force_cancel).await;
        info!("worker pool stopped");
    }

    async fn drain(&self, mut units: JoinSet<()>, force_cancel: CancellationToken) {
        if units.is_empty() {
            return;
        }

        info!(in_flight = units.len(), "waiting for in-flight executions");
        let grace = Duration::from_secs(self.config.shutdown_timeout_seconds);
        let all_done = async {
            while let Some(finished) = units.join_next().await {
                if let Err(e) = finished {
                    error!(error = %e, "execution unit failed during drain");
                }
            }
        };

        if tokio::time::timeout(grace, all_done).await.is_err() {
            warn!(
                shutdown_timeout = self.config.shutdown_timeout_seconds,
                "shutdown grace period over, cancelling in-flight executions"
            );
            force_cancel.cancel();
            while let Some(finished) = units.join_next().await {
                if let Err(e) = finished {
                    error!(error = %e, "execution unit failed after cancellation");
                }
            }
        }
    }

    /// Read up to `limit` PENDING rows and claim each one. A claim that
    /// affects zero rows lost the race to another worker and is dropped.
    async fn poll_and_claim(&self, limit: usize) -> Result<Vec<PendingExecution>, WorkerError> {
        let pending = self.pending_executions(limit).await?;
        if pending.is_empty() {
            return Ok(pending);
        }
        debug!(count = pending.len(), "found pending executions");

        let mut claimed = Vec::with_capacity(pending.len());
        for execution in pending {
            if self.claim(execution.id).await? {
                claimed.push(execution);
            } else {
                debug!(execution_id = execution.id, "claim lost to another worker");
            }
        }
        Ok(claimed)
    }

    async fn pending_executions(&self, limit: usize) -> Result<Vec<PendingExecution>, WorkerError> {
        let database = self.config.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadOnly, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            let rows = tx
                .fetch_all(
                    queries::pending_executions(kind),
                    &[SqlParam::from(limit as i64)],
                )
                .await?;
            let mut pending = Vec::with_capacity(rows.len());
            for row in &rows {
                match queries::pending_from_row(row) {
                    Ok(execution) => pending.push(execution),
                    Err(e) => error!(error = %e, "failed to decode execution row, skipping"),
                }
            }
            Ok(pending)
        })
        .await
    }

    async fn claim(&self, execution_id: i64) -> Result<bool, WorkerError> {
        let database = self.config.database.as_str();
        transaction(&self.registry, &[database], TxMode::ReadWrite, || async {
            let tx = current_tx(database)?;
            let mut tx = tx.lock().await;
            let kind = tx.kind();
            let affected = tx
                .execute(
                    queries::claim_execution(kind),
                    &[SqlParam::from(Utc::now()), SqlParam::from(execution_id)],
                )
                .await?;
            Ok(affected == 1)
        })
        .await
    }
}
