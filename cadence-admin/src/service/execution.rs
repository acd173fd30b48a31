//! Execution history management.

use thiserror::Error;

use cadence_core::dto::execution::ExecutionView;
use cadence_core::dto::page::Page;
use cadence_core::ExecutionStatus;
use cadence_db::{current_tx, transaction, DbError, TxMode};

use crate::repository::execution::ExecutionFilter;
use crate::state::AdminState;

#[derive(Debug, Error)]
pub enum ExecutionServiceError {
    #[error("execution {0} not found")]
    NotFound(i64),

    /// Retry is only legal from FAILED or TIMEOUT.
    #[error("execution {id} is {status}, only FAILED or TIMEOUT can be retried")]
    InvalidState { id: i64, status: ExecutionStatus },

    #[error(transparent)]
    Db(#[from] DbError),
}

pub async fn list(
    state: &AdminState,
    page: i64,
    size: i64,
    filter: ExecutionFilter,
) -> Result<Page<ExecutionView>, ExecutionServiceError> {
    let (page, size) = super::normalize_page(page, size);
    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadOnly, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;
        let total = crate::repository::execution::count(&mut tx, &filter).await?;
        let items = crate::repository::execution::list_paged(
            &mut tx,
            &filter,
            size,
            (page - 1) * size,
        )
        .await?;
        Ok(Page::new(items, total, page, size))
    })
    .await
}

pub async fn get(state: &AdminState, id: i64) -> Result<ExecutionView, ExecutionServiceError> {
    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadOnly, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;
        crate::repository::execution::find_by_id(&mut tx, id)
            .await?
            .ok_or(ExecutionServiceError::NotFound(id))
    })
    .await
}

/// Flip a FAILED/TIMEOUT row back to PENDING, clearing the attempt's
/// bookkeeping so the worker pool picks it up as fresh work.
pub async fn retry(state: &AdminState, id: i64) -> Result<ExecutionView, ExecutionServiceError> {
    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadWrite, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;

        let execution = crate::repository::execution::find_by_id(&mut tx, id)
            .await?
            .ok_or(ExecutionServiceError::NotFound(id))?;

        if !matches!(
            execution.status,
            ExecutionStatus::Failed | ExecutionStatus::Timeout
        ) {
            return Err(ExecutionServiceError::InvalidState {
                id,
                status: execution.status,
            });
        }

        crate::repository::execution::reset_to_pending(&mut tx, id).await?;
        tracing::info!(
            execution_id = id,
            previous_status = %execution.status,
            "execution re-queued by operator"
        );

        crate::repository::execution::find_by_id(&mut tx, id)
            .await?
            .ok_or(ExecutionServiceError::NotFound(id))
    })
    .await
}

pub async fn delete(state: &AdminState, id: i64) -> Result<(), ExecutionServiceError> {
    let database = state.database.as_str();
    transaction(&state.registry, &[database], TxMode::ReadWrite, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;
        if !crate::repository::execution::delete(&mut tx, id).await? {
            return Err(ExecutionServiceError::NotFound(id));
        }
        tracing::info!(execution_id = id, "execution deleted");
        Ok(())
    })
    .await
}
