//! Execution history repository.

use std::str::FromStr;

use cadence_core::dto::execution::ExecutionView;
use cadence_core::{ExecutionStatus, ParamSource};
use cadence_db::{DbError, DbRow, SqlParam, TxContext};

const COLUMNS: &str = "e.id, e.job_id, e.handler_name, e.scheduled_time, e.params,
                       e.param_source, e.status, e.started_at, e.finished_at, e.retry_count,
                       e.error_message, e.result, e.created_at, c.name AS cron_name";

/// Optional list filters.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub cron_id: Option<i64>,
    pub status: Option<ExecutionStatus>,
}

fn from_row(row: &DbRow) -> Result<ExecutionView, DbError> {
    let status = row.get_string("status")?;
    let status = ExecutionStatus::from_str(&status).map_err(DbError::Transaction)?;
    let param_source = row.get_string("param_source")?;
    let param_source = ParamSource::from_str(&param_source).map_err(DbError::Transaction)?;

    Ok(ExecutionView {
        id: row.get_i64("id")?,
        job_id: row.get_opt_i64("job_id")?,
        cron_name: row.get_opt_string("cron_name")?,
        handler_name: row.get_string("handler_name")?,
        scheduled_time: row.get_datetime("scheduled_time")?,
        params: row.get_opt_json("params")?,
        param_source,
        status,
        started_at: row.get_opt_datetime("started_at")?,
        finished_at: row.get_opt_datetime("finished_at")?,
        retry_count: row.get_i32("retry_count")?,
        error_message: row.get_opt_string("error_message")?,
        result: row.get_opt_json("result")?,
        created_at: row.get_datetime("created_at")?,
    })
}

fn where_clause(
    tx: &TxContext,
    filter: &ExecutionFilter,
    params: &mut Vec<SqlParam>,
) -> String {
    let mut clauses = Vec::new();
    if let Some(cron_id) = filter.cron_id {
        params.push(SqlParam::from(cron_id));
        clauses.push(format!(
            "e.job_id = {}",
            super::placeholder(tx.kind(), params.len())
        ));
    }
    if let Some(status) = filter.status {
        params.push(SqlParam::from(status.as_str()));
        clauses.push(format!(
            "e.status = {}",
            super::placeholder(tx.kind(), params.len())
        ));
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

pub async fn count(tx: &mut TxContext, filter: &ExecutionFilter) -> Result<i64, DbError> {
    let mut params = Vec::new();
    let where_sql = where_clause(tx, filter, &mut params);
    let sql = format!("SELECT COUNT(*) FROM job_executions e{where_sql}");
    tx.fetch_val_i64(&sql, &params).await
}

pub async fn list_paged(
    tx: &mut TxContext,
    filter: &ExecutionFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ExecutionView>, DbError> {
    let kind = tx.kind();
    let mut params = Vec::new();
    let where_sql = where_clause(tx, filter, &mut params);

    params.push(SqlParam::from(limit));
    let limit_ph = super::placeholder(kind, params.len());
    params.push(SqlParam::from(offset));
    let offset_ph = super::placeholder(kind, params.len());

    let sql = format!(
        "SELECT {COLUMNS}
         FROM job_executions e
         LEFT JOIN cron_jobs c ON c.id = e.job_id{where_sql}
         ORDER BY e.id DESC LIMIT {limit_ph} OFFSET {offset_ph}"
    );
    let rows = tx.fetch_all(&sql, &params).await?;
    rows.iter().map(from_row).collect()
}

pub async fn find_by_id(tx: &mut TxContext, id: i64) -> Result<Option<ExecutionView>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS}
         FROM job_executions e
         LEFT JOIN cron_jobs c ON c.id = e.job_id
         WHERE e.id = {}",
        super::placeholder(tx.kind(), 1)
    );
    let row = tx.fetch_optional(&sql, &[SqlParam::from(id)]).await?;
    row.as_ref().map(from_row).transpose()
}

/// Admin retry: back to PENDING with the attempt bookkeeping cleared.
pub async fn reset_to_pending(tx: &mut TxContext, id: i64) -> Result<(), DbError> {
    let sql = format!(
        "UPDATE job_executions
         SET status = 'PENDING', started_at = NULL, finished_at = NULL,
             error_message = NULL, result = NULL
         WHERE id = {}",
        super::placeholder(tx.kind(), 1)
    );
    tx.execute(&sql, &[SqlParam::from(id)]).await?;
    Ok(())
}

pub async fn delete(tx: &mut TxContext, id: i64) -> Result<bool, DbError> {
    let sql = format!(
        "DELETE FROM job_executions WHERE id = {}",
        super::placeholder(tx.kind(), 1)
    );
    let affected = tx.execute(&sql, &[SqlParam::from(id)]).await?;
    Ok(affected > 0)
}
