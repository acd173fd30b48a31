//! Cron job repository.

use chrono::{DateTime, Utc};
use serde_json::Value;

use cadence_core::CronJob;
use cadence_db::{DbError, DbKind, DbRow, SqlParam, TxContext};

const COLUMNS: &str = "id, name, description, cron_expression, handler_name, handler_params,
                       is_enabled, allow_overlap, max_retry, timeout_seconds, created_at, updated_at";

fn from_row(row: &DbRow) -> Result<CronJob, DbError> {
    Ok(CronJob {
        id: row.get_i64("id")?,
        name: row.get_string("name")?,
        description: row.get_opt_string("description")?,
        cron_expression: row.get_string("cron_expression")?,
        handler_name: row.get_string("handler_name")?,
        handler_params: row.get_opt_json("handler_params")?,
        is_enabled: row.get_bool("is_enabled")?,
        allow_overlap: row.get_bool("allow_overlap")?,
        max_retry: row.get_i32("max_retry")?,
        timeout_seconds: row.get_i32("timeout_seconds")?,
        created_at: row.get_datetime("created_at")?,
        updated_at: row.get_datetime("updated_at")?,
    })
}

pub async fn count(tx: &mut TxContext, is_enabled: Option<bool>) -> Result<i64, DbError> {
    match is_enabled {
        None => {
            tx.fetch_val_i64("SELECT COUNT(*) FROM cron_jobs", &[])
                .await
        }
        Some(enabled) => {
            let sql = format!(
                "SELECT COUNT(*) FROM cron_jobs WHERE is_enabled = {}",
                super::placeholder(tx.kind(), 1)
            );
            tx.fetch_val_i64(&sql, &[SqlParam::from(enabled)]).await
        }
    }
}

pub async fn list_paged(
    tx: &mut TxContext,
    is_enabled: Option<bool>,
    limit: i64,
    offset: i64,
) -> Result<Vec<CronJob>, DbError> {
    let kind = tx.kind();
    let mut params: Vec<SqlParam> = Vec::new();
    let mut sql = format!("SELECT {COLUMNS} FROM cron_jobs");
    if let Some(enabled) = is_enabled {
        params.push(SqlParam::from(enabled));
        sql.push_str(&format!(
            " WHERE is_enabled = {}",
            super::placeholder(kind, params.len())
        ));
    }
    params.push(SqlParam::from(limit));
    sql.push_str(&format!(
        " ORDER BY id LIMIT {}",
        super::placeholder(kind, params.len())
    ));
    params.push(SqlParam::from(offset));
    sql.push_str(&format!(" OFFSET {}", super::placeholder(kind, params.len())));

    let rows = tx.fetch_all(&sql, &params).await?;
    rows.iter().map(from_row).collect()
}

pub async fn find_by_id(tx: &mut TxContext, id: i64) -> Result<Option<CronJob>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM cron_jobs WHERE id = {}",
        super::placeholder(tx.kind(), 1)
    );
    let row = tx.fetch_optional(&sql, &[SqlParam::from(id)]).await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn find_by_name(tx: &mut TxContext, name: &str) -> Result<Option<CronJob>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM cron_jobs WHERE name = {}",
        super::placeholder(tx.kind(), 1)
    );
    let row = tx.fetch_optional(&sql, &[SqlParam::from(name)]).await?;
    row.as_ref().map(from_row).transpose()
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut TxContext,
    name: &str,
    description: Option<String>,
    cron_expression: &str,
    handler_name: &str,
    handler_params: Option<Value>,
    is_enabled: bool,
    allow_overlap: bool,
    max_retry: i32,
    timeout_seconds: i32,
    now: DateTime<Utc>,
) -> Result<i64, DbError> {
    let kind = tx.kind();
    let placeholders: Vec<String> = (1..=11).map(|n| super::placeholder(kind, n)).collect();
    let mut sql = format!(
        "INSERT INTO cron_jobs
             (name, description, cron_expression, handler_name, handler_params,
              is_enabled, allow_overlap, max_retry, timeout_seconds, created_at, updated_at)
         VALUES ({})",
        placeholders.join(", ")
    );
    if !matches!(kind, DbKind::MySql) {
        sql.push_str(" RETURNING id");
    }

    let params = [
        SqlParam::from(name),
        SqlParam::from(description),
        SqlParam::from(cron_expression),
        SqlParam::from(handler_name),
        SqlParam::from(handler_params),
        SqlParam::from(is_enabled),
        SqlParam::from(allow_overlap),
        SqlParam::from(max_retry),
        SqlParam::from(timeout_seconds),
        SqlParam::from(now),
        SqlParam::from(now),
    ];
    tx.execute_returning_id(&sql, &params).await
}

pub async fn update(tx: &mut TxContext, job: &CronJob) -> Result<(), DbError> {
    let kind = tx.kind();
    let sql = format!(
        "UPDATE cron_jobs
         SET name = {}, description = {}, cron_expression = {}, handler_name = {},
             handler_params = {}, is_enabled = {}, allow_overlap = {}, max_retry = {},
             timeout_seconds = {}, updated_at = {}
         WHERE id = {}",
        super::placeholder(kind, 1),
        super::placeholder(kind, 2),
        super::placeholder(kind, 3),
        super::placeholder(kind, 4),
        super::placeholder(kind, 5),
        super::placeholder(kind, 6),
        super::placeholder(kind, 7),
        super::placeholder(kind, 8),
        super::placeholder(kind, 9),
        super::placeholder(kind, 10),
        super::placeholder(kind, 11),
    );
    let params = [
        SqlParam::from(job.name.as_str()),
        SqlParam::from(job.description.clone()),
        SqlParam::from(job.cron_expression.as_str()),
        SqlParam::from(job.handler_name.as_str()),
        SqlParam::from(job.handler_params.clone()),
        SqlParam::from(job.is_enabled),
        SqlParam::from(job.allow_overlap),
        SqlParam::from(job.max_retry),
        SqlParam::from(job.timeout_seconds),
        SqlParam::from(job.updated_at),
        SqlParam::from(job.id),
    ];
    tx.execute(&sql, &params).await?;
    Ok(())
}

pub async fn set_enabled(
    tx: &mut TxContext,
    id: i64,
    is_enabled: bool,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let kind = tx.kind();
    let sql = format!(
        "UPDATE cron_jobs SET is_enabled = {}, updated_at = {} WHERE id = {}",
        super::placeholder(kind, 1),
        super::placeholder(kind, 2),
        super::placeholder(kind, 3),
    );
    tx.execute(
        &sql,
        &[
            SqlParam::from(is_enabled),
            SqlParam::from(now),
            SqlParam::from(id),
        ],
    )
    .await?;
    Ok(())
}

/// Deleting a cron job cascades to its executions.
pub async fn delete(tx: &mut TxContext, id: i64) -> Result<bool, DbError> {
    let sql = format!(
        "DELETE FROM cron_jobs WHERE id = {}",
        super::placeholder(tx.kind(), 1)
    );
    let affected = tx.execute(&sql, &[SqlParam::from(id)]).await?;
    Ok(affected > 0)
}
