//! Backend-appropriate SQL for the worker pool.
//!
//! PENDING rows join the owning cron job to snapshot its retry budget and
//! timeout at claim time. Event executions without a cron job fall back to
//! a conservative policy (no retries, 300s timeout).

use chrono::{DateTime, Utc};
use serde_json::Value;

use cadence_db::{DbError, DbKind, DbRow};

/// A PENDING row read by the supervisor, policy attached.
#[derive(Debug, Clone)]
pub(crate) struct PendingExecution {
    pub id: i64,
    pub job_id: Option<i64>,
    pub job_name: Option<String>,
    pub handler_name: String,
    pub scheduled_time: DateTime<Utc>,
    pub params: Option<Value>,
    pub retry_count: i32,
    pub max_retry: i32,
    pub timeout_seconds: i32,
}

pub(crate) fn pending_executions(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "SELECT e.id, e.job_id, e.handler_name, e.scheduled_time, e.params,
                    e.retry_count,
                    COALESCE(c.max_retry, 0) AS max_retry,
                    COALESCE(c.timeout_seconds, 300) AS timeout_seconds,
                    c.name AS job_name
             FROM job_executions e
             LEFT JOIN cron_jobs c ON c.id = e.job_id
             WHERE e.status = 'PENDING'
             ORDER BY e.created_at ASC
             LIMIT ?"
        }
        DbKind::Postgres => {
            "SELECT e.id, e.job_id, e.handler_name, e.scheduled_time, e.params,
                    e.retry_count,
                    COALESCE(c.max_retry, 0) AS max_retry,
                    COALESCE(c.timeout_seconds, 300) AS timeout_seconds,
                    c.name AS job_name
             FROM job_executions e
             LEFT JOIN cron_jobs c ON c.id = e.job_id
             WHERE e.status = 'PENDING'
             ORDER BY e.created_at ASC
             LIMIT $1"
        }
    }
}

/// The claim CAS. Zero rows affected means another worker won the race.
pub(crate) fn claim_execution(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "UPDATE job_executions
             SET status = 'RUNNING', started_at = ?
             WHERE id = ? AND status = 'PENDING'"
        }
        DbKind::Postgres => {
            "UPDATE job_executions
             SET status = 'RUNNING', started_at = $1
             WHERE id = $2 AND status = 'PENDING'"
        }
    }
}

pub(crate) fn complete_execution(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "UPDATE job_executions
             SET status = 'SUCCESS', finished_at = ?, result = ?
             WHERE id = ?"
        }
        DbKind::Postgres => {
            "UPDATE job_executions
             SET status = 'SUCCESS', finished_at = $1, result = $2
             WHERE id = $3"
        }
    }
}

pub(crate) fn fail_execution(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "UPDATE job_executions
             SET status = 'FAILED', finished_at = ?, error_message = ?,
                 retry_count = retry_count + 1
             WHERE id = ?"
        }
        DbKind::Postgres => {
            "UPDATE job_executions
             SET status = 'FAILED', finished_at = $1, error_message = $2,
                 retry_count = retry_count + 1
             WHERE id = $3"
        }
    }
}

pub(crate) fn timeout_execution(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "UPDATE job_executions
             SET status = 'TIMEOUT', finished_at = ?, error_message = 'Execution timed out',
                 retry_count = retry_count + 1
             WHERE id = ?"
        }
        DbKind::Postgres => {
            "UPDATE job_executions
             SET status = 'TIMEOUT', finished_at = $1, error_message = 'Execution timed out',
                 retry_count = retry_count + 1
             WHERE id = $2"
        }
    }
}

pub(crate) fn current_retry_count(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "SELECT retry_count FROM job_executions WHERE id = ?"
        }
        DbKind::Postgres => "SELECT retry_count FROM job_executions WHERE id = $1",
    }
}

/// Re-queue after FAILED/TIMEOUT. `error_message` stays as history.
pub(crate) fn requeue_execution(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "UPDATE job_executions
             SET status = 'PENDING', started_at = NULL, finished_at = NULL
             WHERE id = ?"
        }
        DbKind::Postgres => {
            "UPDATE job_executions
             SET status = 'PENDING', started_at = NULL, finished_at = NULL
             WHERE id = $1"
        }
    }
}

pub(crate) fn pending_from_row(row: &DbRow) -> Result<PendingExecution, DbError> {
    Ok(PendingExecution {
        id: row.get_i64("id")?,
        job_id: row.get_opt_i64("job_id")?,
        job_name: row.get_opt_string("job_name")?,
        handler_name: row.get_string("handler_name")?,
        scheduled_time: row.get_datetime("scheduled_time")?,
        params: row.get_opt_json("params")?,
        retry_count: row.get_i32("retry_count")?,
        max_retry: row.get_i32("max_retry")?,
        timeout_seconds: row.get_i32("timeout_seconds")?,
    })
}
