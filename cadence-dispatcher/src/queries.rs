//! Backend-appropriate SQL for the dispatchers.

use cadence_core::CronJob;
use cadence_db::{DbError, DbKind, DbRow};

pub(crate) fn enabled_jobs(_kind: DbKind) -> &'static str {
    "SELECT id, name, description, cron_expression, handler_name, handler_params,
            is_enabled, allow_overlap, max_retry, timeout_seconds, created_at, updated_at
     FROM cron_jobs
     WHERE is_enabled = TRUE
     ORDER BY id"
}

pub(crate) fn last_scheduled_time(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "SELECT MAX(scheduled_time) AS last_time FROM job_executions WHERE job_id = ?"
        }
        DbKind::Postgres => {
            "SELECT MAX(scheduled_time) AS last_time FROM job_executions WHERE job_id = $1"
        }
    }
}

pub(crate) fn has_incomplete_execution(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "SELECT id FROM job_executions
             WHERE job_id = ? AND status IN ('PENDING', 'RUNNING')
             LIMIT 1"
        }
        DbKind::Postgres => {
            "SELECT id FROM job_executions
             WHERE job_id = $1 AND status IN ('PENDING', 'RUNNING')
             LIMIT 1"
        }
    }
}

/// Conflict-ignore insert against `UNIQUE(job_id, scheduled_time)`: the
/// sole coordination primitive between replicated dispatchers.
pub(crate) fn insert_cron_execution(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite => {
            "INSERT INTO job_executions
                 (job_id, handler_name, scheduled_time, params, param_source, status,
                  retry_count, created_at)
             VALUES (?, ?, ?, ?, 'cron', 'PENDING', 0, ?)
             ON CONFLICT (job_id, scheduled_time) DO NOTHING"
        }
        DbKind::Postgres => {
            "INSERT INTO job_executions
                 (job_id, handler_name, scheduled_time, params, param_source, status,
                  retry_count, created_at)
             VALUES ($1, $2, $3, $4, 'cron', 'PENDING', 0, $5)
             ON CONFLICT (job_id, scheduled_time) DO NOTHING"
        }
        DbKind::MySql => {
            "INSERT IGNORE INTO job_executions
                 (job_id, handler_name, scheduled_time, params, param_source, status,
                  retry_count, created_at)
             VALUES (?, ?, ?, ?, 'cron', 'PENDING', 0, ?)"
        }
    }
}

pub(crate) fn cron_job_by_id(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "SELECT id, name, description, cron_expression, handler_name, handler_params,
                    is_enabled, allow_overlap, max_retry, timeout_seconds, created_at, updated_at
             FROM cron_jobs
             WHERE id = ? AND is_enabled = TRUE"
        }
        DbKind::Postgres => {
            "SELECT id, name, description, cron_expression, handler_name, handler_params,
                    is_enabled, allow_overlap, max_retry, timeout_seconds, created_at, updated_at
             FROM cron_jobs
             WHERE id = $1 AND is_enabled = TRUE"
        }
    }
}

pub(crate) fn cron_job_by_handler(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite | DbKind::MySql => {
            "SELECT id, name, description, cron_expression, handler_name, handler_params,
                    is_enabled, allow_overlap, max_retry, timeout_seconds, created_at, updated_at
             FROM cron_jobs
             WHERE handler_name = ? AND is_enabled = TRUE
             ORDER BY id
             LIMIT 1"
        }
        DbKind::Postgres => {
            "SELECT id, name, description, cron_expression, handler_name, handler_params,
                    is_enabled, allow_overlap, max_retry, timeout_seconds, created_at, updated_at
             FROM cron_jobs
             WHERE handler_name = $1 AND is_enabled = TRUE
             ORDER BY id
             LIMIT 1"
        }
    }
}

pub(crate) fn insert_event_execution(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite => {
            "INSERT INTO job_executions
                 (job_id, handler_name, scheduled_time, params, param_source, status,
                  retry_count, created_at)
             VALUES (?, ?, ?, ?, 'event', 'PENDING', 0, ?)
             RETURNING id"
        }
        DbKind::Postgres => {
            "INSERT INTO job_executions
                 (job_id, handler_name, scheduled_time, params, param_source, status,
                  retry_count, created_at)
             VALUES ($1, $2, $3, $4, 'event', 'PENDING', 0, $5)
             RETURNING id"
        }
        DbKind::MySql => {
            "INSERT INTO job_executions
                 (job_id, handler_name, scheduled_time, params, param_source, status,
                  retry_count, created_at)
             VALUES (?, ?, ?, ?, 'event', 'PENDING', 0, ?)"
        }
    }
}

pub(crate) fn cron_job_from_row(row: &DbRow) -> Result<CronJob, DbError> {
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
