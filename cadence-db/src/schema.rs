//! Schema migrations.
//!
//! Idempotent `CREATE TABLE IF NOT EXISTS` statements per backend, run by
//! each entry point at startup. `UNIQUE(job_id, scheduled_time)` on
//! `job_executions` is load-bearing: it is the only thing preventing two
//! dispatchers from materializing the same schedule point twice.

use crate::config::DbKind;
use crate::error::DbError;
use crate::registry::Database;
use crate::tx::TxMode;

const SQLITE_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cron_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        cron_expression TEXT NOT NULL,
        handler_name TEXT NOT NULL,
        handler_params TEXT,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        allow_overlap INTEGER NOT NULL DEFAULT 1,
        max_retry INTEGER NOT NULL DEFAULT 0,
        timeout_seconds INTEGER NOT NULL DEFAULT 3600,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id INTEGER REFERENCES cron_jobs(id) ON DELETE CASCADE,
        handler_name TEXT NOT NULL,
        scheduled_time TEXT NOT NULL,
        params TEXT,
        param_source TEXT NOT NULL DEFAULT 'cron',
        status TEXT NOT NULL DEFAULT 'PENDING',
        started_at TEXT,
        finished_at TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        result TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (job_id, scheduled_time)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_executions_status
     ON job_executions (status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_job_executions_job
     ON job_executions (job_id, scheduled_time)",
];

const POSTGRES_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cron_jobs (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL UNIQUE,
        description VARCHAR(500),
        cron_expression VARCHAR(100) NOT NULL,
        handler_name VARCHAR(100) NOT NULL,
        handler_params JSONB,
        is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
        allow_overlap BOOLEAN NOT NULL DEFAULT TRUE,
        max_retry INTEGER NOT NULL DEFAULT 0,
        timeout_seconds INTEGER NOT NULL DEFAULT 3600,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_executions (
        id BIGSERIAL PRIMARY KEY,
        job_id BIGINT REFERENCES cron_jobs(id) ON DELETE CASCADE,
        handler_name VARCHAR(100) NOT NULL,
        scheduled_time TIMESTAMPTZ NOT NULL,
        params JSONB,
        param_source VARCHAR(10) NOT NULL DEFAULT 'cron',
        status VARCHAR(10) NOT NULL DEFAULT 'PENDING',
        started_at TIMESTAMPTZ,
        finished_at TIMESTAMPTZ,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        result JSONB,
        created_at TIMESTAMPTZ NOT NULL,
        UNIQUE (job_id, scheduled_time)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_executions_status
     ON job_executions (status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_job_executions_job
     ON job_executions (job_id, scheduled_time)",
];

const MYSQL_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cron_jobs (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        name VARCHAR(100) NOT NULL UNIQUE,
        description VARCHAR(500),
        cron_expression VARCHAR(100) NOT NULL,
        handler_name VARCHAR(100) NOT NULL,
        handler_params JSON,
        is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
        allow_overlap BOOLEAN NOT NULL DEFAULT TRUE,
        max_retry INT NOT NULL DEFAULT 0,
        timeout_seconds INT NOT NULL DEFAULT 3600,
        created_at TIMESTAMP(6) NOT NULL,
        updated_at TIMESTAMP(6) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_executions (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        job_id BIGINT,
        handler_name VARCHAR(100) NOT NULL,
        scheduled_time TIMESTAMP(6) NOT NULL,
        params JSON,
        param_source VARCHAR(10) NOT NULL DEFAULT 'cron',
        status VARCHAR(10) NOT NULL DEFAULT 'PENDING',
        started_at TIMESTAMP(6) NULL,
        finished_at TIMESTAMP(6) NULL,
        retry_count INT NOT NULL DEFAULT 0,
        error_message TEXT,
        result JSON,
        created_at TIMESTAMP(6) NOT NULL,
        UNIQUE KEY uq_job_scheduled (job_id, scheduled_time),
        KEY idx_job_executions_status (status, created_at),
        FOREIGN KEY (job_id) REFERENCES cron_jobs(id) ON DELETE CASCADE
    )
    "#,
];

/// Create the core tables on the given database if they do not exist.
pub async fn run_migrations(db: &Database) -> Result<(), DbError> {
    let statements = match db.kind() {
        DbKind::Sqlite => SQLITE_MIGRATIONS,
        DbKind::Postgres => POSTGRES_MIGRATIONS,
        DbKind::MySql => MYSQL_MIGRATIONS,
    };

    let mut tx = db.begin(TxMode::ReadWrite).await?;
    for statement in statements {
        tx.execute(statement, &[]).await?;
    }
    tx.commit().await?;

    tracing::info!(database = %db.name(), "schema migrations applied");
    Ok(())
}
