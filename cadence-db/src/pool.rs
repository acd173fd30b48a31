//! Backend pool wrapper.

use std::path::Path;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::config::{DatabaseConfig, DbKind, SqliteOptions};
use crate::error::DbError;
use crate::tx::TxConnection;

/// A bounded connection pool over one of the supported backends.
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl DbPool {
    /// Open a pool for the given configuration entry.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let settings = config.pool_settings().clone();
        match config {
            DatabaseConfig::Sqlite { path, options, .. } => {
                let connect = sqlite_connect_options(path, options)?;
                let pool = SqlitePoolOptions::new()
                    .max_connections(settings.pool_size)
                    .acquire_timeout(Duration::from_secs(settings.pool_timeout_seconds))
                    .idle_timeout(Some(Duration::from_secs(settings.max_idle_seconds)))
                    .connect_with(connect)
                    .await?;
                Ok(DbPool::Sqlite(pool))
            }
            DatabaseConfig::Postgres {
                host,
                port,
                user,
                password,
                database,
                ..
            } => {
                let connect = PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .password(password)
                    .database(database);
                let pool = PgPoolOptions::new()
                    .max_connections(settings.pool_size)
                    .acquire_timeout(Duration::from_secs(settings.pool_timeout_seconds))
                    .idle_timeout(Some(Duration::from_secs(settings.max_idle_seconds)))
                    .connect_with(connect)
                    .await?;
                Ok(DbPool::Postgres(pool))
            }
            DatabaseConfig::Mysql {
                host,
                port,
                user,
                password,
                database,
                ..
            } => {
                let connect = MySqlConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .password(password)
                    .database(database);
                let pool = MySqlPoolOptions::new()
                    .max_connections(settings.pool_size)
                    .acquire_timeout(Duration::from_secs(settings.pool_timeout_seconds))
                    .idle_timeout(Some(Duration::from_secs(settings.max_idle_seconds)))
                    .connect_with(connect)
                    .await?;
                Ok(DbPool::MySql(pool))
            }
        }
    }

    pub fn kind(&self) -> DbKind {
        match self {
            DbPool::Sqlite(_) => DbKind::Sqlite,
            DbPool::Postgres(_) => DbKind::Postgres,
            DbPool::MySql(_) => DbKind::MySql,
        }
    }

    /// Check out one connection, mapping an acquire timeout to
    /// [`DbError::PoolExhausted`].
    pub async fn acquire(&self) -> Result<TxConnection, DbError> {
        let map_err = |e: sqlx::Error| match e {
            sqlx::Error::PoolTimedOut => {
                DbError::PoolExhausted("timed out waiting for a connection".to_string())
            }
            other => DbError::Sqlx(other),
        };
        match self {
            DbPool::Sqlite(pool) => Ok(TxConnection::Sqlite(pool.acquire().await.map_err(map_err)?)),
            DbPool::Postgres(pool) => {
                Ok(TxConnection::Postgres(pool.acquire().await.map_err(map_err)?))
            }
            DbPool::MySql(pool) => Ok(TxConnection::MySql(pool.acquire().await.map_err(map_err)?)),
        }
    }

    pub async fn close(&self) {
        match self {
            DbPool::Sqlite(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
        }
    }
}

fn sqlite_connect_options(
    path: &str,
    options: &SqliteOptions,
) -> Result<SqliteConnectOptions, DbError> {
    let journal_mode = match options.journal_mode.to_ascii_lowercase().as_str() {
        "wal" => SqliteJournalMode::Wal,
        "delete" => SqliteJournalMode::Delete,
        "truncate" => SqliteJournalMode::Truncate,
        "memory" => SqliteJournalMode::Memory,
        other => {
            return Err(DbError::Configuration(format!(
                "unsupported sqlite journal_mode '{other}'"
            )))
        }
    };
    let synchronous = match options.synchronous.to_ascii_lowercase().as_str() {
        "off" => SqliteSynchronous::Off,
        "normal" => SqliteSynchronous::Normal,
        "full" => SqliteSynchronous::Full,
        other => {
            return Err(DbError::Configuration(format!(
                "unsupported sqlite synchronous mode '{other}'"
            )))
        }
    };
    Ok(SqliteConnectOptions::new()
        .filename(Path::new(path))
        .create_if_missing(true)
        .journal_mode(journal_mode)
        .synchronous(synchronous)
        .busy_timeout(Duration::from_millis(options.busy_timeout_ms))
        .foreign_keys(options.foreign_keys))
}
