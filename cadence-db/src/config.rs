//! Database configuration document.
//!
//! Shape of `database.yaml`:
//!
//! ```yaml
//! databases:
//!   default:
//!     type: sqlite
//!     path: data/cadence.db
//!     pool:
//!       pool_size: 5
//!       pool_timeout_seconds: 30
//!       max_idle_seconds: 300
//!   analytics:
//!     type: postgres
//!     host: localhost
//!     port: 5432
//!     user: cadence
//!     password: secret
//!     database: analytics
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// The configured backend of one logical database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
    MySql,
}

impl DbKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::Sqlite => "sqlite",
            DbKind::Postgres => "postgres",
            DbKind::MySql => "mysql",
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level `database.yaml` document.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabasesConfig {
    pub databases: HashMap<String, DatabaseConfig>,
}

/// One named database entry, tagged by backend type.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite {
        path: String,
        #[serde(default)]
        pool: PoolSettings,
        #[serde(default)]
        options: SqliteOptions,
    },
    Postgres {
        host: String,
        #[serde(default = "default_pg_port")]
        port: u16,
        user: String,
        #[serde(default)]
        password: String,
        database: String,
        #[serde(default)]
        pool: PoolSettings,
    },
    Mysql {
        host: String,
        #[serde(default = "default_mysql_port")]
        port: u16,
        user: String,
        #[serde(default)]
        password: String,
        database: String,
        #[serde(default)]
        pool: PoolSettings,
    },
}

impl DatabaseConfig {
    pub fn kind(&self) -> DbKind {
        match self {
            DatabaseConfig::Sqlite { .. } => DbKind::Sqlite,
            DatabaseConfig::Postgres { .. } => DbKind::Postgres,
            DatabaseConfig::Mysql { .. } => DbKind::MySql,
        }
    }

    pub fn pool_settings(&self) -> &PoolSettings {
        match self {
            DatabaseConfig::Sqlite { pool, .. }
            | DatabaseConfig::Postgres { pool, .. }
            | DatabaseConfig::Mysql { pool, .. } => pool,
        }
    }
}

/// Pool sizing shared by all backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Fixed pool capacity.
    pub pool_size: u32,
    /// Seconds to wait for a free connection before PoolExhausted.
    pub pool_timeout_seconds: u64,
    /// Idle connections older than this are discarded and replaced.
    pub max_idle_seconds: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: 5,
            pool_timeout_seconds: 30,
            max_idle_seconds: 300,
        }
    }
}

/// SQLite-specific connection options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    pub busy_timeout_ms: u64,
    pub journal_mode: String,
    pub synchronous: String,
    pub foreign_keys: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            journal_mode: "wal".to_string(),
            synchronous: "normal".to_string(),
            foreign_keys: true,
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_mysql_port() -> u16 {
    3306
}
