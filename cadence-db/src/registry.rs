//! Named database registry.

use std::collections::HashMap;

use crate::config::{DatabasesConfig, DbKind};
use crate::error::DbError;
use crate::pool::DbPool;
use crate::tx::{TxContext, TxMode};

/// The sentinel database every deployment must declare.
pub const DEFAULT_DATABASE: &str = "default";

/// One live database: a logical name plus its pool.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    pool: DbPool,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DbKind {
        self.pool.kind()
    }

    /// Acquire a connection and open a transaction on it.
    pub async fn begin(&self, mode: TxMode) -> Result<TxContext, DbError> {
        let conn = self.pool.acquire().await?;
        let mut ctx = TxContext::new(conn, mode);
        ctx.begin().await?;
        Ok(ctx)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Process-wide mapping from logical database name to a live pool.
#[derive(Debug)]
pub struct DatabaseRegistry {
    databases: HashMap<String, Database>,
}

impl DatabaseRegistry {
    /// Build pools for the configured databases.
    ///
    /// `only` restricts initialization to the names a component actually
    /// declares (the worker opens `database` plus `databases`); `None`
    /// opens everything. The configuration must declare `default`.
    pub async fn init_from_config(
        config: &DatabasesConfig,
        only: Option<&[String]>,
    ) -> Result<Self, DbError> {
        if !config.databases.contains_key(DEFAULT_DATABASE) {
            return Err(DbError::Configuration(format!(
                "database configuration must declare '{DEFAULT_DATABASE}'"
            )));
        }

        let mut databases = HashMap::new();
        for (name, entry) in &config.databases {
            if let Some(only) = only {
                if !only.iter().any(|n| n == name) {
                    continue;
                }
            }
            let pool = DbPool::connect(entry).await?;
            tracing::info!(database = %name, backend = %pool.kind(), "database pool ready");
            databases.insert(
                name.clone(),
                Database {
                    name: name.clone(),
                    pool,
                },
            );
        }

        if let Some(only) = only {
            for name in only {
                if !databases.contains_key(name) {
                    return Err(DbError::UnknownDatabase(name.clone()));
                }
            }
        }

        Ok(Self { databases })
    }

    pub fn get(&self, name: &str) -> Result<&Database, DbError> {
        self.databases
            .get(name)
            .ok_or_else(|| DbError::UnknownDatabase(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.databases.keys().map(String::as_str).collect()
    }

    pub async fn close_all(&self) {
        for db in self.databases.values() {
            db.close().await;
        }
    }
}
