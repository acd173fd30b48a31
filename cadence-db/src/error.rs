//! Database error types

use thiserror::Error;

/// Errors raised by the registry, pools and transaction coordinator.
#[derive(Debug, Error)]
pub enum DbError {
    /// No free connection within the pool acquire timeout. Transient:
    /// dispatchers and workers log a warning and retry on the next tick.
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// A driver-level failure while executing SQL. Aborts the enclosing
    /// transaction.
    #[error("query execution failed: {sql}")]
    Query {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to decode column '{column}'")]
    Decode {
        column: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A write statement was issued through a read-only transaction.
    /// This is a programming bug, fatal to the task that did it.
    #[error("write statement issued in a read-only transaction")]
    ReadOnlyViolation,

    /// The coordinator was entered while a transaction scope was already
    /// active on the current task.
    #[error("nested transaction scopes are not supported")]
    NestedTransaction,

    #[error("unknown database '{0}'")]
    UnknownDatabase(String),

    /// `current_tx` was called outside a coordinator scope, or for a
    /// database the scope does not cover.
    #[error("no transaction context for database '{0}' on the current task")]
    NoTransactionContext(String),

    #[error("invalid database configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    pub(crate) fn query(sql: &str, source: sqlx::Error) -> Self {
        let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        let sql = flat.chars().take(200).collect();
        DbError::Query { sql, source }
    }
}
