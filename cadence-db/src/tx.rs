//! Transactional connection handle.
//!
//! A [`TxContext`] owns one pooled connection with an open transaction.
//! Statements are executed with backend-native placeholders; parameters go
//! through the typed [`SqlParam`] enum so every backend binds with its own
//! encoding (JSON values land in TEXT/JSONB/JSON columns, timestamps in
//! TEXT/TIMESTAMPTZ/TIMESTAMP).

use chrono::{DateTime, Utc};
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use crate::config::DbKind;
use crate::error::DbError;
use crate::row::DbRow;

/// Transaction mode requested from the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadWrite,
    ReadOnly,
}

/// A checked-out connection, one variant per backend.
pub enum TxConnection {
    Sqlite(PoolConnection<Sqlite>),
    Postgres(PoolConnection<Postgres>),
    MySql(PoolConnection<MySql>),
}

impl TxConnection {
    fn kind(&self) -> DbKind {
        match self {
            TxConnection::Sqlite(_) => DbKind::Sqlite,
            TxConnection::Postgres(_) => DbKind::Postgres,
            TxConnection::MySql(_) => DbKind::MySql,
        }
    }
}

/// One bound SQL parameter.
#[derive(Debug, Clone)]
pub enum SqlParam {
    I64(i64),
    I32(i32),
    F64(f64),
    Bool(bool),
    Text(String),
    OptI64(Option<i64>),
    OptText(Option<String>),
    Timestamp(DateTime<Utc>),
    OptTimestamp(Option<DateTime<Utc>>),
    Json(serde_json::Value),
    OptJson(Option<serde_json::Value>),
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::I64(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::I32(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::F64(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<Option<i64>> for SqlParam {
    fn from(v: Option<i64>) -> Self {
        SqlParam::OptI64(v)
    }
}

impl From<Option<String>> for SqlParam {
    fn from(v: Option<String>) -> Self {
        SqlParam::OptText(v)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(v: DateTime<Utc>) -> Self {
        SqlParam::Timestamp(v)
    }
}

impl From<Option<DateTime<Utc>>> for SqlParam {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        SqlParam::OptTimestamp(v)
    }
}

impl From<serde_json::Value> for SqlParam {
    fn from(v: serde_json::Value) -> Self {
        SqlParam::Json(v)
    }
}

impl From<Option<serde_json::Value>> for SqlParam {
    fn from(v: Option<serde_json::Value>) -> Self {
        SqlParam::OptJson(v)
    }
}

fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::I64(v) => query.bind(*v),
            SqlParam::I32(v) => query.bind(*v),
            SqlParam::F64(v) => query.bind(*v),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::OptI64(v) => query.bind(*v),
            SqlParam::OptText(v) => query.bind(v.clone()),
            SqlParam::Timestamp(v) => query.bind(*v),
            SqlParam::OptTimestamp(v) => query.bind(*v),
            SqlParam::Json(v) => query.bind(v.clone()),
            SqlParam::OptJson(v) => query.bind(v.clone()),
        };
    }
    query
}

fn bind_postgres<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::I64(v) => query.bind(*v),
            SqlParam::I32(v) => query.bind(*v),
            SqlParam::F64(v) => query.bind(*v),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::OptI64(v) => query.bind(*v),
            SqlParam::OptText(v) => query.bind(v.clone()),
            SqlParam::Timestamp(v) => query.bind(*v),
            SqlParam::OptTimestamp(v) => query.bind(*v),
            SqlParam::Json(v) => query.bind(v.clone()),
            SqlParam::OptJson(v) => query.bind(v.clone()),
        };
    }
    query
}

fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[SqlParam],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            SqlParam::I64(v) => query.bind(*v),
            SqlParam::I32(v) => query.bind(*v),
            SqlParam::F64(v) => query.bind(*v),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::OptI64(v) => query.bind(*v),
            SqlParam::OptText(v) => query.bind(v.clone()),
            SqlParam::Timestamp(v) => query.bind(*v),
            SqlParam::OptTimestamp(v) => query.bind(*v),
            SqlParam::Json(v) => query.bind(v.clone()),
            SqlParam::OptJson(v) => query.bind(v.clone()),
        };
    }
    query
}

/// An open transaction on one database.
pub struct TxContext {
    conn: Option<TxConnection>,
    kind: DbKind,
    readonly: bool,
    open: bool,
}

impl TxContext {
    pub(crate) fn new(conn: TxConnection, mode: TxMode) -> Self {
        let kind = conn.kind();
        Self {
            conn: Some(conn),
            kind,
            readonly: mode == TxMode::ReadOnly,
            open: false,
        }
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    fn conn_mut(&mut self) -> Result<&mut TxConnection, DbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Transaction("connection already released".to_string()))
    }

    async fn raw_execute(&mut self, sql: &str) -> Result<(), DbError> {
        let conn = self.conn_mut()?;
        let result = match conn {
            TxConnection::Sqlite(c) => sqlx::query(sql).execute(&mut **c).await.map(|_| ()),
            TxConnection::Postgres(c) => sqlx::query(sql).execute(&mut **c).await.map(|_| ()),
            TxConnection::MySql(c) => sqlx::query(sql).execute(&mut **c).await.map(|_| ()),
        };
        result.map_err(|e| DbError::query(sql, e))
    }

    /// Open the transaction. SQLite takes the write lock up front in
    /// read-write mode (BEGIN IMMEDIATE) so concurrent writers queue on
    /// busy_timeout instead of failing mid-transaction.
    pub(crate) async fn begin(&mut self) -> Result<(), DbError> {
        let statement = match (self.kind, self.readonly) {
            (DbKind::Sqlite, false) => "BEGIN IMMEDIATE",
            (DbKind::Sqlite, true) => "BEGIN DEFERRED",
            (DbKind::Postgres, false) => "BEGIN",
            (DbKind::Postgres, true) => "BEGIN READ ONLY",
            (DbKind::MySql, false) => "START TRANSACTION",
            (DbKind::MySql, true) => "START TRANSACTION READ ONLY",
        };
        self.raw_execute(statement).await?;
        self.open = true;
        Ok(())
    }

    pub(crate) async fn commit(&mut self) -> Result<(), DbError> {
        if !self.open {
            return Ok(());
        }
        self.raw_execute("COMMIT").await?;
        self.open = false;
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) -> Result<(), DbError> {
        if !self.open {
            return Ok(());
        }
        self.raw_execute("ROLLBACK").await?;
        self.open = false;
        Ok(())
    }

    fn guard_write(&self, sql: &str) -> Result<(), DbError> {
        if self.readonly && is_write_sql(sql) {
            return Err(DbError::ReadOnlyViolation);
        }
        Ok(())
    }

    /// Execute a statement, returning the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, DbError> {
        self.guard_write(sql)?;
        let conn = self.conn_mut()?;
        let result = match conn {
            TxConnection::Sqlite(c) => bind_sqlite(sqlx::query(sql), params)
                .execute(&mut **c)
                .await
                .map(|r| r.rows_affected()),
            TxConnection::Postgres(c) => bind_postgres(sqlx::query(sql), params)
                .execute(&mut **c)
                .await
                .map(|r| r.rows_affected()),
            TxConnection::MySql(c) => bind_mysql(sqlx::query(sql), params)
                .execute(&mut **c)
                .await
                .map(|r| r.rows_affected()),
        };
        result.map_err(|e| DbError::query(sql, e))
    }

    /// Insert and return the generated id. SQLite and PostgreSQL statements
    /// carry a `RETURNING id` clause; MySQL reads `LAST_INSERT_ID()` from
    /// the statement result.
    pub async fn execute_returning_id(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<i64, DbError> {
        self.guard_write(sql)?;
        let conn = self.conn_mut()?;
        match conn {
            TxConnection::Sqlite(c) => {
                let row = bind_sqlite(sqlx::query(sql), params)
                    .fetch_one(&mut **c)
                    .await
                    .map_err(|e| DbError::query(sql, e))?;
                DbRow::Sqlite(row).i64_at(0)
            }
            TxConnection::Postgres(c) => {
                let row = bind_postgres(sqlx::query(sql), params)
                    .fetch_one(&mut **c)
                    .await
                    .map_err(|e| DbError::query(sql, e))?;
                DbRow::Postgres(row).i64_at(0)
            }
            TxConnection::MySql(c) => {
                let result = bind_mysql(sqlx::query(sql), params)
                    .execute(&mut **c)
                    .await
                    .map_err(|e| DbError::query(sql, e))?;
                Ok(result.last_insert_id() as i64)
            }
        }
    }

    /// Execute the same statement once per parameter row.
    pub async fn executemany(
        &mut self,
        sql: &str,
        param_rows: &[Vec<SqlParam>],
    ) -> Result<u64, DbError> {
        let mut affected = 0;
        for params in param_rows {
            affected += self.execute(sql, params).await?;
        }
        Ok(affected)
    }

    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Option<DbRow>, DbError> {
        let conn = self.conn_mut()?;
        let row = match conn {
            TxConnection::Sqlite(c) => bind_sqlite(sqlx::query(sql), params)
                .fetch_optional(&mut **c)
                .await
                .map_err(|e| DbError::query(sql, e))?
                .map(DbRow::Sqlite),
            TxConnection::Postgres(c) => bind_postgres(sqlx::query(sql), params)
                .fetch_optional(&mut **c)
                .await
                .map_err(|e| DbError::query(sql, e))?
                .map(DbRow::Postgres),
            TxConnection::MySql(c) => bind_mysql(sqlx::query(sql), params)
                .fetch_optional(&mut **c)
                .await
                .map_err(|e| DbError::query(sql, e))?
                .map(DbRow::MySql),
        };
        Ok(row)
    }

    pub async fn fetch_one(&mut self, sql: &str, params: &[SqlParam]) -> Result<DbRow, DbError> {
        self.fetch_optional(sql, params)
            .await?
            .ok_or_else(|| DbError::query(sql, sqlx::Error::RowNotFound))
    }

    pub async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Vec<DbRow>, DbError> {
        let conn = self.conn_mut()?;
        let rows = match conn {
            TxConnection::Sqlite(c) => bind_sqlite(sqlx::query(sql), params)
                .fetch_all(&mut **c)
                .await
                .map_err(|e| DbError::query(sql, e))?
                .into_iter()
                .map(DbRow::Sqlite)
                .collect(),
            TxConnection::Postgres(c) => bind_postgres(sqlx::query(sql), params)
                .fetch_all(&mut **c)
                .await
                .map_err(|e| DbError::query(sql, e))?
                .into_iter()
                .map(DbRow::Postgres)
                .collect(),
            TxConnection::MySql(c) => bind_mysql(sqlx::query(sql), params)
                .fetch_all(&mut **c)
                .await
                .map_err(|e| DbError::query(sql, e))?
                .into_iter()
                .map(DbRow::MySql)
                .collect(),
        };
        Ok(rows)
    }

    /// First column of the first row as an i64 (COUNT, MAX(id), ...).
    pub async fn fetch_val_i64(&mut self, sql: &str, params: &[SqlParam]) -> Result<i64, DbError> {
        self.fetch_one(sql, params).await?.i64_at(0)
    }
}

impl Drop for TxContext {
    fn drop(&mut self) {
        // A context dropped with an open transaction (body panicked, or a
        // caller leaked it past the coordinator) must not return its
        // connection to the pool mid-transaction. Detaching closes the
        // physical connection instead; the pool replaces it on demand.
        if self.open {
            if let Some(conn) = self.conn.take() {
                tracing::warn!(
                    backend = %self.kind,
                    "transaction context dropped while open; discarding connection"
                );
                match conn {
                    TxConnection::Sqlite(c) => drop(c.detach()),
                    TxConnection::Postgres(c) => drop(c.detach()),
                    TxConnection::MySql(c) => drop(c.detach()),
                }
            }
        }
    }
}

fn is_write_sql(sql: &str) -> bool {
    let head = sql.trim_start().to_ascii_uppercase();
    const WRITE_PREFIXES: [&str; 8] = [
        "INSERT", "UPDATE", "DELETE", "REPLACE", "CREATE", "DROP", "ALTER", "TRUNCATE",
    ];
    WRITE_PREFIXES.iter().any(|p| head.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_sql_detection() {
        assert!(is_write_sql("INSERT INTO t VALUES (1)"));
        assert!(is_write_sql("  update t set a = 1"));
        assert!(is_write_sql("DELETE FROM t"));
        assert!(!is_write_sql("SELECT * FROM t"));
        assert!(!is_write_sql("  select 1"));
    }
}
