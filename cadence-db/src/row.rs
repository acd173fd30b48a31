//! Typed row access across backends.

use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row as _;

use crate::error::DbError;

/// One fetched row. Getters decode with the backend's native type mapping
/// (timestamps are chrono UTC values, JSON columns decode to
/// `serde_json::Value`).
pub enum DbRow {
    Sqlite(SqliteRow),
    Postgres(PgRow),
    MySql(MySqlRow),
}

macro_rules! typed_get {
    ($name:ident, $ty:ty) => {
        pub fn $name(&self, column: &str) -> Result<$ty, DbError> {
            let value = match self {
                DbRow::Sqlite(row) => row.try_get::<$ty, _>(column),
                DbRow::Postgres(row) => row.try_get::<$ty, _>(column),
                DbRow::MySql(row) => row.try_get::<$ty, _>(column),
            };
            value.map_err(|source| DbError::Decode {
                column: column.to_string(),
                source,
            })
        }
    };
}

impl DbRow {
    typed_get!(get_i64, i64);
    typed_get!(get_opt_i64, Option<i64>);
    typed_get!(get_i32, i32);
    typed_get!(get_bool, bool);
    typed_get!(get_string, String);
    typed_get!(get_opt_string, Option<String>);
    typed_get!(get_datetime, DateTime<Utc>);
    typed_get!(get_opt_datetime, Option<DateTime<Utc>>);
    typed_get!(get_opt_json, Option<serde_json::Value>);

    /// First-column scalar, for `SELECT COUNT(*)`-style queries.
    pub fn i64_at(&self, index: usize) -> Result<i64, DbError> {
        let value = match self {
            DbRow::Sqlite(row) => row.try_get::<i64, _>(index),
            DbRow::Postgres(row) => row.try_get::<i64, _>(index),
            DbRow::MySql(row) => row.try_get::<i64, _>(index),
        };
        value.map_err(|source| DbError::Decode {
            column: format!("#{index}"),
            source,
        })
    }
}
