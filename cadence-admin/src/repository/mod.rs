//! Data access for the admin surface.
//!
//! Repository functions operate on an open [`TxContext`]; services own the
//! transaction scope. SQL is backend-appropriate (native placeholders).

pub mod cron;
pub mod execution;

use cadence_db::DbKind;

/// Positional placeholder for parameter `n` (1-based).
pub(crate) fn placeholder(kind: DbKind, n: usize) -> String {
    match kind {
        DbKind::Postgres => format!("${n}"),
        DbKind::Sqlite | DbKind::MySql => "?".to_string(),
    }
}
