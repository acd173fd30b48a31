//! Two-database sync handler.
//!
//! Copies the `sample_data` table from one registered database to another
//! inside a single coordinator scope: both transactions commit together or
//! roll back together (best effort).
//!
//! Params:
//! ```json
//! { "source_db": "default", "target_db": "warehouse" }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use cadence_db::{current_tx, transaction, DbError, DbKind, SqlParam, TxMode};

use crate::handler::{Handler, HandlerContext};

fn default_source() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
struct SyncParams {
    #[serde(default = "default_source")]
    source_db: String,
    target_db: String,
}

pub struct SyncSampleDataHandler;

#[async_trait]
impl Handler for SyncSampleDataHandler {
    async fn execute(&self, ctx: &HandlerContext, params: Value) -> anyhow::Result<Value> {
        let params: SyncParams = serde_json::from_value(params)?;
        let source = params.source_db.as_str();
        let target = params.target_db.as_str();

        let synced = transaction::<_, DbError, _, _>(
            ctx.databases(),
            &[source, target],
            TxMode::ReadWrite,
            || async {
                let source_tx = current_tx(source)?;
                let target_tx = current_tx(target)?;

                let rows = {
                    let mut source_tx = source_tx.lock().await;
                    let source_kind = source_tx.kind();
                    source_tx
                        .execute(create_table_sql(source_kind), &[])
                        .await?;
                    source_tx
                        .fetch_all(
                            "SELECT id, name, value FROM sample_data ORDER BY id",
                            &[],
                        )
                        .await?
                };

                let mut target_tx = target_tx.lock().await;
                let target_kind = target_tx.kind();
                target_tx
                    .execute(create_table_sql(target_kind), &[])
                    .await?;

                let mut synced: u64 = 0;
                for row in &rows {
                    let bind = [
                        SqlParam::from(row.get_i64("id")?),
                        SqlParam::from(row.get_opt_string("name")?),
                        SqlParam::from(row.get_opt_string("value")?),
                    ];
                    target_tx.execute(upsert_sql(target_kind), &bind).await?;
                    synced += 1;
                }
                Ok(synced)
            },
        )
        .await?;

        tracing::info!(synced, source, target, "sample_data sync complete");
        Ok(json!({
            "action": "sync",
            "count": synced,
            "from": params.source_db,
            "to": params.target_db,
        }))
    }
}

fn create_table_sql(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite => {
            "CREATE TABLE IF NOT EXISTS sample_data
             (id INTEGER PRIMARY KEY, name TEXT, value TEXT)"
        }
        DbKind::Postgres => {
            "CREATE TABLE IF NOT EXISTS sample_data
             (id BIGINT PRIMARY KEY, name TEXT, value TEXT)"
        }
        DbKind::MySql => {
            "CREATE TABLE IF NOT EXISTS sample_data
             (id BIGINT PRIMARY KEY, name VARCHAR(255), value TEXT)"
        }
    }
}

fn upsert_sql(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Sqlite => {
            "INSERT INTO sample_data (id, name, value) VALUES (?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, value = excluded.value"
        }
        DbKind::Postgres => {
            "INSERT INTO sample_data (id, name, value) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, value = excluded.value"
        }
        DbKind::MySql => {
            "INSERT INTO sample_data (id, name, value) VALUES (?, ?, ?)
             ON DUPLICATE KEY UPDATE name = VALUES(name), value = VALUES(value)"
        }
    }
}
