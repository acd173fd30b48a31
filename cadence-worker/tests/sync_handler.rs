//! Multi-database sync handler, end to end over the coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use cadence_db::config::SqliteOptions;
use cadence_db::{
    current_tx, schema, transaction, DatabaseConfig, DatabaseRegistry, DatabasesConfig, DbError,
    PoolSettings, SqlParam, TxMode,
};
use cadence_worker::handlers::SyncSampleDataHandler;
use cadence_worker::{Handler, HandlerContext};

async fn two_sqlite_registry() -> (TempDir, Arc<DatabaseRegistry>) {
    let dir = TempDir::new().unwrap();
    let mut databases = HashMap::new();
    for name in ["default", "warehouse"] {
        databases.insert(
            name.to_string(),
            DatabaseConfig::Sqlite {
                path: dir.path().join(format!("{name}.db")).to_string_lossy().into_owned(),
                pool: PoolSettings::default(),
                options: SqliteOptions::default(),
            },
        );
    }
    let config = DatabasesConfig { databases };
    let registry = DatabaseRegistry::init_from_config(&config, None).await.unwrap();
    schema::run_migrations(registry.get("default").unwrap()).await.unwrap();
    (dir, Arc::new(registry))
}

async fn seed_sample_data(registry: &DatabaseRegistry, rows: &[(i64, &str, &str)]) {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadWrite, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        tx.execute(
            "CREATE TABLE IF NOT EXISTS sample_data (id INTEGER PRIMARY KEY, name TEXT, value TEXT)",
            &[],
        )
        .await?;
        for (id, name, value) in rows {
            tx.execute(
                "INSERT INTO sample_data (id, name, value) VALUES (?, ?, ?)
                 ON CONFLICT (id) DO UPDATE SET name = excluded.name, value = excluded.value",
                &[
                    SqlParam::from(*id),
                    SqlParam::from(*name),
                    SqlParam::from(*value),
                ],
            )
            .await?;
        }
        Ok(())
    })
    .await
    .unwrap()
}

async fn warehouse_rows(registry: &DatabaseRegistry) -> Vec<(i64, String)> {
    transaction::<_, DbError, _, _>(registry, &["warehouse"], TxMode::ReadOnly, || async {
        let tx = current_tx("warehouse")?;
        let mut tx = tx.lock().await;
        let rows = tx
            .fetch_all("SELECT id, value FROM sample_data ORDER BY id", &[])
            .await?;
        rows.iter()
            .map(|row| Ok((row.get_i64("id")?, row.get_string("value")?)))
            .collect()
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn syncs_rows_between_registered_databases() {
    let (_dir, registry) = two_sqlite_registry().await;
    seed_sample_data(&registry, &[(1, "alpha", "a"), (2, "beta", "b")]).await;

    let ctx = HandlerContext::new(registry.clone());
    let result = SyncSampleDataHandler
        .execute(&ctx, json!({ "target_db": "warehouse" }))
        .await
        .unwrap();

    assert_eq!(result["count"], json!(2));
    assert_eq!(
        warehouse_rows(&registry).await,
        vec![(1, "a".to_string()), (2, "b".to_string())]
    );

    // Re-running upserts instead of duplicating.
    seed_sample_data(&registry, &[(2, "beta", "b2")]).await;
    let result = SyncSampleDataHandler
        .execute(&ctx, json!({ "target_db": "warehouse" }))
        .await
        .unwrap();
    assert_eq!(result["count"], json!(2));
    assert_eq!(
        warehouse_rows(&registry).await,
        vec![(1, "a".to_string()), (2, "b2".to_string())]
    );
}

#[tokio::test]
async fn unknown_target_database_is_an_error() {
    let (_dir, registry) = two_sqlite_registry().await;
    seed_sample_data(&registry, &[(1, "alpha", "a")]).await;

    let ctx = HandlerContext::new(registry.clone());
    let err = SyncSampleDataHandler
        .execute(&ctx, json!({ "target_db": "missing" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown database"));
}
