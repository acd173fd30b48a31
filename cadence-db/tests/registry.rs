//! Registry and coordinator behavior against real SQLite databases.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use cadence_db::config::SqliteOptions;
use cadence_db::{
    current_tx, schema, transaction, DatabaseConfig, DatabaseRegistry, DatabasesConfig, DbError,
    PoolSettings, SqlParam, TxMode,
};

fn sqlite_entry(dir: &Path, file: &str) -> DatabaseConfig {
    DatabaseConfig::Sqlite {
        path: dir.join(file).to_string_lossy().into_owned(),
        pool: PoolSettings::default(),
        options: SqliteOptions::default(),
    }
}

async fn registry_with(names: &[&str]) -> (TempDir, DatabaseRegistry) {
    let dir = TempDir::new().unwrap();
    let mut databases = HashMap::new();
    for name in names {
        databases.insert(name.to_string(), sqlite_entry(dir.path(), &format!("{name}.db")));
    }
    let config = DatabasesConfig { databases };
    let registry = DatabaseRegistry::init_from_config(&config, None).await.unwrap();
    for name in names {
        schema::run_migrations(registry.get(name).unwrap()).await.unwrap();
    }
    (dir, registry)
}

async fn insert_named_job(registry: &DatabaseRegistry, database: &str, name: &str) {
    transaction::<_, DbError, _, _>(registry, &[database], TxMode::ReadWrite, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;
        let now = chrono::Utc::now();
        tx.execute(
            "INSERT INTO cron_jobs
                 (name, cron_expression, handler_name, created_at, updated_at)
             VALUES (?, '* * * * *', 'echo', ?, ?)",
            &[
                SqlParam::from(name),
                SqlParam::from(now),
                SqlParam::from(now),
            ],
        )
        .await?;
        Ok(())
    })
    .await
    .unwrap();
}

async fn count_jobs(registry: &DatabaseRegistry, database: &str) -> i64 {
    transaction::<_, DbError, _, _>(registry, &[database], TxMode::ReadOnly, || async {
        let tx = current_tx(database)?;
        let mut tx = tx.lock().await;
        tx.fetch_val_i64("SELECT COUNT(*) FROM cron_jobs", &[]).await
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn missing_default_database_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let mut databases = HashMap::new();
    databases.insert("primary".to_string(), sqlite_entry(dir.path(), "primary.db"));
    let config = DatabasesConfig { databases };

    let err = DatabaseRegistry::init_from_config(&config, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Configuration(_)));
}

#[tokio::test]
async fn unknown_database_lookup_fails() {
    let (_dir, registry) = registry_with(&["default"]).await;
    assert!(matches!(
        registry.get("nope"),
        Err(DbError::UnknownDatabase(_))
    ));
}

#[tokio::test]
async fn committed_writes_are_visible() {
    let (_dir, registry) = registry_with(&["default"]).await;
    insert_named_job(&registry, "default", "t1").await;
    assert_eq!(count_jobs(&registry, "default").await, 1);
}

#[tokio::test]
async fn body_error_rolls_back() {
    let (_dir, registry) = registry_with(&["default"]).await;

    let result = transaction::<(), DbError, _, _>(
        &registry,
        &["default"],
        TxMode::ReadWrite,
        || async {
            let tx = current_tx("default")?;
            let mut tx = tx.lock().await;
            let now = chrono::Utc::now();
            tx.execute(
                "INSERT INTO cron_jobs
                     (name, cron_expression, handler_name, created_at, updated_at)
                 VALUES ('doomed', '* * * * *', 'echo', ?, ?)",
                &[SqlParam::from(now), SqlParam::from(now)],
            )
            .await?;
            Err(DbError::Transaction("boom".to_string()))
        },
    )
    .await;

    assert!(result.is_err());
    assert_eq!(count_jobs(&registry, "default").await, 0);
}

#[tokio::test]
async fn read_only_mode_rejects_writes() {
    let (_dir, registry) = registry_with(&["default"]).await;

    let result = transaction::<(), DbError, _, _>(
        &registry,
        &["default"],
        TxMode::ReadOnly,
        || async {
            let tx = current_tx("default")?;
            let mut tx = tx.lock().await;
            tx.execute("DELETE FROM cron_jobs", &[]).await?;
            Ok(())
        },
    )
    .await;

    assert!(matches!(result, Err(DbError::ReadOnlyViolation)));
}

#[tokio::test]
async fn nested_transactions_fail_fast() {
    let (_dir, registry) = registry_with(&["default"]).await;

    let result = transaction::<(), DbError, _, _>(
        &registry,
        &["default"],
        TxMode::ReadOnly,
        || async {
            transaction::<(), DbError, _, _>(&registry, &["default"], TxMode::ReadOnly, || async {
                Ok(())
            })
            .await
        },
    )
    .await;

    assert!(matches!(result, Err(DbError::NestedTransaction)));
}

#[tokio::test]
async fn current_tx_outside_a_scope_fails() {
    assert!(matches!(
        current_tx("default"),
        Err(DbError::NoTransactionContext(_))
    ));
}

#[tokio::test]
async fn coordinator_commits_across_two_databases() {
    let (_dir, registry) = registry_with(&["default", "secondary"]).await;

    transaction::<_, DbError, _, _>(
        &registry,
        &["default", "secondary"],
        TxMode::ReadWrite,
        || async {
            for name in ["default", "secondary"] {
                let tx = current_tx(name)?;
                let mut tx = tx.lock().await;
                let now = chrono::Utc::now();
                tx.execute(
                    "INSERT INTO cron_jobs
                         (name, cron_expression, handler_name, created_at, updated_at)
                     VALUES ('pair', '* * * * *', 'echo', ?, ?)",
                    &[SqlParam::from(now), SqlParam::from(now)],
                )
                .await?;
            }
            Ok(())
        },
    )
    .await
    .unwrap();

    assert_eq!(count_jobs(&registry, "default").await, 1);
    assert_eq!(count_jobs(&registry, "secondary").await, 1);
}

#[tokio::test]
async fn coordinator_rolls_back_across_two_databases() {
    let (_dir, registry) = registry_with(&["default", "secondary"]).await;

    let result = transaction::<(), DbError, _, _>(
        &registry,
        &["default", "secondary"],
        TxMode::ReadWrite,
        || async {
            for name in ["default", "secondary"] {
                let tx = current_tx(name)?;
                let mut tx = tx.lock().await;
                let now = chrono::Utc::now();
                tx.execute(
                    "INSERT INTO cron_jobs
                         (name, cron_expression, handler_name, created_at, updated_at)
                     VALUES ('pair', '* * * * *', 'echo', ?, ?)",
                    &[SqlParam::from(now), SqlParam::from(now)],
                )
                .await?;
            }
            Err(DbError::Transaction("abort both".to_string()))
        },
    )
    .await;

    assert!(result.is_err());
    assert_eq!(count_jobs(&registry, "default").await, 0);
    assert_eq!(count_jobs(&registry, "secondary").await, 0);
}

#[tokio::test]
async fn duplicate_scope_names_are_rejected() {
    let (_dir, registry) = registry_with(&["default"]).await;

    let result = transaction::<(), DbError, _, _>(
        &registry,
        &["default", "default"],
        TxMode::ReadOnly,
        || async { Ok(()) },
    )
    .await;

    assert!(matches!(result, Err(DbError::Configuration(_))));
}

#[tokio::test]
async fn exhausted_pool_surfaces_after_the_acquire_timeout() {
    let dir = TempDir::new().unwrap();
    let mut databases = HashMap::new();
    databases.insert(
        "default".to_string(),
        DatabaseConfig::Sqlite {
            path: dir.path().join("default.db").to_string_lossy().into_owned(),
            pool: PoolSettings {
                pool_size: 1,
                pool_timeout_seconds: 1,
                max_idle_seconds: 300,
            },
            options: SqliteOptions::default(),
        },
    );
    let config = DatabasesConfig { databases };
    let registry = DatabaseRegistry::init_from_config(&config, None).await.unwrap();
    let db = registry.get("default").unwrap();
    schema::run_migrations(db).await.unwrap();

    let held = db.begin(TxMode::ReadWrite).await.unwrap();

    let started = std::time::Instant::now();
    let second = db.begin(TxMode::ReadWrite).await;
    assert!(matches!(second, Err(DbError::PoolExhausted(_))));
    assert!(started.elapsed() >= Duration::from_millis(900));

    drop(held);
}
