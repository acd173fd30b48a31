//! Dispatcher behavior against a real SQLite database.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cadence_db::config::SqliteOptions;
use cadence_db::{
    current_tx, schema, transaction, DatabaseConfig, DatabaseRegistry, DatabasesConfig, DbError,
    PoolSettings, SqlParam, TxMode,
};
use cadence_dispatcher::{CronDispatcher, DispatcherConfig};

async fn sqlite_registry() -> (TempDir, Arc<DatabaseRegistry>) {
    let dir = TempDir::new().unwrap();
    let mut databases = HashMap::new();
    databases.insert(
        "default".to_string(),
        DatabaseConfig::Sqlite {
            path: dir.path().join("default.db").to_string_lossy().into_owned(),
            pool: PoolSettings::default(),
            options: SqliteOptions::default(),
        },
    );
    let config = DatabasesConfig { databases };
    let registry = DatabaseRegistry::init_from_config(&config, None).await.unwrap();
    schema::run_migrations(registry.get("default").unwrap()).await.unwrap();
    (dir, Arc::new(registry))
}

fn dispatcher(registry: Arc<DatabaseRegistry>, config: DispatcherConfig) -> CronDispatcher {
    CronDispatcher::new(registry, config, CancellationToken::new())
}

async fn insert_cron_job(
    registry: &DatabaseRegistry,
    name: &str,
    expression: &str,
    allow_overlap: bool,
) -> i64 {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadWrite, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        let now = Utc::now();
        tx.execute_returning_id(
            "INSERT INTO cron_jobs
                 (name, cron_expression, handler_name, handler_params, is_enabled,
                  allow_overlap, max_retry, timeout_seconds, created_at, updated_at)
             VALUES (?, ?, 'echo', '{\"x\":1}', 1, ?, 0, 10, ?, ?)
             RETURNING id",
            &[
                SqlParam::from(name),
                SqlParam::from(expression),
                SqlParam::from(allow_overlap),
                SqlParam::from(now),
                SqlParam::from(now),
            ],
        )
        .await
    })
    .await
    .unwrap()
}

async fn seed_execution(
    registry: &DatabaseRegistry,
    job_id: i64,
    scheduled_time: DateTime<Utc>,
    status: &str,
) {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadWrite, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        tx.execute(
            "INSERT INTO job_executions
                 (job_id, handler_name, scheduled_time, param_source, status, created_at)
             VALUES (?, 'echo', ?, 'cron', ?, ?)",
            &[
                SqlParam::from(job_id),
                SqlParam::from(scheduled_time),
                SqlParam::from(status),
                SqlParam::from(Utc::now()),
            ],
        )
        .await?;
        Ok(())
    })
    .await
    .unwrap()
}

async fn execution_times(registry: &DatabaseRegistry, job_id: i64) -> Vec<DateTime<Utc>> {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadOnly, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        let rows = tx
            .fetch_all(
                "SELECT scheduled_time FROM job_executions
                 WHERE job_id = ? ORDER BY scheduled_time",
                &[SqlParam::from(job_id)],
            )
            .await?;
        rows.iter().map(|r| r.get_datetime("scheduled_time")).collect()
    })
    .await
    .unwrap()
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

#[tokio::test]
async fn a_due_instant_materializes_exactly_once() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "t1", "* * * * *", true).await;
    let d = dispatcher(registry.clone(), DispatcherConfig::default());

    let now = utc(2024, 3, 1, 10, 0, 30);
    d.tick(now).await.unwrap();

    let times = execution_times(&registry, job_id).await;
    assert_eq!(times, vec![utc(2024, 3, 1, 10, 0, 0)]);

    // Same tick again: conflict-ignore, still exactly one row.
    d.tick(now).await.unwrap();
    assert_eq!(execution_times(&registry, job_id).await.len(), 1);
}

#[tokio::test]
async fn racing_dispatchers_insert_one_row_per_instant() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "ha", "* * * * *", true).await;

    let a = dispatcher(registry.clone(), DispatcherConfig::default());
    let b = dispatcher(registry.clone(), DispatcherConfig::default());

    let now = utc(2024, 3, 1, 12, 30, 10);
    let (ra, rb) = tokio::join!(a.tick(now), b.tick(now));
    ra.unwrap();
    rb.unwrap();

    assert_eq!(
        execution_times(&registry, job_id).await,
        vec![utc(2024, 3, 1, 12, 30, 0)]
    );
}

#[tokio::test]
async fn cursor_catches_up_from_the_last_materialized_instant() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "catchup", "* * * * *", true).await;
    seed_execution(&registry, job_id, utc(2024, 3, 1, 9, 57, 0), "SUCCESS").await;

    let d = dispatcher(registry.clone(), DispatcherConfig::default());
    d.tick(utc(2024, 3, 1, 10, 0, 0)).await.unwrap();

    assert_eq!(
        execution_times(&registry, job_id).await,
        vec![
            utc(2024, 3, 1, 9, 57, 0),
            utc(2024, 3, 1, 9, 58, 0),
            utc(2024, 3, 1, 9, 59, 0),
            utc(2024, 3, 1, 10, 0, 0),
        ]
    );
}

#[tokio::test]
async fn overlap_disallowed_suppresses_dispatch_while_incomplete() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "serial", "* * * * *", false).await;
    seed_execution(&registry, job_id, utc(2024, 3, 1, 9, 59, 0), "RUNNING").await;

    let d = dispatcher(registry.clone(), DispatcherConfig::default());
    d.tick(utc(2024, 3, 1, 10, 0, 30)).await.unwrap();

    // Only the seeded RUNNING row; 10:00 was suppressed.
    assert_eq!(execution_times(&registry, job_id).await.len(), 1);
}

#[tokio::test]
async fn overlap_allowed_dispatches_alongside_running_rows() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "parallel", "* * * * *", true).await;
    seed_execution(&registry, job_id, utc(2024, 3, 1, 9, 59, 0), "RUNNING").await;

    let d = dispatcher(registry.clone(), DispatcherConfig::default());
    d.tick(utc(2024, 3, 1, 10, 0, 30)).await.unwrap();

    assert_eq!(execution_times(&registry, job_id).await.len(), 2);
}

#[tokio::test]
async fn too_tight_schedules_never_dispatch() {
    let (_dir, registry) = sqlite_registry().await;
    // Hourly cron against a two-hour minimum: rejected.
    let job_id = insert_cron_job(&registry, "tight", "0 * * * *", true).await;

    let config = DispatcherConfig {
        min_cron_interval_seconds: 7200,
        ..DispatcherConfig::default()
    };
    let d = dispatcher(registry.clone(), config);
    d.tick(utc(2024, 3, 1, 10, 0, 30)).await.unwrap();

    assert!(execution_times(&registry, job_id).await.is_empty());
}

#[tokio::test]
async fn a_broken_expression_does_not_block_other_jobs() {
    let (_dir, registry) = sqlite_registry().await;
    let broken_id = insert_cron_job(&registry, "broken", "not a cron", true).await;
    let good_id = insert_cron_job(&registry, "good", "* * * * *", true).await;

    let d = dispatcher(registry.clone(), DispatcherConfig::default());
    d.tick(utc(2024, 3, 1, 10, 0, 30)).await.unwrap();

    assert!(execution_times(&registry, broken_id).await.is_empty());
    assert_eq!(execution_times(&registry, good_id).await.len(), 1);
}

#[tokio::test]
async fn fresh_jobs_do_not_backfill_past_the_poll_interval() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "fresh", "* * * * *", true).await;

    let d = dispatcher(registry.clone(), DispatcherConfig::default());
    d.tick(utc(2024, 3, 1, 10, 0, 0)).await.unwrap();

    // Floor is now - 60s: exactly the 10:00 instant (next after 09:59:00).
    let times = execution_times(&registry, job_id).await;
    assert_eq!(times, vec![utc(2024, 3, 1, 10, 0, 0)]);
}
