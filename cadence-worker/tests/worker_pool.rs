//! Worker pool lifecycle against a real SQLite database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cadence_db::config::SqliteOptions;
use cadence_db::{
    current_tx, schema, transaction, DatabaseConfig, DatabaseRegistry, DatabasesConfig, DbError,
    PoolSettings, SqlParam, TxMode,
};
use cadence_worker::{handlers, Handler, HandlerContext, HandlerRegistry, WorkerConfig, WorkerPool};

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

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval_seconds: 1,
        ..WorkerConfig::default()
    }
}

/// Handler that fails until `succeed_after` invocations have happened.
struct FlakyHandler {
    invocations: Arc<AtomicU32>,
    succeed_after: u32,
}

#[async_trait]
impl Handler for FlakyHandler {
    async fn execute(&self, _ctx: &HandlerContext, params: Value) -> anyhow::Result<Value> {
        let attempt = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.succeed_after {
            anyhow::bail!("transient failure on attempt {attempt}");
        }
        Ok(params)
    }
}

fn registry_with_flaky(invocations: Arc<AtomicU32>, succeed_after: u32) -> HandlerRegistry {
    let mut handlers = handlers::builtin_registry().unwrap();
    handlers
        .register("flaky", move || {
            Box::new(FlakyHandler {
                invocations: invocations.clone(),
                succeed_after,
            })
        })
        .unwrap();
    handlers
}

async fn insert_cron_job(
    registry: &DatabaseRegistry,
    name: &str,
    handler: &str,
    max_retry: i32,
    timeout_seconds: i32,
) -> i64 {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadWrite, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        let now = Utc::now();
        tx.execute_returning_id(
            "INSERT INTO cron_jobs
                 (name, cron_expression, handler_name, is_enabled, allow_overlap,
                  max_retry, timeout_seconds, created_at, updated_at)
             VALUES (?, '* * * * *', ?, 1, 1, ?, ?, ?, ?)
             RETURNING id",
            &[
                SqlParam::from(name),
                SqlParam::from(handler),
                SqlParam::from(max_retry),
                SqlParam::from(timeout_seconds),
                SqlParam::from(now),
                SqlParam::from(now),
            ],
        )
        .await
    })
    .await
    .unwrap()
}

async fn insert_pending(
    registry: &DatabaseRegistry,
    job_id: Option<i64>,
    handler: &str,
    params: Option<Value>,
) -> i64 {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadWrite, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        let now = Utc::now();
        tx.execute_returning_id(
            "INSERT INTO job_executions
                 (job_id, handler_name, scheduled_time, params, param_source, status, created_at)
             VALUES (?, ?, ?, ?, 'cron', 'PENDING', ?)
             RETURNING id",
            &[
                SqlParam::from(job_id),
                SqlParam::from(handler),
                SqlParam::from(now),
                SqlParam::from(params.clone()),
                SqlParam::from(now),
            ],
        )
        .await
    })
    .await
    .unwrap()
}

#[derive(Debug)]
struct RowState {
    status: String,
    retry_count: i32,
    error_message: Option<String>,
    result: Option<Value>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

async fn row_state(registry: &DatabaseRegistry, id: i64) -> RowState {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadOnly, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        let row = tx
            .fetch_one(
                "SELECT status, retry_count, error_message, result, started_at, finished_at
                 FROM job_executions WHERE id = ?",
                &[SqlParam::from(id)],
            )
            .await?;
        Ok(RowState {
            status: row.get_string("status")?,
            retry_count: row.get_i32("retry_count")?,
            error_message: row.get_opt_string("error_message")?,
            result: row.get_opt_json("result")?,
            started_at: row.get_opt_datetime("started_at")?,
            finished_at: row.get_opt_datetime("finished_at")?,
        })
    })
    .await
    .unwrap()
}

/// Run a pool until the row settles in one of `terminal` states (with no
/// pending re-queue), or the deadline passes.
async fn run_pool_until_settled(
    registry: Arc<DatabaseRegistry>,
    handlers: HandlerRegistry,
    execution_id: i64,
    terminal: &[&str],
    deadline: Duration,
) -> RowState {
    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(
        registry.clone(),
        Arc::new(handlers),
        fast_config(),
        shutdown.clone(),
    );
    let task = tokio::spawn(async move { pool.run().await });

    let limit = tokio::time::Instant::now() + deadline;
    let state = loop {
        let state = row_state(&registry, execution_id).await;
        if terminal.contains(&state.status.as_str()) {
            break state;
        }
        if tokio::time::Instant::now() > limit {
            break state;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    shutdown.cancel();
    task.await.unwrap();
    state
}

#[tokio::test]
async fn echo_execution_succeeds_with_its_params_as_result() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "t1", "echo", 0, 10).await;
    let execution_id =
        insert_pending(&registry, Some(job_id), "echo", Some(json!({"x": 1}))).await;

    let state = run_pool_until_settled(
        registry.clone(),
        handlers::builtin_registry().unwrap(),
        execution_id,
        &["SUCCESS"],
        Duration::from_secs(15),
    )
    .await;

    assert_eq!(state.status, "SUCCESS");
    assert_eq!(state.result, Some(json!({"x": 1})));
    assert_eq!(state.retry_count, 0);
    let (started, finished) = (state.started_at.unwrap(), state.finished_at.unwrap());
    assert!(started <= finished);
}

#[tokio::test]
async fn event_rows_without_a_cron_job_run_with_default_policy() {
    let (_dir, registry) = sqlite_registry().await;
    let execution_id = insert_pending(&registry, None, "echo", Some(json!({"ev": true}))).await;

    let state = run_pool_until_settled(
        registry.clone(),
        handlers::builtin_registry().unwrap(),
        execution_id,
        &["SUCCESS"],
        Duration::from_secs(15),
    )
    .await;

    assert_eq!(state.status, "SUCCESS");
    assert_eq!(state.result, Some(json!({"ev": true})));
}

#[tokio::test]
async fn failures_requeue_until_success_within_budget() {
    let (_dir, registry) = sqlite_registry().await;
    let invocations = Arc::new(AtomicU32::new(0));
    let handlers = registry_with_flaky(invocations.clone(), 2);

    let job_id = insert_cron_job(&registry, "s2", "flaky", 2, 10).await;
    let execution_id =
        insert_pending(&registry, Some(job_id), "flaky", Some(json!({"ok": true}))).await;

    let state = run_pool_until_settled(
        registry.clone(),
        handlers,
        execution_id,
        &["SUCCESS"],
        Duration::from_secs(20),
    )
    .await;

    assert_eq!(state.status, "SUCCESS");
    assert_eq!(state.retry_count, 2);
    assert_eq!(state.result, Some(json!({"ok": true})));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_budget_exhaustion_is_terminal() {
    let (_dir, registry) = sqlite_registry().await;
    let invocations = Arc::new(AtomicU32::new(0));
    let handlers = registry_with_flaky(invocations.clone(), u32::MAX);

    let job_id = insert_cron_job(&registry, "s3", "flaky", 1, 10).await;
    let execution_id = insert_pending(&registry, Some(job_id), "flaky", None).await;

    let state = run_pool_until_settled(
        registry.clone(),
        handlers,
        execution_id,
        &["__never__"],
        Duration::from_secs(8),
    )
    .await;

    // 1 + max_retry attempts, then FAILED stays.
    assert_eq!(state.status, "FAILED");
    assert_eq!(state.retry_count, 2);
    assert!(state.error_message.unwrap().contains("transient failure"));
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_retry_budget_permits_exactly_one_invocation() {
    let (_dir, registry) = sqlite_registry().await;
    let invocations = Arc::new(AtomicU32::new(0));
    let handlers = registry_with_flaky(invocations.clone(), u32::MAX);

    let job_id = insert_cron_job(&registry, "b2", "flaky", 0, 10).await;
    let execution_id = insert_pending(&registry, Some(job_id), "flaky", None).await;

    let state = run_pool_until_settled(
        registry.clone(),
        handlers,
        execution_id,
        &["__never__"],
        Duration::from_secs(6),
    )
    .await;

    assert_eq!(state.status, "FAILED");
    assert_eq!(state.retry_count, 1);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_handlers_time_out_and_exhaust_their_budget() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "s4", "sample", 1, 1).await;
    let execution_id = insert_pending(
        &registry,
        Some(job_id),
        "sample",
        Some(json!({"sleep_seconds": 30.0})),
    )
    .await;

    let state = run_pool_until_settled(
        registry.clone(),
        handlers::builtin_registry().unwrap(),
        execution_id,
        &["__never__"],
        Duration::from_secs(12),
    )
    .await;

    assert_eq!(state.status, "TIMEOUT");
    assert_eq!(state.retry_count, 2);
    assert_eq!(state.error_message.as_deref(), Some("Execution timed out"));
}

#[tokio::test]
async fn missing_handlers_fail_terminally_without_requeue() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "nf", "does_not_exist", 3, 10).await;
    let execution_id = insert_pending(&registry, Some(job_id), "does_not_exist", None).await;

    let state = run_pool_until_settled(
        registry.clone(),
        handlers::builtin_registry().unwrap(),
        execution_id,
        &["__never__"],
        Duration::from_secs(6),
    )
    .await;

    // Budget allowed 3 retries, but the cause is permanent: one FAILED mark.
    assert_eq!(state.status, "FAILED");
    assert_eq!(state.retry_count, 1);
    assert!(state.error_message.unwrap().contains("handler not found"));
}

#[tokio::test]
async fn panicking_handlers_are_recorded_as_failures() {
    struct PanicHandler;

    #[async_trait]
    impl Handler for PanicHandler {
        async fn execute(&self, _ctx: &HandlerContext, _params: Value) -> anyhow::Result<Value> {
            panic!("boom");
        }
    }

    let (_dir, registry) = sqlite_registry().await;
    let mut handlers = HandlerRegistry::new();
    handlers.register("panicky", || Box::new(PanicHandler)).unwrap();

    let job_id = insert_cron_job(&registry, "pan", "panicky", 0, 10).await;
    let execution_id = insert_pending(&registry, Some(job_id), "panicky", None).await;

    let state = run_pool_until_settled(
        registry.clone(),
        handlers,
        execution_id,
        &["__never__"],
        Duration::from_secs(6),
    )
    .await;

    assert_eq!(state.status, "FAILED");
    assert!(state.error_message.unwrap().contains("panicked"));
}

#[tokio::test]
async fn the_claim_cas_lets_exactly_one_winner_through() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "race", "echo", 0, 10).await;
    let execution_id = insert_pending(&registry, Some(job_id), "echo", None).await;

    let claim = |registry: Arc<DatabaseRegistry>| async move {
        transaction::<_, DbError, _, _>(&registry, &["default"], TxMode::ReadWrite, || async {
            let tx = current_tx("default")?;
            let mut tx = tx.lock().await;
            tx.execute(
                "UPDATE job_executions
                 SET status = 'RUNNING', started_at = ?
                 WHERE id = ? AND status = 'PENDING'",
                &[SqlParam::from(Utc::now()), SqlParam::from(execution_id)],
            )
            .await
        })
        .await
        .unwrap()
    };

    let (first, second) = tokio::join!(claim(registry.clone()), claim(registry.clone()));
    assert_eq!(first + second, 1, "exactly one CAS may win");
}
