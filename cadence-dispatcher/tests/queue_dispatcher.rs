//! Queue dispatcher behavior with an in-memory adapter.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cadence_db::config::SqliteOptions;
use cadence_db::{
    current_tx, schema, transaction, DatabaseConfig, DatabaseRegistry, DatabasesConfig, DbError,
    PoolSettings, SqlParam, TxMode,
};
use cadence_dispatcher::config::QueueDispatcherConfig;
use cadence_dispatcher::error::QueueError;
use cadence_dispatcher::queue::adapter::{parse_envelope, DeliveryToken, QueueAdapter, QueueMessage};
use cadence_dispatcher::queue::QueueDispatcher;

/// Channel-backed adapter: payloads go in, completions and abandons are
/// recorded for assertions.
#[derive(Clone, Default)]
struct MemoryAdapter {
    inner: Arc<Mutex<MemoryAdapterState>>,
}

#[derive(Default)]
struct MemoryAdapterState {
    queue: VecDeque<Vec<u8>>,
    completed: usize,
    abandoned: usize,
    dropped: usize,
}

impl MemoryAdapter {
    fn push(&self, payload: serde_json::Value) {
        self.inner
            .lock()
            .unwrap()
            .queue
            .push_back(payload.to_string().into_bytes());
    }

    fn push_raw(&self, payload: &[u8]) {
        self.inner.lock().unwrap().queue.push_back(payload.to_vec());
    }

    fn counts(&self) -> (usize, usize, usize) {
        let state = self.inner.lock().unwrap();
        (state.completed, state.abandoned, state.dropped)
    }
}

#[async_trait]
impl QueueAdapter for MemoryAdapter {
    async fn connect(&mut self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<QueueMessage>, QueueError> {
        let payload = self.inner.lock().unwrap().queue.pop_front();
        let Some(payload) = payload else {
            tokio::time::sleep(Duration::from_millis(20)).await;
            return Ok(None);
        };
        match parse_envelope(&payload) {
            Ok((handler_name, params, job_id)) => Ok(Some(QueueMessage {
                handler_name,
                params,
                job_id,
                token: DeliveryToken::default(),
            })),
            Err(_) => {
                self.inner.lock().unwrap().dropped += 1;
                Ok(None)
            }
        }
    }

    async fn complete(&mut self, _message: &QueueMessage) -> Result<(), QueueError> {
        self.inner.lock().unwrap().completed += 1;
        Ok(())
    }

    async fn abandon(&mut self, _message: &QueueMessage) -> Result<(), QueueError> {
        self.inner.lock().unwrap().abandoned += 1;
        Ok(())
    }
}

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

async fn insert_cron_job(registry: &DatabaseRegistry, name: &str, handler: &str) -> i64 {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadWrite, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        let now = Utc::now();
        tx.execute_returning_id(
            "INSERT INTO cron_jobs
                 (name, cron_expression, handler_name, handler_params, is_enabled,
                  allow_overlap, max_retry, timeout_seconds, created_at, updated_at)
             VALUES (?, '* * * * *', ?, '{\"a\":1,\"b\":2}', 1, 1, 0, 10, ?, ?)
             RETURNING id",
            &[
                SqlParam::from(name),
                SqlParam::from(handler),
                SqlParam::from(now),
                SqlParam::from(now),
            ],
        )
        .await
    })
    .await
    .unwrap()
}

struct EventRow {
    job_id: Option<i64>,
    handler_name: String,
    params: Option<serde_json::Value>,
    param_source: String,
    status: String,
}

async fn event_rows(registry: &DatabaseRegistry) -> Vec<EventRow> {
    transaction::<_, DbError, _, _>(registry, &["default"], TxMode::ReadOnly, || async {
        let tx = current_tx("default")?;
        let mut tx = tx.lock().await;
        let rows = tx
            .fetch_all(
                "SELECT job_id, handler_name, params, param_source, status
                 FROM job_executions ORDER BY id",
                &[],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(EventRow {
                    job_id: row.get_opt_i64("job_id")?,
                    handler_name: row.get_string("handler_name")?,
                    params: row.get_opt_json("params")?,
                    param_source: row.get_string("param_source")?,
                    status: row.get_string("status")?,
                })
            })
            .collect()
    })
    .await
    .unwrap()
}

/// Run the dispatcher until `predicate` holds or the deadline passes.
async fn run_until<F>(
    registry: Arc<DatabaseRegistry>,
    adapter: MemoryAdapter,
    predicate: F,
) where
    F: Fn() -> bool,
{
    let shutdown = CancellationToken::new();
    let mut dispatcher = QueueDispatcher::new(
        registry,
        QueueDispatcherConfig::default(),
        adapter,
        shutdown.clone(),
    );
    let task = tokio::spawn(async move { dispatcher.run().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !predicate() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    shutdown.cancel();
    task.await.unwrap().unwrap();
    assert!(predicate(), "dispatcher did not reach expected state in time");
}

#[tokio::test]
async fn merges_base_params_with_message_params() {
    let (_dir, registry) = sqlite_registry().await;
    let job_id = insert_cron_job(&registry, "report", "report_handler").await;

    let adapter = MemoryAdapter::default();
    adapter.push(json!({
        "handler_name": "report_handler",
        "params": { "b": 3, "c": 4 },
        "job_id": job_id,
    }));

    let probe = adapter.clone();
    run_until(registry.clone(), adapter.clone(), move || {
        probe.counts().0 == 1
    })
    .await;

    let rows = event_rows(&registry).await;
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.job_id, Some(job_id));
    assert_eq!(row.handler_name, "report_handler");
    assert_eq!(row.param_source, "event");
    assert_eq!(row.status, "PENDING");
    // Shallow union, message keys win.
    assert_eq!(
        row.params,
        Some(json!({ "a": 1, "b": 3, "c": 4 }))
    );
}

#[tokio::test]
async fn resolves_base_params_by_handler_name_without_job_id() {
    let (_dir, registry) = sqlite_registry().await;
    insert_cron_job(&registry, "report", "report_handler").await;

    let adapter = MemoryAdapter::default();
    adapter.push(json!({ "handler": "report_handler", "params": { "b": 9 } }));

    let probe = adapter.clone();
    run_until(registry.clone(), adapter.clone(), move || {
        probe.counts().0 == 1
    })
    .await;

    let rows = event_rows(&registry).await;
    assert_eq!(rows.len(), 1);
    // job_id stays as given in the envelope (absent).
    assert_eq!(rows[0].job_id, None);
    assert_eq!(rows[0].params, Some(json!({ "a": 1, "b": 9 })));
}

#[tokio::test]
async fn unknown_handlers_still_create_executions_with_message_params_only() {
    let (_dir, registry) = sqlite_registry().await;

    let adapter = MemoryAdapter::default();
    adapter.push(json!({ "handler_name": "adhoc", "params": { "k": "v" } }));

    let probe = adapter.clone();
    run_until(registry.clone(), adapter.clone(), move || {
        probe.counts().0 == 1
    })
    .await;

    let rows = event_rows(&registry).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].handler_name, "adhoc");
    assert_eq!(rows[0].params, Some(json!({ "k": "v" })));
}

#[tokio::test]
async fn malformed_payloads_are_dropped_not_abandoned() {
    let (_dir, registry) = sqlite_registry().await;

    let adapter = MemoryAdapter::default();
    adapter.push_raw(b"definitely not json");
    adapter.push(json!({ "handler_name": "adhoc" }));

    let probe = adapter.clone();
    run_until(registry.clone(), adapter.clone(), move || {
        let (completed, _, dropped) = probe.counts();
        completed == 1 && dropped == 1
    })
    .await;

    let (completed, abandoned, dropped) = adapter.counts();
    assert_eq!(completed, 1);
    assert_eq!(abandoned, 0);
    assert_eq!(dropped, 1);
    assert_eq!(event_rows(&registry).await.len(), 1);
}
