//! Multi-resource transaction coordinator.
//!
//! [`transaction`] brackets a body future with one transaction per named
//! database: acquire in declared order, begin each, publish the contexts
//! into a task-local map ([`current_tx`] looks them up by name), commit in
//! acquisition order on success, roll back in reverse order on error.
//!
//! Atomicity is best effort, not two-phase commit: if a commit fails after
//! earlier databases have committed, those commits remain and the error
//! propagates. Bodies needing stronger guarantees must be idempotent.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::DbError;
use crate::registry::DatabaseRegistry;
use crate::tx::{TxContext, TxMode};

type TxHandle = Arc<Mutex<TxContext>>;
type TxMap = Arc<HashMap<String, TxHandle>>;

tokio::task_local! {
    static TX_SCOPE: TxMap;
}

/// Fetch the transaction context for `name` from the current task's scope.
pub fn current_tx(name: &str) -> Result<TxHandle, DbError> {
    TX_SCOPE
        .try_with(|map| map.get(name).cloned())
        .ok()
        .flatten()
        .ok_or_else(|| DbError::NoTransactionContext(name.to_string()))
}

/// Run `body` inside transactions on the named databases.
///
/// The scope is per logical task: concurrent coordinators on independent
/// tasks do not observe each other. Nested invocation on the same task
/// fails fast with [`DbError::NestedTransaction`].
pub async fn transaction<T, E, F, Fut>(
    registry: &DatabaseRegistry,
    databases: &[&str],
    mode: TxMode,
    body: F,
) -> Result<T, E>
where
    E: From<DbError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if TX_SCOPE.try_with(|_| ()).is_ok() {
        return Err(E::from(DbError::NestedTransaction));
    }

    let mut ordered: Vec<(String, TxHandle)> = Vec::with_capacity(databases.len());
    let mut map: HashMap<String, TxHandle> = HashMap::with_capacity(databases.len());

    for name in databases {
        if map.contains_key(*name) {
            rollback_reverse(&ordered).await;
            return Err(E::from(DbError::Configuration(format!(
                "database '{name}' listed twice in transaction scope"
            ))));
        }
        let db = match registry.get(name) {
            Ok(db) => db,
            Err(e) => {
                rollback_reverse(&ordered).await;
                return Err(E::from(e));
            }
        };
        let ctx = match db.begin(mode).await {
            Ok(ctx) => ctx,
            Err(e) => {
                rollback_reverse(&ordered).await;
                return Err(E::from(e));
            }
        };
        let handle: TxHandle = Arc::new(Mutex::new(ctx));
        ordered.push((name.to_string(), handle.clone()));
        map.insert(name.to_string(), handle);
    }

    let result = TX_SCOPE.scope(Arc::new(map), body()).await;

    match result {
        Ok(value) => {
            for (index, (name, handle)) in ordered.iter().enumerate() {
                let mut ctx = handle.lock().await;
                if let Err(commit_err) = ctx.commit().await {
                    tracing::error!(database = %name, error = %commit_err, "commit failed");
                    // Earlier commits stand (best effort); abandon the rest.
                    drop(ctx);
                    rollback_reverse(&ordered[index..]).await;
                    return Err(E::from(commit_err));
                }
            }
            Ok(value)
        }
        Err(e) => {
            rollback_reverse(&ordered).await;
            Err(e)
        }
    }
}

async fn rollback_reverse(handles: &[(String, TxHandle)]) {
    for (name, handle) in handles.iter().rev() {
        let mut ctx = handle.lock().await;
        if let Err(e) = ctx.rollback().await {
            tracing::warn!(database = %name, error = %e, "rollback failed");
        }
    }
}
