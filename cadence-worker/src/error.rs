//! Worker error types

use thiserror::Error;

use cadence_db::DbError;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// No handler registered under the execution's snapshotted name.
    /// Terminal: the row is marked FAILED and never re-queued.
    #[error("handler not found: {0}")]
    HandlerNotFound(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Two registrations under the same handler name. Startup-time fatal.
#[derive(Debug, Error)]
#[error("duplicate handler name '{0}'")]
pub struct DuplicateHandlerName(pub String);
