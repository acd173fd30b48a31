//! Dispatcher error types

use chrono::{DateTime, Utc};
use thiserror::Error;

use cadence_core::CronParseError;
use cadence_db::DbError;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Bad cron expression; the cron is skipped this tick.
    #[error(transparent)]
    CronParse(#[from] CronParseError),

    /// The schedule fires more often than allowed; the cron is never
    /// dispatched until its expression is fixed.
    #[error(
        "cron interval too short for '{name}': {interval_seconds}s (minimum {minimum_seconds}s)"
    )]
    CronIntervalTooShort {
        name: String,
        interval_seconds: i64,
        minimum_seconds: i64,
    },

    /// Insert of one execution row failed; the cron is skipped this tick.
    #[error("failed to create execution for job {job_id} at {scheduled_time}")]
    JobCreation {
        job_id: i64,
        scheduled_time: DateTime<Utc>,
        #[source]
        source: DbError,
    },

    /// Registry/pool level failure; the whole tick is skipped.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Queue dispatcher errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue adapter error: {0}")]
    Adapter(String),

    /// Undeliverable by design; the message is acknowledged and dropped.
    #[error("malformed queue message: {0}")]
    Malformed(String),

    /// Transient insert failure; the message is abandoned so the adapter
    /// redelivers it.
    #[error("failed to create event execution for handler '{handler}'")]
    Insert {
        handler: String,
        #[source]
        source: DbError,
    },

    #[error(transparent)]
    Db(#[from] DbError),
}
