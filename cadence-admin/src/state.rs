//! Shared request state.

use std::sync::Arc;

use cadence_db::DatabaseRegistry;

/// State handed to every request handler.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<DatabaseRegistry>,
    /// Name of the database holding the core tables.
    pub database: String,
    /// Minimum accepted firing interval, mirroring the dispatcher's
    /// configured threshold.
    pub min_cron_interval_seconds: u64,
}

impl AdminState {
    pub fn new(
        registry: Arc<DatabaseRegistry>,
        database: impl Into<String>,
        min_cron_interval_seconds: u64,
    ) -> Self {
        Self {
            registry,
            database: database.into(),
            min_cron_interval_seconds,
        }
    }
}
