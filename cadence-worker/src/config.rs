//! Worker pool configuration.

use serde::Deserialize;

fn default_database() -> String {
    "default".to_string()
}

fn default_pool_size() -> usize {
    5
}

fn default_poll_interval() -> u64 {
    5
}

fn default_claim_batch_size() -> usize {
    10
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// `worker.yaml`
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Database holding the two core tables.
    #[serde(default = "default_database")]
    pub database: String,
    /// Additional pools reachable from handlers.
    #[serde(default)]
    pub databases: Vec<String>,
    /// Concurrently executing units.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: usize,
    /// Grace period for in-flight units on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            databases: Vec::new(),
            pool_size: default_pool_size(),
            poll_interval_seconds: default_poll_interval(),
            claim_batch_size: default_claim_batch_size(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl WorkerConfig {
    /// Every database this worker needs open, primary first.
    pub fn all_databases(&self) -> Vec<String> {
        let mut names = vec![self.database.clone()];
        for name in &self.databases {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}
