//! Dispatcher configuration documents.

use serde::Deserialize;

fn default_database() -> String {
    "default".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_max_sleep() -> u64 {
    300
}

fn default_min_cron_interval() -> u64 {
    60
}

/// `dispatcher.yaml`
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Upper bound on the adaptive sleep between ticks.
    #[serde(default = "default_max_sleep")]
    pub max_sleep_seconds: u64,
    /// Crons firing more often than this are rejected, never dispatched.
    #[serde(default = "default_min_cron_interval")]
    pub min_cron_interval_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            poll_interval_seconds: default_poll_interval(),
            max_sleep_seconds: default_max_sleep(),
            min_cron_interval_seconds: default_min_cron_interval(),
        }
    }
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "cadence-dispatcher".to_string()
}

fn default_topic() -> String {
    "cadence-jobs".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_max_poll_records() -> u32 {
    100
}

/// `queue.yaml`
#[derive(Debug, Clone, Deserialize)]
pub struct QueueDispatcherConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// `earliest` or `latest`.
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: u32,
}

impl Default for QueueDispatcherConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            bootstrap_servers: default_bootstrap_servers(),
            group_id: default_group_id(),
            topic: default_topic(),
            auto_offset_reset: default_auto_offset_reset(),
            max_poll_records: default_max_poll_records(),
        }
    }
}
