//! Admin API configuration.

use serde::Deserialize;

fn default_database() -> String {
    "default".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_min_cron_interval() -> u64 {
    60
}

/// `admin.yaml`
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Schedules firing more often than this are rejected at create/update
    /// time. Must match the dispatcher's setting, or the admin accepts
    /// crons the dispatcher refuses to run (and vice versa).
    #[serde(default = "default_min_cron_interval")]
    pub min_cron_interval_seconds: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            host: default_host(),
            port: default_port(),
            min_cron_interval_seconds: default_min_cron_interval(),
        }
    }
}
