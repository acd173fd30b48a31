//! Cron job DTOs

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_max_retry() -> i32 {
    3
}

fn default_timeout_seconds() -> i32 {
    3600
}

/// Create a new cron job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCronJob {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cron_expression: String,
    pub handler_name: String,
    #[serde(default)]
    pub handler_params: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default = "default_true")]
    pub allow_overlap: bool,
    #[serde(default = "default_max_retry")]
    pub max_retry: i32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i32,
}

/// Partial update of a cron job; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCronJob {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub handler_name: Option<String>,
    #[serde(default)]
    pub handler_params: Option<serde_json::Value>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub allow_overlap: Option<bool>,
    #[serde(default)]
    pub max_retry: Option<i32>,
    #[serde(default)]
    pub timeout_seconds: Option<i32>,
}
