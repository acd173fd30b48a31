//! Cron job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered schedule: cron expression plus handler binding and
/// execution policy.
///
/// Mutated only through the admin surface; the dispatcher reads it, the
/// worker pool never does (execution rows snapshot what they need).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cron_expression: String,
    pub handler_name: String,
    pub handler_params: Option<serde_json::Value>,
    pub is_enabled: bool,
    /// When false, a PENDING or RUNNING execution suppresses dispatch of
    /// the next scheduled instant.
    pub allow_overlap: bool,
    /// Additional attempts after the first one; total attempts = 1 + max_retry.
    pub max_retry: i32,
    /// Per-attempt wall-clock limit.
    pub timeout_seconds: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
