//! Execution history DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution::{ExecutionStatus, ParamSource};

/// One execution row as shown by the admin surface, with the owning cron
/// job's name joined in when the row has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionView {
    pub id: i64,
    pub job_id: Option<i64>,
    pub cron_name: Option<String>,
    pub handler_name: String,
    pub scheduled_time: DateTime<Utc>,
    pub params: Option<serde_json::Value>,
    pub param_source: ParamSource,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
