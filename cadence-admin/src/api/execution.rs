//! Execution history endpoints.

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use cadence_core::dto::execution::ExecutionView;
use cadence_core::dto::page::Page;
use cadence_core::ExecutionStatus;

use crate::api::error::{ApiError, ApiResult};
use crate::repository::execution::ExecutionFilter;
use crate::service;
use crate::state::AdminState;

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ExecutionListQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
    cron_id: Option<i64>,
    status: Option<String>,
}

/// GET /execution
pub async fn list(
    State(state): State<AdminState>,
    Query(query): Query<ExecutionListQuery>,
) -> ApiResult<Json<Page<ExecutionView>>> {
    let status = query
        .status
        .as_deref()
        .map(ExecutionStatus::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let filter = ExecutionFilter {
        cron_id: query.cron_id,
        status,
    };
    let page = service::execution::list(&state, query.page, query.size, filter).await?;
    Ok(Json(page))
}

/// GET /execution/{id}
pub async fn get(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ExecutionView>> {
    let execution = service::execution::get(&state, id).await?;
    Ok(Json(execution))
}

/// POST /execution/{id}/retry
pub async fn retry(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ExecutionView>> {
    tracing::info!(execution_id = id, "operator retry requested");
    let execution = service::execution::retry(&state, id).await?;
    Ok(Json(execution))
}

/// DELETE /execution/{id}
pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    service::execution::delete(&state, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
