//! Cron job endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use cadence_core::dto::cron::{CreateCronJob, UpdateCronJob};
use cadence_core::dto::page::Page;
use cadence_core::CronJob;

use crate::api::error::ApiResult;
use crate::service;
use crate::state::AdminState;

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct CronListQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
    is_enabled: Option<bool>,
}

/// GET /cron
pub async fn list(
    State(state): State<AdminState>,
    Query(query): Query<CronListQuery>,
) -> ApiResult<Json<Page<CronJob>>> {
    let page = service::cron::list(&state, query.page, query.size, query.is_enabled).await?;
    Ok(Json(page))
}

/// POST /cron
pub async fn create(
    State(state): State<AdminState>,
    Json(req): Json<CreateCronJob>,
) -> ApiResult<Json<CronJob>> {
    tracing::info!(name = %req.name, "creating cron job");
    let job = service::cron::create(&state, req).await?;
    Ok(Json(job))
}

/// GET /cron/{id}
pub async fn get(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CronJob>> {
    let job = service::cron::get(&state, id).await?;
    Ok(Json(job))
}

/// PUT /cron/{id}
pub async fn update(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCronJob>,
) -> ApiResult<Json<CronJob>> {
    let job = service::cron::update(&state, id, req).await?;
    Ok(Json(job))
}

/// DELETE /cron/{id}
pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    service::cron::delete(&state, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// POST /cron/{id}/toggle
pub async fn toggle(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CronJob>> {
    let job = service::cron::toggle(&state, id).await?;
    Ok(Json(job))
}
