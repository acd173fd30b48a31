//! API error handling.
//!
//! Unified error type and conversions for API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use cadence_db::DbError;

use crate::service::cron::CronServiceError;
use crate::service::execution::ExecutionServiceError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    DatabaseError(DbError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<CronServiceError> for ApiError {
    fn from(err: CronServiceError) -> Self {
        match err {
            CronServiceError::NotFound(id) => {
                ApiError::NotFound(format!("Cron job {id} not found"))
            }
            CronServiceError::DuplicateName(name) => {
                ApiError::Conflict(format!("Cron job name '{name}' already exists"))
            }
            CronServiceError::Validation(msg) => ApiError::BadRequest(msg),
            CronServiceError::Db(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<ExecutionServiceError> for ApiError {
    fn from(err: ExecutionServiceError) -> Self {
        match err {
            ExecutionServiceError::NotFound(id) => {
                ApiError::NotFound(format!("Execution {id} not found"))
            }
            e @ ExecutionServiceError::InvalidState { .. } => ApiError::BadRequest(e.to_string()),
            ExecutionServiceError::Db(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
