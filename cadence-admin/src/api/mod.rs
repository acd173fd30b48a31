//! HTTP API layer.
//!
//! Each submodule handles endpoints for one domain; errors funnel through
//! [`error::ApiError`] into JSON `{"error": ...}` bodies.

pub mod cron;
pub mod error;
pub mod execution;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AdminState;

/// Create the admin router with all endpoints.
pub fn create_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Cron definitions
        .route("/cron", get(cron::list).post(cron::create))
        .route(
            "/cron/{id}",
            get(cron::get).put(cron::update).delete(cron::remove),
        )
        .route("/cron/{id}/toggle", post(cron::toggle))
        // Execution history
        .route("/execution", get(execution::list))
        .route(
            "/execution/{id}",
            get(execution::get).delete(execution::remove),
        )
        .route("/execution/{id}/retry", post(execution::retry))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
