//! HTTP admin surface.
//!
//! All mutation of `cron_jobs` happens here; `job_executions` is exposed
//! read-only except for the retry and delete actions. The crate is layered
//! api → service → repository: api maps HTTP to service calls, services
//! own validation and transaction scopes, repositories own SQL.

pub mod api;
pub mod config;
pub mod repository;
pub mod service;
pub mod state;

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing::info;

pub use config::AdminConfig;
pub use state::AdminState;

/// Bind and serve the admin API until the shutdown token fires.
pub async fn serve(
    state: AdminState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "admin api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("admin api stopped");
    Ok(())
}
