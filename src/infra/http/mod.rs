//! HTTP operation surface.

pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::credits::CreditService;
use crate::application::fixes::FixService;
use crate::application::jobs::JobQueue;
use crate::application::repos::{
    AuditRepo, BatchesRepo, FixesRepo, ImageAssetsRepo, JobsRepo,
};
use crate::application::summary::SummaryService;
use crate::cache::CacheState;
use crate::infra::db::PostgresRepositories;

use super::error::InfraError;

#[derive(Clone)]
pub struct AppState {
    pub assets: Arc<dyn ImageAssetsRepo>,
    pub batches: Arc<dyn BatchesRepo>,
    pub jobs: Arc<dyn JobsRepo>,
    pub fix_log: Arc<dyn FixesRepo>,
    pub audit: Arc<dyn AuditRepo>,
    pub queue: Arc<JobQueue>,
    pub credits: Arc<CreditService>,
    pub fixes: Arc<FixService>,
    pub summaries: Arc<SummaryService>,
    pub cache: CacheState,
    pub db: PostgresRepositories,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/api/v1/connections/{id}/scan", post(handlers::start_scan))
        .route("/api/v1/connections/{id}/assets", get(handlers::list_assets))
        .route(
            "/api/v1/connections/{id}/summary",
            get(handlers::connection_summary),
        )
        .route("/api/v1/connections/{id}/fixes", get(handlers::list_fixes))
        .route(
            "/api/v1/connections/{id}/optimize",
            post(handlers::start_optimize),
        )
        .route(
            "/api/v1/connections/{id}/fixes/apply",
            post(handlers::apply_fixes),
        )
        .route("/api/v1/fixes/{id}/rollback", post(handlers::rollback_fix))
        .route("/api/v1/jobs/{id}", get(handlers::job_status))
        .route("/api/v1/jobs/{id}/cancel", post(handlers::cancel_job))
        .route("/api/v1/batches/{id}", get(handlers::batch_status))
        .route("/api/v1/batches/{id}/cancel", post(handlers::cancel_batch))
        .route("/api/v1/users/{id}/credits", get(handlers::credit_balance))
        .route(
            "/api/v1/users/{id}/credits/consume",
            post(handlers::consume_credit),
        )
        .route("/api/v1/audit", get(handlers::list_audit))
        .with_state(state)
}

/// Serve until the shutdown token fires.
pub async fn serve(
    addr: std::net::SocketAddr,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), InfraError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http listener bound");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(InfraError::Io)
}
