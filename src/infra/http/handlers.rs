use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::fixes::FixApplyOutcome;
use crate::application::repos::AssetQueryFilter;
use crate::application::summary::ConnectionSummary;
use crate::cache::{CacheKey, EntityKey, keys::hash_asset_filter};
use crate::domain::credits::CreditBalance;
use crate::domain::entities::{
    AuditLogRecord, BatchRecord, FixRecord, ImageAssetRecord, JobRecord,
};
use crate::domain::types::AssetStatus;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state
        .db
        .health_check()
        .await
        .map_err(|e| AppError::Repo(crate::application::repos::RepoError::from_persistence(e)))?;
    Ok(Json(HealthResponse { status: "ok" }))
}

pub async fn start_scan(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobRecord>), AppError> {
    let job = state.queue.enqueue_scan(connection_id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

#[derive(Debug, Deserialize)]
pub struct AssetListQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub missing_alt_only: bool,
    pub limit: Option<u32>,
}

pub async fn list_assets(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    Query(query): Query<AssetListQuery>,
) -> Result<Json<Vec<ImageAssetRecord>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            AssetStatus::try_from(raw)
                .map_err(|_| AppError::validation(format!("unknown status `{raw}`")))
        })
        .transpose()?;
    let filter = AssetQueryFilter {
        status,
        missing_alt_only: query.missing_alt_only,
        limit: query.limit,
    };

    let filter_hash = hash_asset_filter(&filter);
    if let Some(hit) = state.cache.store.get_asset_list(connection_id, filter_hash) {
        return Ok(Json(hit));
    }

    let assets = state.assets.list_assets(connection_id, &filter).await?;
    state
        .cache
        .store
        .put_asset_list(connection_id, filter_hash, assets.clone());
    state.cache.registry.register(
        CacheKey::AssetList {
            connection_id,
            filter_hash,
        },
        HashSet::from([EntityKey::ConnectionAssets(connection_id)]),
    );
    Ok(Json(assets))
}

pub async fn connection_summary(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<ConnectionSummary>, AppError> {
    let summary = state.summaries.summary(connection_id).await?;
    Ok(Json(summary))
}

pub async fn list_fixes(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<Vec<FixRecord>>, AppError> {
    let fixes = state.fix_log.list_fixes(connection_id).await?;
    Ok(Json(fixes))
}

fn default_missing_alt_only() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub user_id: Uuid,
    /// Explicit selection; when empty the connection's assets are selected
    /// by the filter fields below.
    #[serde(default)]
    pub asset_ids: Vec<Uuid>,
    #[serde(default = "default_missing_alt_only")]
    pub only_missing_alt: bool,
    pub max_images: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub batch: BatchRecord,
    pub job: JobRecord,
}

pub async fn start_optimize(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    Json(request): Json<OptimizeRequest>,
) -> Result<(StatusCode, Json<OptimizeResponse>), AppError> {
    let asset_ids = if request.asset_ids.is_empty() {
        let filter = AssetQueryFilter {
            status: None,
            missing_alt_only: request.only_missing_alt,
            limit: request.max_images,
        };
        state
            .assets
            .list_assets(connection_id, &filter)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect()
    } else {
        request.asset_ids
    };

    let (batch, job) = state
        .queue
        .enqueue_optimize(connection_id, request.user_id, asset_ids)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(OptimizeResponse { batch, job })))
}

#[derive(Debug, Deserialize)]
pub struct ApplyFixesRequest {
    pub user_id: Uuid,
    pub asset_ids: Vec<Uuid>,
}

pub async fn apply_fixes(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    Json(request): Json<ApplyFixesRequest>,
) -> Result<Json<FixApplyOutcome>, AppError> {
    if request.asset_ids.is_empty() {
        return Err(AppError::validation("no assets selected"));
    }
    let outcome = state
        .fixes
        .apply_alt_text_fixes(connection_id, request.user_id, &request.asset_ids)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RollbackResponse {
    pub status: &'static str,
}

pub async fn rollback_fix(
    State(state): State<AppState>,
    Path(fix_id): Path<Uuid>,
    Json(request): Json<RollbackRequest>,
) -> Result<Json<RollbackResponse>, AppError> {
    state.fixes.rollback_fix(fix_id, request.user_id).await?;
    Ok(Json(RollbackResponse {
        status: "rolled_back",
    }))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobRecord>, AppError> {
    if let Some(hit) = state.cache.store.get_job(job_id) {
        return Ok(Json(hit));
    }
    let job = state.jobs.find_job(job_id).await?.ok_or(AppError::NotFound)?;
    state.cache.store.put_job(job.clone());
    state.cache.registry.register(
        CacheKey::JobStatus(job_id),
        HashSet::from([EntityKey::Job(job_id)]),
    );
    Ok(Json(job))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = state.queue.cancel_job(job_id).await?;
    Ok(Json(CancelResponse { cancelled }))
}

pub async fn batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchRecord>, AppError> {
    if let Some(hit) = state.cache.store.get_batch(batch_id) {
        return Ok(Json(hit));
    }
    let batch = state
        .batches
        .find_batch(batch_id)
        .await?
        .ok_or(AppError::NotFound)?;
    state.cache.store.put_batch(batch.clone());
    state.cache.registry.register(
        CacheKey::BatchProgress(batch_id),
        HashSet::from([EntityKey::Batch(batch_id)]),
    );
    Ok(Json(batch))
}

pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = state.queue.cancel_batch(batch_id).await?;
    Ok(Json(CancelResponse { cancelled }))
}

#[derive(Debug, Serialize)]
pub struct CreditBalanceResponse {
    pub balance: CreditBalance,
    pub low_balance_warning: bool,
}

pub async fn credit_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CreditBalanceResponse>, AppError> {
    let balance = state.credits.balance(user_id).await?;
    let low_balance_warning = state.credits.should_warn(user_id).await?;
    Ok(Json(CreditBalanceResponse {
        balance,
        low_balance_warning,
    }))
}

#[derive(Debug, Serialize)]
pub struct ConsumeCreditResponse {
    pub source: crate::application::credits::CreditSource,
    pub balance: CreditBalance,
}

pub async fn consume_credit(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ConsumeCreditResponse>, AppError> {
    let source = state.credits.consume(user_id).await?;
    let balance = state.credits.balance(user_id).await?;
    Ok(Json(ConsumeCreditResponse { source, balance }))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<u32>,
}

pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogRecord>>, AppError> {
    let entries = state.audit.list_recent(query.limit.unwrap_or(50)).await?;
    Ok(Json(entries))
}
