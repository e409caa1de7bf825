//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    AuditLogRecord, BatchRecord, ConnectionRecord, CreditPurchaseRecord, FixRecord,
    ImageAssetRecord, JobRecord, SitePageRecord,
};
use crate::domain::types::{AssetStatus, FixMethod, FixStatus, JobState, JobType, PlanTier};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ConnectionsRepo: Send + Sync {
    async fn find_connection(&self, id: Uuid) -> Result<Option<ConnectionRecord>, RepoError>;

    /// Pages whose most recent crawl succeeded; the scanner only visits these.
    async fn list_crawled_pages(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<SitePageRecord>, RepoError>;
}

#[async_trait]
pub trait AccountsRepo: Send + Sync {
    async fn plan_for(&self, user_id: Uuid) -> Result<Option<PlanTier>, RepoError>;
}

/// Scan-time upsert input, keyed by `(connection_id, url)`.
#[derive(Debug, Clone)]
pub struct UpsertImageAssetParams {
    pub connection_id: Uuid,
    pub url: String,
    pub page_url: String,
    pub alt_text: Option<String>,
    pub is_decorative: bool,
    pub has_lazy_loading: bool,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub format: Option<String>,
    pub status: AssetStatus,
    pub scanned_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct StoreSuggestionParams {
    pub asset_id: Uuid,
    pub suggested_alt_text: String,
    pub ai_description: String,
    pub ai_confidence: i16,
    pub ai_tags: Vec<String>,
    pub is_product_image: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AssetQueryFilter {
    pub status: Option<AssetStatus>,
    pub missing_alt_only: bool,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait ImageAssetsRepo: Send + Sync {
    /// Insert or merge by `(connection_id, url)`. On update the status is
    /// only promoted forward; an `Optimized` asset is never demoted.
    async fn upsert_asset(
        &self,
        params: UpsertImageAssetParams,
    ) -> Result<ImageAssetRecord, RepoError>;

    async fn find_asset(&self, id: Uuid) -> Result<Option<ImageAssetRecord>, RepoError>;

    async fn list_assets(
        &self,
        connection_id: Uuid,
        filter: &AssetQueryFilter,
    ) -> Result<Vec<ImageAssetRecord>, RepoError>;

    async fn list_assets_by_ids(
        &self,
        connection_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ImageAssetRecord>, RepoError>;

    /// Persist suggestion fields and move the asset to `Analyzing`
    /// (unless it already reached a terminal status).
    async fn store_suggestion(&self, params: StoreSuggestionParams) -> Result<(), RepoError>;

    /// Record an applied alt-text write: sets `alt_text`, `has_alt_text`,
    /// and `status = Optimized`.
    async fn mark_optimized(&self, asset_id: Uuid, alt_text: &str) -> Result<(), RepoError>;

    /// Restore a previous alt text after a rollback, returning the asset to
    /// the pending pool.
    async fn restore_alt_text(
        &self,
        asset_id: Uuid,
        alt_text: Option<&str>,
    ) -> Result<(), RepoError>;

    /// Persist the platform's media id once a lookup has resolved it, so
    /// later writes address the media directly.
    async fn set_platform_media_id(
        &self,
        asset_id: Uuid,
        media_id: &str,
    ) -> Result<(), RepoError>;
}

#[async_trait]
pub trait BatchesRepo: Send + Sync {
    /// Create a pending batch. Fails with [`RepoError::Duplicate`] when the
    /// connection already has a pending or running batch.
    async fn create_batch(&self, connection_id: Uuid) -> Result<BatchRecord, RepoError>;

    async fn find_batch(&self, id: Uuid) -> Result<Option<BatchRecord>, RepoError>;

    async fn set_batch_total(&self, id: Uuid, total: i32) -> Result<(), RepoError>;

    /// Absolute counter update, only honored while the batch is live.
    async fn record_batch_progress(
        &self,
        id: Uuid,
        processed: i32,
        optimized: i32,
        failed: i32,
    ) -> Result<(), RepoError>;

    /// Transition a live batch to a terminal status; no-op if already terminal.
    async fn finish_batch(
        &self,
        id: Uuid,
        status: JobState,
        error: Option<&str>,
    ) -> Result<(), RepoError>;

    /// Returns true if the batch was live and is now cancelled.
    async fn cancel_batch(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobParams {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub batch_id: Option<Uuid>,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn create_job(&self, params: NewJobParams) -> Result<JobRecord, RepoError>;

    async fn find_job(&self, id: Uuid) -> Result<Option<JobRecord>, RepoError>;

    /// Atomically claim the oldest pending job, moving it to `Running`.
    async fn claim_next_pending(&self) -> Result<Option<JobRecord>, RepoError>;

    /// Monotonic write: honored only while the job is `Running` and the new
    /// value is not lower than the stored one.
    async fn update_progress(&self, id: Uuid, progress: i16) -> Result<(), RepoError>;

    async fn complete_job(&self, id: Uuid, result: serde_json::Value) -> Result<(), RepoError>;

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), RepoError>;

    /// Returns true if the job was pending or running and is now cancelled.
    async fn cancel_job(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Cancel every live job belonging to the batch (direct FK lookup),
    /// returning the ids that were actually transitioned.
    async fn cancel_jobs_for_batch(&self, batch_id: Uuid) -> Result<Vec<Uuid>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewFixParams {
    pub connection_id: Uuid,
    pub asset_id: Uuid,
    pub fix_type: String,
    pub description: String,
    pub before_state: serde_json::Value,
    pub after_state: serde_json::Value,
    pub target_url: String,
    pub method: FixMethod,
    pub status: FixStatus,
    pub applied_at: OffsetDateTime,
    pub rollback_deadline: OffsetDateTime,
}

#[async_trait]
pub trait FixesRepo: Send + Sync {
    async fn insert_fix(&self, params: NewFixParams) -> Result<FixRecord, RepoError>;

    async fn find_fix(&self, id: Uuid) -> Result<Option<FixRecord>, RepoError>;

    async fn list_fixes(&self, connection_id: Uuid) -> Result<Vec<FixRecord>, RepoError>;

    /// Returns true if the fix was `Applied` and is now `RolledBack`.
    async fn mark_rolled_back(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait CreditsRepo: Send + Sync {
    async fn monthly_used(&self, user_id: Uuid, period: &str) -> Result<u32, RepoError>;

    /// Single conditional increment of the month's usage row; returns false
    /// (without mutating) when the quota is already exhausted.
    async fn try_increment_monthly(
        &self,
        user_id: Uuid,
        period: &str,
        quota: u32,
    ) -> Result<bool, RepoError>;

    /// Single conditional decrement of the oldest usable purchased lot
    /// (created_at ascending, unexpired, remaining >= 1). Returns the lot id
    /// that was consumed, or None when no lot qualifies.
    async fn try_consume_purchased(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepoError>;

    async fn list_purchases(&self, user_id: Uuid)
        -> Result<Vec<CreditPurchaseRecord>, RepoError>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError>;
}
