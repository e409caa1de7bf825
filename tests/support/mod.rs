//! In-memory doubles for the persistence and outbound seams.
//!
//! The fakes mirror the conditional-update guards of the Postgres layer
//! (monotonic job progress, terminal-row immutability, FIFO lot drains,
//! one live batch per connection) so the services exercise the same
//! contract in both worlds.

#![allow(dead_code)] // each test binary uses a subset of the helpers

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use sitemend::application::fixes::{CmsError, CmsGateway};
use sitemend::application::optimizer::{VisionClient, VisionError, VisionRequest, VisionSuggestion};
use sitemend::application::repos::{
    AccountsRepo, AssetQueryFilter, AuditRepo, BatchesRepo, ConnectionsRepo, CreditsRepo,
    FixesRepo, ImageAssetsRepo, JobsRepo, NewFixParams, NewJobParams, RepoError,
    StoreSuggestionParams, UpsertImageAssetParams,
};
use sitemend::application::scanner::{FetchError, PageFetcher};
use sitemend::application::webhooks::WebhookNotifier;
use sitemend::cache::{CacheConfig, CacheState};
use sitemend::domain::entities::{
    AuditLogRecord, BatchRecord, ConnectionRecord, CreditPurchaseRecord, FixRecord,
    ImageAssetRecord, JobRecord, SitePageRecord,
};
use sitemend::domain::types::{
    AssetStatus, FixStatus, JobState, Platform, PlanTier, PurchaseStatus,
};

pub fn cache() -> CacheState {
    CacheState::build(CacheConfig::default())
}

pub fn notifier() -> Arc<WebhookNotifier> {
    Arc::new(WebhookNotifier::new(std::time::Duration::from_secs(1)).expect("client builds"))
}

pub fn suggestion(alt: &str, confidence: i16) -> VisionSuggestion {
    VisionSuggestion {
        alt_text: alt.to_string(),
        description: format!("description of {alt}"),
        confidence,
        tags: vec!["test".into()],
        is_product_image: false,
    }
}

#[derive(Default)]
struct State {
    connections: Vec<ConnectionRecord>,
    pages: Vec<SitePageRecord>,
    plans: HashMap<Uuid, PlanTier>,
    assets: Vec<ImageAssetRecord>,
    batches: Vec<BatchRecord>,
    /// Cumulative (processed, optimized, failed) snapshots per batch, in
    /// the order `record_batch_progress` received them.
    progress_log: HashMap<Uuid, Vec<(i32, i32, i32)>>,
    jobs: Vec<JobRecord>,
    fixes: Vec<FixRecord>,
    usage: HashMap<(Uuid, String), i32>,
    purchases: Vec<CreditPurchaseRecord>,
    audit: Vec<AuditLogRecord>,
}

/// One fake standing in for every repository trait, like the Postgres
/// wrapper does in production.
#[derive(Default)]
pub struct InMemoryRepos {
    inner: Mutex<State>,
}

impl InMemoryRepos {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_connection(&self, user_id: Uuid) -> ConnectionRecord {
        let now = OffsetDateTime::now_utc();
        let record = ConnectionRecord {
            id: Uuid::new_v4(),
            user_id,
            platform: Platform::Shopify,
            domain: "shop.example.com".into(),
            api_credential: "token".into(),
            webhook_secret: None,
            webhook_url: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().unwrap().connections.push(record.clone());
        record
    }

    pub fn add_page(&self, connection_id: Uuid, url: &str, crawl_ok: bool) {
        let page = SitePageRecord {
            id: Uuid::new_v4(),
            connection_id,
            url: url.into(),
            last_crawl_ok: crawl_ok,
            last_crawled_at: Some(OffsetDateTime::now_utc()),
        };
        self.inner.lock().unwrap().pages.push(page);
    }

    pub fn set_plan(&self, user_id: Uuid, plan: PlanTier) {
        self.inner.lock().unwrap().plans.insert(user_id, plan);
    }

    pub fn set_monthly_used(&self, user_id: Uuid, period: &str, used: i32) {
        self.inner
            .lock()
            .unwrap()
            .usage
            .insert((user_id, period.to_string()), used);
    }

    pub fn add_purchase(
        &self,
        user_id: Uuid,
        remaining: i32,
        created_at: OffsetDateTime,
        expires_at: Option<OffsetDateTime>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let amount = remaining.max(10);
        self.inner.lock().unwrap().purchases.push(CreditPurchaseRecord {
            id,
            user_id,
            credits_amount: amount,
            credits_used: amount - remaining,
            credits_remaining: remaining,
            price_per_credit_cents: 10,
            total_price_cents: amount * 10,
            status: PurchaseStatus::Active,
            expires_at,
            created_at,
        });
        id
    }

    pub fn add_asset(&self, connection_id: Uuid, url: &str) -> AssetBuilder<'_> {
        AssetBuilder {
            repos: self,
            record: blank_asset(connection_id, url),
        }
    }

    pub fn add_fix(&self, record: FixRecord) {
        self.inner.lock().unwrap().fixes.push(record);
    }

    pub fn asset(&self, id: Uuid) -> ImageAssetRecord {
        self.inner
            .lock()
            .unwrap()
            .assets
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .expect("asset exists")
    }

    pub fn assets_for(&self, connection_id: Uuid) -> Vec<ImageAssetRecord> {
        let mut assets: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .assets
            .iter()
            .filter(|a| a.connection_id == connection_id)
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.url.cmp(&b.url));
        assets
    }

    pub fn batch(&self, id: Uuid) -> BatchRecord {
        self.inner
            .lock()
            .unwrap()
            .batches
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .expect("batch exists")
    }

    pub fn job(&self, id: Uuid) -> JobRecord {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .expect("job exists")
    }

    pub fn fix(&self, id: Uuid) -> FixRecord {
        self.inner
            .lock()
            .unwrap()
            .fixes
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .expect("fix exists")
    }

    pub fn fixes_for(&self, connection_id: Uuid) -> Vec<FixRecord> {
        self.inner
            .lock()
            .unwrap()
            .fixes
            .iter()
            .filter(|f| f.connection_id == connection_id)
            .cloned()
            .collect()
    }

    pub fn progress_snapshots(&self, batch_id: Uuid) -> Vec<(i32, i32, i32)> {
        self.inner
            .lock()
            .unwrap()
            .progress_log
            .get(&batch_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn monthly_used_now(&self, user_id: Uuid, period: &str) -> i32 {
        *self
            .inner
            .lock()
            .unwrap()
            .usage
            .get(&(user_id, period.to_string()))
            .unwrap_or(&0)
    }

    pub fn purchase(&self, id: Uuid) -> CreditPurchaseRecord {
        self.inner
            .lock()
            .unwrap()
            .purchases
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .expect("purchase exists")
    }

    pub fn audit_entries(&self) -> Vec<AuditLogRecord> {
        self.inner.lock().unwrap().audit.clone()
    }
}

fn blank_asset(connection_id: Uuid, url: &str) -> ImageAssetRecord {
    let now = OffsetDateTime::now_utc();
    ImageAssetRecord {
        id: Uuid::new_v4(),
        connection_id,
        url: url.into(),
        page_url: "https://shop.example.com/".into(),
        alt_text: None,
        has_alt_text: false,
        suggested_alt_text: None,
        ai_description: None,
        ai_confidence: None,
        ai_tags: vec![],
        is_product_image: false,
        is_decorative: false,
        has_lazy_loading: false,
        width: None,
        height: None,
        format: Some("jpg".into()),
        status: AssetStatus::NeedsAltText,
        platform_media_id: Some("gid://shopify/MediaImage/1".into()),
        last_scanned_at: now,
        created_at: now,
        updated_at: now,
    }
}

/// Builder so tests only spell out the fields they care about.
pub struct AssetBuilder<'a> {
    repos: &'a InMemoryRepos,
    record: ImageAssetRecord,
}

impl AssetBuilder<'_> {
    pub fn alt_text(mut self, alt: &str) -> Self {
        self.record.alt_text = Some(alt.into());
        self.record.has_alt_text = true;
        self.record.status = AssetStatus::Detected;
        self
    }

    pub fn decorative(mut self) -> Self {
        self.record.is_decorative = true;
        self.record.status = AssetStatus::Detected;
        self
    }

    pub fn status(mut self, status: AssetStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn suggestion(mut self, alt: &str, confidence: i16) -> Self {
        self.record.suggested_alt_text = Some(alt.into());
        self.record.ai_description = Some(format!("description of {alt}"));
        self.record.ai_confidence = Some(confidence);
        self
    }

    /// Freshly scanned assets carry no platform media id yet.
    pub fn unsynced(mut self) -> Self {
        self.record.platform_media_id = None;
        self
    }

    pub fn build(self) -> ImageAssetRecord {
        self.repos
            .inner
            .lock()
            .unwrap()
            .assets
            .push(self.record.clone());
        self.record
    }
}

#[async_trait]
impl ConnectionsRepo for InMemoryRepos {
    async fn find_connection(&self, id: Uuid) -> Result<Option<ConnectionRecord>, RepoError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .connections
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_crawled_pages(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<SitePageRecord>, RepoError> {
        let mut pages: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .pages
            .iter()
            .filter(|p| p.connection_id == connection_id && p.last_crawl_ok)
            .cloned()
            .collect();
        pages.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(pages)
    }
}

#[async_trait]
impl AccountsRepo for InMemoryRepos {
    async fn plan_for(&self, user_id: Uuid) -> Result<Option<PlanTier>, RepoError> {
        Ok(self.inner.lock().unwrap().plans.get(&user_id).copied())
    }
}

#[async_trait]
impl ImageAssetsRepo for InMemoryRepos {
    async fn upsert_asset(
        &self,
        params: UpsertImageAssetParams,
    ) -> Result<ImageAssetRecord, RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(existing) = state
            .assets
            .iter_mut()
            .find(|a| a.connection_id == params.connection_id && a.url == params.url)
        {
            existing.page_url = params.page_url;
            existing.alt_text = params.alt_text.clone();
            existing.has_alt_text = params.alt_text.is_some();
            existing.is_decorative = params.is_decorative;
            existing.has_lazy_loading = params.has_lazy_loading;
            existing.width = params.width.or(existing.width);
            existing.height = params.height.or(existing.height);
            existing.format = params.format.or(existing.format.take());
            if existing.status.may_promote_to(params.status) {
                existing.status = params.status;
            }
            existing.last_scanned_at = params.scanned_at;
            existing.updated_at = params.scanned_at;
            return Ok(existing.clone());
        }

        let record = ImageAssetRecord {
            id: Uuid::new_v4(),
            connection_id: params.connection_id,
            url: params.url,
            page_url: params.page_url,
            has_alt_text: params.alt_text.is_some(),
            alt_text: params.alt_text,
            suggested_alt_text: None,
            ai_description: None,
            ai_confidence: None,
            ai_tags: vec![],
            is_product_image: false,
            is_decorative: params.is_decorative,
            has_lazy_loading: params.has_lazy_loading,
            width: params.width,
            height: params.height,
            format: params.format,
            status: params.status,
            platform_media_id: None,
            last_scanned_at: params.scanned_at,
            created_at: params.scanned_at,
            updated_at: params.scanned_at,
        };
        state.assets.push(record.clone());
        Ok(record)
    }

    async fn find_asset(&self, id: Uuid) -> Result<Option<ImageAssetRecord>, RepoError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assets
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn list_assets(
        &self,
        connection_id: Uuid,
        filter: &AssetQueryFilter,
    ) -> Result<Vec<ImageAssetRecord>, RepoError> {
        let mut assets: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .assets
            .iter()
            .filter(|a| a.connection_id == connection_id)
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| !filter.missing_alt_only || (!a.has_alt_text && !a.is_decorative))
            .cloned()
            .collect();
        assets.sort_by(|a, b| (&a.page_url, &a.url).cmp(&(&b.page_url, &b.url)));
        if let Some(limit) = filter.limit {
            assets.truncate(limit as usize);
        }
        Ok(assets)
    }

    async fn list_assets_by_ids(
        &self,
        connection_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ImageAssetRecord>, RepoError> {
        let mut assets: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .assets
            .iter()
            .filter(|a| a.connection_id == connection_id && ids.contains(&a.id))
            .cloned()
            .collect();
        assets.sort_by(|a, b| (&a.page_url, &a.url).cmp(&(&b.page_url, &b.url)));
        Ok(assets)
    }

    async fn store_suggestion(&self, params: StoreSuggestionParams) -> Result<(), RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(asset) = state.assets.iter_mut().find(|a| a.id == params.asset_id) {
            asset.suggested_alt_text = Some(params.suggested_alt_text);
            asset.ai_description = Some(params.ai_description);
            asset.ai_confidence = Some(params.ai_confidence);
            asset.ai_tags = params.ai_tags;
            asset.is_product_image = params.is_product_image;
            if !asset.status.is_terminal() {
                asset.status = AssetStatus::Analyzing;
            }
            asset.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn mark_optimized(&self, asset_id: Uuid, alt_text: &str) -> Result<(), RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(asset) = state.assets.iter_mut().find(|a| a.id == asset_id) {
            asset.alt_text = Some(alt_text.into());
            asset.has_alt_text = true;
            asset.status = AssetStatus::Optimized;
            asset.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn restore_alt_text(
        &self,
        asset_id: Uuid,
        alt_text: Option<&str>,
    ) -> Result<(), RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(asset) = state.assets.iter_mut().find(|a| a.id == asset_id) {
            asset.alt_text = alt_text.map(Into::into);
            asset.has_alt_text = alt_text.is_some();
            asset.status = if alt_text.is_none() && !asset.is_decorative {
                AssetStatus::NeedsAltText
            } else {
                AssetStatus::Detected
            };
            asset.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn set_platform_media_id(
        &self,
        asset_id: Uuid,
        media_id: &str,
    ) -> Result<(), RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(asset) = state.assets.iter_mut().find(|a| a.id == asset_id) {
            asset.platform_media_id = Some(media_id.into());
            asset.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}

#[async_trait]
impl BatchesRepo for InMemoryRepos {
    async fn create_batch(&self, connection_id: Uuid) -> Result<BatchRecord, RepoError> {
        let mut state = self.inner.lock().unwrap();
        let live_exists = state.batches.iter().any(|b| {
            b.connection_id == connection_id
                && matches!(b.status, JobState::Pending | JobState::Running)
        });
        if live_exists {
            return Err(RepoError::Duplicate {
                constraint: "uq_optimization_batches_live".into(),
            });
        }

        let now = OffsetDateTime::now_utc();
        let record = BatchRecord {
            id: Uuid::new_v4(),
            connection_id,
            status: JobState::Pending,
            total_images: 0,
            processed_images: 0,
            optimized_images: 0,
            failed_images: 0,
            bytes_saved: 0,
            error: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        state.batches.push(record.clone());
        Ok(record)
    }

    async fn find_batch(&self, id: Uuid) -> Result<Option<BatchRecord>, RepoError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .batches
            .iter()
            .find(|b| b.id == id)
            .cloned())
    }

    async fn set_batch_total(&self, id: Uuid, total: i32) -> Result<(), RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(batch) = state.batches.iter_mut().find(|b| b.id == id)
            && !batch.status.is_terminal()
        {
            batch.total_images = total;
            batch.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn record_batch_progress(
        &self,
        id: Uuid,
        processed: i32,
        optimized: i32,
        failed: i32,
    ) -> Result<(), RepoError> {
        let mut state = self.inner.lock().unwrap();
        let Some(batch) = state.batches.iter_mut().find(|b| b.id == id) else {
            return Ok(());
        };
        if batch.status.is_terminal() {
            return Ok(());
        }
        batch.status = JobState::Running;
        batch.processed_images = processed;
        batch.optimized_images = optimized;
        batch.failed_images = failed;
        batch.updated_at = OffsetDateTime::now_utc();
        state
            .progress_log
            .entry(id)
            .or_default()
            .push((processed, optimized, failed));
        Ok(())
    }

    async fn finish_batch(
        &self,
        id: Uuid,
        status: JobState,
        error: Option<&str>,
    ) -> Result<(), RepoError> {
        if !status.is_terminal() {
            return Err(RepoError::invalid_input("finish_batch needs a terminal status"));
        }
        let mut state = self.inner.lock().unwrap();
        if let Some(batch) = state.batches.iter_mut().find(|b| b.id == id)
            && !batch.status.is_terminal()
        {
            batch.status = status;
            batch.error = error.map(Into::into);
            batch.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn cancel_batch(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(batch) = state.batches.iter_mut().find(|b| b.id == id)
            && !batch.status.is_terminal()
        {
            batch.status = JobState::Cancelled;
            batch.cancelled_at = Some(at);
            batch.updated_at = at;
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl JobsRepo for InMemoryRepos {
    async fn create_job(&self, params: NewJobParams) -> Result<JobRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = JobRecord {
            id: Uuid::new_v4(),
            job_type: params.job_type,
            payload: params.payload,
            batch_id: params.batch_id,
            status: JobState::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
        };
        self.inner.lock().unwrap().jobs.push(record.clone());
        Ok(record)
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<JobRecord>, RepoError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned())
    }

    async fn claim_next_pending(&self) -> Result<Option<JobRecord>, RepoError> {
        let mut state = self.inner.lock().unwrap();
        // insertion order stands in for created_at ordering
        let Some(job) = state
            .jobs
            .iter_mut()
            .find(|j| j.status == JobState::Pending)
        else {
            return Ok(None);
        };
        job.status = JobState::Running;
        job.started_at = Some(OffsetDateTime::now_utc());
        Ok(Some(job.clone()))
    }

    async fn update_progress(&self, id: Uuid, progress: i16) -> Result<(), RepoError> {
        if !(0..=100).contains(&progress) {
            return Err(RepoError::invalid_input("progress outside 0..=100"));
        }
        let mut state = self.inner.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id)
            && job.status == JobState::Running
            && job.progress <= progress
        {
            job.progress = progress;
        }
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, result: serde_json::Value) -> Result<(), RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id)
            && job.status == JobState::Running
        {
            job.status = JobState::Completed;
            job.progress = 100;
            job.result = Some(result);
            job.completed_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id)
            && matches!(job.status, JobState::Pending | JobState::Running)
        {
            job.status = JobState::Failed;
            job.error = Some(error.into());
            job.failed_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn cancel_job(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id)
            && matches!(job.status, JobState::Pending | JobState::Running)
        {
            job.status = JobState::Cancelled;
            return Ok(true);
        }
        Ok(false)
    }

    async fn cancel_jobs_for_batch(&self, batch_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let mut state = self.inner.lock().unwrap();
        let mut swept = Vec::new();
        for job in state
            .jobs
            .iter_mut()
            .filter(|j| j.batch_id == Some(batch_id))
        {
            if matches!(job.status, JobState::Pending | JobState::Running) {
                job.status = JobState::Cancelled;
                swept.push(job.id);
            }
        }
        Ok(swept)
    }
}

#[async_trait]
impl FixesRepo for InMemoryRepos {
    async fn insert_fix(&self, params: NewFixParams) -> Result<FixRecord, RepoError> {
        let record = FixRecord {
            id: Uuid::new_v4(),
            connection_id: params.connection_id,
            asset_id: params.asset_id,
            fix_type: params.fix_type,
            description: params.description,
            before_state: params.before_state,
            after_state: params.after_state,
            target_url: params.target_url,
            method: params.method,
            status: params.status,
            applied_at: params.applied_at,
            rollback_deadline: params.rollback_deadline,
            rolled_back_at: None,
        };
        self.inner.lock().unwrap().fixes.push(record.clone());
        Ok(record)
    }

    async fn find_fix(&self, id: Uuid) -> Result<Option<FixRecord>, RepoError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .fixes
            .iter()
            .find(|f| f.id == id)
            .cloned())
    }

    async fn list_fixes(&self, connection_id: Uuid) -> Result<Vec<FixRecord>, RepoError> {
        let mut fixes: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .fixes
            .iter()
            .filter(|f| f.connection_id == connection_id)
            .cloned()
            .collect();
        fixes.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(fixes)
    }

    async fn mark_rolled_back(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(fix) = state.fixes.iter_mut().find(|f| f.id == id)
            && fix.status == FixStatus::Applied
        {
            fix.status = FixStatus::RolledBack;
            fix.rolled_back_at = Some(at);
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl CreditsRepo for InMemoryRepos {
    async fn monthly_used(&self, user_id: Uuid, period: &str) -> Result<u32, RepoError> {
        Ok(self.monthly_used_now(user_id, period).max(0) as u32)
    }

    async fn try_increment_monthly(
        &self,
        user_id: Uuid,
        period: &str,
        quota: u32,
    ) -> Result<bool, RepoError> {
        if quota == 0 {
            return Ok(false);
        }
        let mut state = self.inner.lock().unwrap();
        let used = state
            .usage
            .entry((user_id, period.to_string()))
            .or_insert(0);
        if (*used as u32) < quota {
            *used += 1;
            return Ok(true);
        }
        Ok(false)
    }

    async fn try_consume_purchased(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepoError> {
        let mut state = self.inner.lock().unwrap();
        let Some(lot) = state
            .purchases
            .iter_mut()
            .filter(|lot| lot.user_id == user_id && lot.is_usable(now))
            .min_by_key(|lot| lot.created_at)
        else {
            return Ok(None);
        };
        lot.credits_used += 1;
        lot.credits_remaining -= 1;
        if lot.credits_remaining == 0 {
            lot.status = PurchaseStatus::Exhausted;
        }
        Ok(Some(lot.id))
    }

    async fn list_purchases(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CreditPurchaseRecord>, RepoError> {
        let mut purchases: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .purchases
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        purchases.sort_by_key(|p| p.created_at);
        Ok(purchases)
    }
}

#[async_trait]
impl AuditRepo for InMemoryRepos {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError> {
        self.inner.lock().unwrap().audit.push(record);
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
        let mut entries = self.inner.lock().unwrap().audit.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

/// Page fetcher backed by a fixed url -> response table.
#[derive(Default)]
pub struct StaticPageFetcher {
    pages: Mutex<HashMap<String, Result<String, u16>>>,
}

impl StaticPageFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.into(), Ok(html.into()));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.pages.lock().unwrap().insert(url.into(), Err(status));
    }
}

#[async_trait]
impl PageFetcher for StaticPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        match self.pages.lock().unwrap().get(url) {
            Some(Ok(html)) => Ok(html.clone()),
            Some(Err(status)) => Err(FetchError::Status(*status)),
            None => Err(FetchError::Request(format!("no fixture for {url}"))),
        }
    }
}

/// Vision client answering from a per-url script, recording every call
/// and the instant it arrived.
pub struct ScriptedVisionClient {
    default: VisionSuggestion,
    failures: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, tokio::time::Instant)>>,
    /// When set, every call parks this long before answering.
    pub delay: Option<std::time::Duration>,
}

impl ScriptedVisionClient {
    pub fn new(default: VisionSuggestion) -> Arc<Self> {
        Arc::new(Self {
            default,
            failures: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    pub fn hanging(default: VisionSuggestion, delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            default,
            failures: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn fail_for(&self, image_url: &str) {
        self.failures.lock().unwrap().push(image_url.into());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_instants(&self) -> Vec<tokio::time::Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl VisionClient for ScriptedVisionClient {
    async fn suggest(&self, request: &VisionRequest) -> Result<VisionSuggestion, VisionError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.image_url.clone(), tokio::time::Instant::now()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures
            .lock()
            .unwrap()
            .contains(&request.image_url)
        {
            return Err(VisionError::Status(502));
        }
        Ok(self.default.clone())
    }
}

/// CMS double recording writes; individual assets can be set to fail.
/// Media lookups answer from a url -> media id table, like the platform's
/// media library would.
#[derive(Default)]
pub struct RecordingCms {
    writes: Mutex<Vec<(Uuid, Option<String>)>>,
    failures: Mutex<Vec<Uuid>>,
    media: Mutex<HashMap<String, String>>,
}

impl RecordingCms {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, asset_id: Uuid) {
        self.failures.lock().unwrap().push(asset_id);
    }

    /// Make a media object findable by the asset url.
    pub fn publish_media(&self, url: &str, media_id: &str) {
        self.media
            .lock()
            .unwrap()
            .insert(url.into(), media_id.into());
    }

    pub fn writes(&self) -> Vec<(Uuid, Option<String>)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CmsGateway for RecordingCms {
    async fn write_alt_text(
        &self,
        _connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
        alt_text: Option<&str>,
    ) -> Result<(), CmsError> {
        if asset.platform_media_id.is_none() {
            return Err(CmsError::MediaNotFound(asset.url.clone()));
        }
        if self.failures.lock().unwrap().contains(&asset.id) {
            return Err(CmsError::Status(500));
        }
        self.writes
            .lock()
            .unwrap()
            .push((asset.id, alt_text.map(Into::into)));
        Ok(())
    }

    async fn resolve_media_id(
        &self,
        _connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
    ) -> Result<Option<String>, CmsError> {
        Ok(self.media.lock().unwrap().get(&asset.url).cloned())
    }
}

