//! AI suggestion batches.
//!
//! Processes eligible assets in fixed-size concurrent groups with pacing
//! between groups. Each unit spends one credit before it talks to the
//! vision endpoint; assets that already carry a high-confidence suggestion
//! are skipped without spending anything.

pub mod vision;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::credits::CreditService;
use crate::application::error::AppError;
use crate::application::repos::{BatchesRepo, ImageAssetsRepo, StoreSuggestionParams};
use crate::cache::CacheState;
use crate::domain::entities::ImageAssetRecord;
use crate::domain::types::AssetStatus;

pub use vision::{VisionClient, VisionError, VisionRequest, VisionSuggestion};

/// Suggestions at or below this confidence are regenerated; above it the
/// stored suggestion is considered good and the asset is skipped.
pub const CONFIDENCE_SKIP_THRESHOLD: i16 = 80;

#[derive(Debug, Clone)]
pub struct OptimizerLimits {
    /// Units dispatched concurrently within one group.
    pub max_concurrent: usize,
    /// Pause between groups, for provider rate limits.
    pub pacing: Duration,
    /// Hard ceiling on a single vision call.
    pub unit_timeout: Duration,
}

impl Default for OptimizerLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            pacing: Duration::from_millis(500),
            unit_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters for one optimization run; serialized into the job result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeOutcome {
    pub requested: u32,
    pub eligible: u32,
    pub skipped: u32,
    pub processed: u32,
    pub optimized: u32,
    pub failed: u32,
    pub insufficient_credits: bool,
    pub cancelled: bool,
}

enum UnitOutcome {
    Suggested,
    Failed,
    Denied,
}

pub struct SuggestionService {
    assets: Arc<dyn ImageAssetsRepo>,
    batches: Arc<dyn BatchesRepo>,
    credits: Arc<CreditService>,
    vision: Arc<dyn VisionClient>,
    cache: CacheState,
    limits: OptimizerLimits,
}

impl SuggestionService {
    pub fn new(
        assets: Arc<dyn ImageAssetsRepo>,
        batches: Arc<dyn BatchesRepo>,
        credits: Arc<CreditService>,
        vision: Arc<dyn VisionClient>,
        cache: CacheState,
        limits: OptimizerLimits,
    ) -> Self {
        Self {
            assets,
            batches,
            credits,
            vision,
            cache,
            limits,
        }
    }

    /// True when the asset should receive a (new) suggestion. Decorative
    /// images and assets already optimized or carrying a high-confidence
    /// suggestion are skipped.
    fn is_eligible(asset: &ImageAssetRecord) -> bool {
        if asset.is_decorative || asset.status == AssetStatus::Optimized {
            return false;
        }
        !asset
            .ai_confidence
            .is_some_and(|c| c > CONFIDENCE_SKIP_THRESHOLD)
    }

    /// Generate suggestions for the given assets on behalf of `user_id`.
    ///
    /// Dispatch stops at the first group in which the credit ledger ran dry;
    /// cancellation is honored between groups.
    pub async fn generate_suggestions(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        batch_id: Uuid,
        asset_ids: &[Uuid],
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(i16) + Send,
    ) -> Result<OptimizeOutcome, AppError> {
        let assets = self.assets.list_assets_by_ids(connection_id, asset_ids).await?;
        let (eligible, skipped): (Vec<_>, Vec<_>) =
            assets.into_iter().partition(Self::is_eligible);

        let mut outcome = OptimizeOutcome {
            requested: asset_ids.len() as u32,
            eligible: eligible.len() as u32,
            skipped: skipped.len() as u32,
            ..Default::default()
        };

        self.batches
            .set_batch_total(batch_id, eligible.len() as i32)
            .await?;
        info!(
            %connection_id,
            %batch_id,
            eligible = eligible.len(),
            skipped = skipped.len(),
            "suggestion batch started"
        );

        let total = eligible.len().max(1);
        let mut first_group = true;

        for group in eligible.chunks(self.limits.max_concurrent.max(1)) {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                info!(%batch_id, "suggestion batch cancelled");
                break;
            }
            if !first_group {
                tokio::time::sleep(self.limits.pacing).await;
            }
            first_group = false;

            let units = group
                .iter()
                .map(|asset| self.process_one(user_id, asset));
            for unit in join_all(units).await {
                outcome.processed += 1;
                match unit {
                    UnitOutcome::Suggested => outcome.optimized += 1,
                    UnitOutcome::Failed => outcome.failed += 1,
                    UnitOutcome::Denied => {
                        outcome.failed += 1;
                        outcome.insufficient_credits = true;
                    }
                }
            }

            self.batches
                .record_batch_progress(
                    batch_id,
                    outcome.processed as i32,
                    outcome.optimized as i32,
                    outcome.failed as i32,
                )
                .await?;
            self.cache.trigger.batch_updated(batch_id, connection_id).await;
            on_progress(((outcome.processed as usize * 100) / total) as i16);

            if outcome.insufficient_credits {
                info!(%batch_id, "suggestion batch stopped: insufficient credits");
                break;
            }
        }

        metrics::counter!("sitemend_suggestions_generated_total")
            .increment(u64::from(outcome.optimized));
        info!(
            %batch_id,
            processed = outcome.processed,
            optimized = outcome.optimized,
            failed = outcome.failed,
            "suggestion batch finished"
        );
        Ok(outcome)
    }

    /// One unit: spend a credit, call the model, persist the suggestion.
    /// Failures are isolated here and reported as counters.
    async fn process_one(&self, user_id: Uuid, asset: &ImageAssetRecord) -> UnitOutcome {
        match self.credits.consume(user_id).await {
            Ok(source) => {
                debug!(asset_id = %asset.id, ?source, "credit reserved for suggestion");
            }
            Err(AppError::InsufficientCredits) => return UnitOutcome::Denied,
            Err(err) => {
                warn!(asset_id = %asset.id, error = %err, "credit consumption errored");
                return UnitOutcome::Failed;
            }
        }

        let request = VisionRequest {
            image_url: asset.url.clone(),
            page_url: asset.page_url.clone(),
            format: asset.format.clone(),
        };
        let suggestion =
            match tokio::time::timeout(self.limits.unit_timeout, self.vision.suggest(&request))
                .await
            {
                Ok(Ok(suggestion)) => suggestion,
                Ok(Err(err)) => {
                    warn!(asset_id = %asset.id, error = %err, "vision call failed");
                    return UnitOutcome::Failed;
                }
                Err(_) => {
                    warn!(asset_id = %asset.id, "vision call timed out");
                    return UnitOutcome::Failed;
                }
            };

        let stored = self
            .assets
            .store_suggestion(StoreSuggestionParams {
                asset_id: asset.id,
                suggested_alt_text: suggestion.alt_text,
                ai_description: suggestion.description,
                ai_confidence: suggestion.confidence,
                ai_tags: suggestion.tags,
                is_product_image: suggestion.is_product_image,
            })
            .await;
        match stored {
            Ok(()) => {
                self.cache
                    .trigger
                    .suggestion_stored(asset.connection_id, asset.id)
                    .await;
                UnitOutcome::Suggested
            }
            Err(err) => {
                warn!(asset_id = %asset.id, error = %err, "storing suggestion failed");
                UnitOutcome::Failed
            }
        }
    }
}
