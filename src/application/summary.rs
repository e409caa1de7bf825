//! Per-connection aggregate view.
//!
//! The summary is the composite cache entry: it derives from both the
//! asset set and the fix history, so it is registered under both entity
//! tags and falls whenever either side mutates.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{AssetQueryFilter, FixesRepo, ImageAssetsRepo};
use crate::cache::{CacheKey, CacheState, EntityKey};
use crate::domain::entities::{FixRecord, ImageAssetRecord};
use crate::domain::types::{AssetStatus, FixStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub connection_id: Uuid,
    pub total_images: u32,
    pub images_with_alt: u32,
    pub images_missing_alt: u32,
    pub decorative_images: u32,
    pub optimized_images: u32,
    pub pending_suggestions: u32,
    pub fixes_applied: u32,
    pub fixes_rolled_back: u32,
    pub last_scanned_at: Option<OffsetDateTime>,
}

impl ConnectionSummary {
    pub fn compute(
        connection_id: Uuid,
        assets: &[ImageAssetRecord],
        fixes: &[FixRecord],
    ) -> Self {
        let mut summary = Self {
            connection_id,
            total_images: assets.len() as u32,
            images_with_alt: 0,
            images_missing_alt: 0,
            decorative_images: 0,
            optimized_images: 0,
            pending_suggestions: 0,
            fixes_applied: 0,
            fixes_rolled_back: 0,
            last_scanned_at: None,
        };

        for asset in assets {
            if asset.is_decorative {
                summary.decorative_images += 1;
            } else if asset.has_alt_text {
                summary.images_with_alt += 1;
            } else {
                summary.images_missing_alt += 1;
            }
            if asset.status == AssetStatus::Optimized {
                summary.optimized_images += 1;
            }
            if asset.suggested_alt_text.is_some() && asset.status != AssetStatus::Optimized {
                summary.pending_suggestions += 1;
            }
            summary.last_scanned_at = match summary.last_scanned_at {
                Some(at) if at >= asset.last_scanned_at => Some(at),
                _ => Some(asset.last_scanned_at),
            };
        }

        for fix in fixes {
            match fix.status {
                FixStatus::Applied => summary.fixes_applied += 1,
                FixStatus::RolledBack => summary.fixes_rolled_back += 1,
                FixStatus::Failed => {}
            }
        }

        summary
    }
}

pub struct SummaryService {
    assets: Arc<dyn ImageAssetsRepo>,
    fixes: Arc<dyn FixesRepo>,
    cache: CacheState,
}

impl SummaryService {
    pub fn new(
        assets: Arc<dyn ImageAssetsRepo>,
        fixes: Arc<dyn FixesRepo>,
        cache: CacheState,
    ) -> Self {
        Self {
            assets,
            fixes,
            cache,
        }
    }

    /// Cache-through read of the aggregate; a miss rebuilds it from the
    /// repos and registers the entry under both constituent tags.
    pub async fn summary(&self, connection_id: Uuid) -> Result<ConnectionSummary, AppError> {
        if let Some(hit) = self.cache.store.get_summary(connection_id) {
            return Ok(hit);
        }

        let assets = self
            .assets
            .list_assets(connection_id, &AssetQueryFilter::default())
            .await?;
        let fixes = self.fixes.list_fixes(connection_id).await?;
        let summary = ConnectionSummary::compute(connection_id, &assets, &fixes);

        self.cache.store.put_summary(summary.clone());
        self.cache.registry.register(
            CacheKey::ConnectionSummary(connection_id),
            HashSet::from([
                EntityKey::ConnectionAssets(connection_id),
                EntityKey::ConnectionFixes(connection_id),
            ]),
        );
        debug!(%connection_id, total = summary.total_images, "connection summary rebuilt");

        Ok(summary)
    }
}
