//! Fix application and rollback.
//!
//! Applying a fix pushes the suggested alt text to the external CMS, then
//! records an auditable fix row with typed before/after snapshots and a
//! rollback deadline exactly 90 days after application. Per-item failures
//! are isolated; one bad asset never aborts the run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{
    AuditRepo, ConnectionsRepo, FixesRepo, ImageAssetsRepo, NewFixParams,
};
use crate::application::webhooks::{WebhookEvent, WebhookNotifier};
use crate::cache::CacheState;
use crate::domain::entities::{ConnectionRecord, ImageAssetRecord};
use crate::domain::types::{FixMethod, FixStatus};

/// How long an applied fix stays revertible.
pub const ROLLBACK_WINDOW: Duration = Duration::days(90);

pub const FIX_TYPE_ALT_TEXT: &str = "alt_text";

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("cms request failed: {0}")]
    Request(String),
    #[error("cms returned status {0}")]
    Status(u16),
    #[error("media not resolvable on platform: {0}")]
    MediaNotFound(String),
}

/// Outbound seam to the connection's platform. The implementation routes
/// on `connection.platform`.
#[async_trait]
pub trait CmsGateway: Send + Sync {
    /// Write (or clear, with `None`) the alt text of the asset's media
    /// object on the external platform.
    async fn write_alt_text(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
        alt_text: Option<&str>,
    ) -> Result<(), CmsError>;

    /// Look up the platform's id for the asset's media object, usually by
    /// filename. `Ok(None)` means the platform knows no such media.
    async fn resolve_media_id(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
    ) -> Result<Option<String>, CmsError>;
}

/// The persisted shape of a fix's before/after state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AltTextSnapshot {
    pub alt_text: Option<String>,
}

impl AltTextSnapshot {
    fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixApplyOutcome {
    pub applied: u32,
    pub failed: u32,
    pub fix_ids: Vec<Uuid>,
}

pub struct FixService {
    connections: Arc<dyn ConnectionsRepo>,
    assets: Arc<dyn ImageAssetsRepo>,
    fixes: Arc<dyn FixesRepo>,
    audit: Arc<dyn AuditRepo>,
    cms: Arc<dyn CmsGateway>,
    notifier: Arc<WebhookNotifier>,
    cache: CacheState,
}

impl FixService {
    pub fn new(
        connections: Arc<dyn ConnectionsRepo>,
        assets: Arc<dyn ImageAssetsRepo>,
        fixes: Arc<dyn FixesRepo>,
        audit: Arc<dyn AuditRepo>,
        cms: Arc<dyn CmsGateway>,
        notifier: Arc<WebhookNotifier>,
        cache: CacheState,
    ) -> Self {
        Self {
            connections,
            assets,
            fixes,
            audit,
            cms,
            notifier,
            cache,
        }
    }

    /// Apply the stored suggestion of each asset to the external platform
    /// on behalf of `user_id`, who is recorded as the audit actor.
    pub async fn apply_alt_text_fixes(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        asset_ids: &[Uuid],
    ) -> Result<FixApplyOutcome, AppError> {
        let connection = self
            .connections
            .find_connection(connection_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let assets = self.assets.list_assets_by_ids(connection_id, asset_ids).await?;

        let mut outcome = FixApplyOutcome::default();
        for asset in &assets {
            match self.apply_one(&connection, asset).await {
                Ok(Some(fix_id)) => {
                    outcome.applied += 1;
                    outcome.fix_ids.push(fix_id);
                }
                Ok(None) => outcome.failed += 1,
                Err(err) => return Err(err),
            }
        }
        // Requested ids that resolved to no asset count as failures too.
        outcome.failed += (asset_ids.len() - assets.len()) as u32;

        self.append_audit(
            user_id,
            "fix.apply",
            connection_id,
            format!(
                "alt text fixes: {} applied, {} failed",
                outcome.applied, outcome.failed
            ),
        )
        .await;
        self.cache.trigger.fixes_applied(connection_id).await;
        self.notifier
            .notify(
                &connection,
                &WebhookEvent::FixApplied {
                    connection_id,
                    applied: outcome.applied,
                    failed: outcome.failed,
                },
            )
            .await;
        metrics::counter!("sitemend_fixes_applied_total").increment(u64::from(outcome.applied));
        info!(
            %connection_id,
            applied = outcome.applied,
            failed = outcome.failed,
            "fix run finished"
        );
        Ok(outcome)
    }

    /// One asset: CMS write, then the fix row. Returns the fix id on
    /// success, `None` when the item failed (reason logged). Storage errors
    /// still propagate; they indicate the run itself is broken.
    async fn apply_one(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
    ) -> Result<Option<Uuid>, AppError> {
        let Some(suggestion) = asset.suggested_alt_text.clone() else {
            warn!(asset_id = %asset.id, "fix skipped: no stored suggestion");
            return Ok(None);
        };
        let asset = self.with_media_id(connection, asset).await?;
        let asset = &asset;

        let applied_at = OffsetDateTime::now_utc();
        let before = AltTextSnapshot {
            alt_text: asset.alt_text.clone(),
        };
        let after = AltTextSnapshot {
            alt_text: Some(suggestion.clone()),
        };
        let params = |status: FixStatus| NewFixParams {
            connection_id: connection.id,
            asset_id: asset.id,
            fix_type: FIX_TYPE_ALT_TEXT.into(),
            description: format!("alt text set to \"{suggestion}\""),
            before_state: before.to_value(),
            after_state: after.to_value(),
            target_url: asset.url.clone(),
            method: FixMethod::Automatic,
            status,
            applied_at,
            rollback_deadline: applied_at + ROLLBACK_WINDOW,
        };

        match self
            .cms
            .write_alt_text(connection, asset, Some(&suggestion))
            .await
        {
            Ok(()) => {
                let fix = self.fixes.insert_fix(params(FixStatus::Applied)).await?;
                self.assets.mark_optimized(asset.id, &suggestion).await?;
                Ok(Some(fix.id))
            }
            Err(err) => {
                warn!(asset_id = %asset.id, error = %err, "cms write failed");
                self.fixes.insert_fix(params(FixStatus::Failed)).await?;
                Ok(None)
            }
        }
    }

    /// Assets discovered by the scanner carry no platform media id; resolve
    /// and persist it on first use. An unresolvable asset goes through
    /// unchanged and fails at the write with [`CmsError::MediaNotFound`],
    /// keeping per-item isolation.
    async fn with_media_id(
        &self,
        connection: &ConnectionRecord,
        asset: &ImageAssetRecord,
    ) -> Result<ImageAssetRecord, AppError> {
        let mut asset = asset.clone();
        if asset.platform_media_id.is_none() {
            match self.cms.resolve_media_id(connection, &asset).await {
                Ok(Some(media_id)) => {
                    self.assets
                        .set_platform_media_id(asset.id, &media_id)
                        .await?;
                    info!(asset_id = %asset.id, media_id, "platform media id resolved");
                    asset.platform_media_id = Some(media_id);
                }
                Ok(None) => {
                    warn!(asset_id = %asset.id, url = %asset.url, "no platform media matches asset");
                }
                Err(err) => {
                    warn!(asset_id = %asset.id, error = %err, "media id lookup failed");
                }
            }
        }
        Ok(asset)
    }

    /// Revert one applied fix, restoring the platform and the asset to the
    /// before snapshot. Refused after the rollback deadline.
    pub async fn rollback_fix(&self, fix_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        let fix = self.fixes.find_fix(fix_id).await?.ok_or(AppError::NotFound)?;
        if fix.status != FixStatus::Applied {
            return Err(AppError::NotRevertible);
        }
        let now = OffsetDateTime::now_utc();
        if now > fix.rollback_deadline {
            return Err(AppError::RollbackExpired);
        }

        let connection = self
            .connections
            .find_connection(fix.connection_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let asset = self
            .assets
            .find_asset(fix.asset_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let before: AltTextSnapshot = serde_json::from_value(fix.before_state.clone())
            .map_err(|e| AppError::unexpected(format!("corrupt before snapshot: {e}")))?;

        self.cms
            .write_alt_text(&connection, &asset, before.alt_text.as_deref())
            .await
            .map_err(|e| AppError::unexpected(format!("cms rollback write failed: {e}")))?;

        if !self.fixes.mark_rolled_back(fix_id, now).await? {
            return Err(AppError::NotRevertible);
        }
        self.assets
            .restore_alt_text(fix.asset_id, before.alt_text.as_deref())
            .await?;

        self.append_audit(
            user_id,
            "fix.rollback",
            fix.connection_id,
            format!("fix {fix_id} rolled back"),
        )
        .await;
        self.cache
            .trigger
            .fix_rolled_back(fix.connection_id, fix.asset_id)
            .await;
        metrics::counter!("sitemend_fixes_rolled_back_total").increment(1);
        info!(%fix_id, connection_id = %fix.connection_id, "fix rolled back");
        Ok(())
    }

    async fn append_audit(&self, actor: Uuid, action: &str, connection_id: Uuid, detail: String) {
        let record = crate::domain::entities::AuditLogRecord {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            action: action.into(),
            entity_type: "connection".into(),
            entity_id: Some(connection_id.to_string()),
            payload_text: Some(detail),
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.audit.append_log(record).await {
            warn!(error = %err, "audit append failed");
        }
    }
}
