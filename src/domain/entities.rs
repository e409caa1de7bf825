//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{
    AssetStatus, BatchStatus, FixMethod, FixStatus, JobState, JobType, Platform, PurchaseStatus,
};

/// A registered external site under SEO management.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: Platform,
    pub domain: String,
    /// Opaque credential for the platform adapter (access token or
    /// application password). Never serialized into API responses.
    #[serde(skip_serializing)]
    pub api_credential: String,
    pub webhook_secret: Option<String>,
    pub webhook_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A page of a connection known from crawling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitePageRecord {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub url: String,
    pub last_crawl_ok: bool,
    pub last_crawled_at: Option<OffsetDateTime>,
}

/// One image found on a connection's pages, unique per (connection_id, url).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAssetRecord {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub url: String,
    pub page_url: String,
    pub alt_text: Option<String>,
    pub has_alt_text: bool,
    pub suggested_alt_text: Option<String>,
    pub ai_description: Option<String>,
    pub ai_confidence: Option<i16>,
    pub ai_tags: Vec<String>,
    pub is_product_image: bool,
    pub is_decorative: bool,
    pub has_lazy_loading: bool,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub format: Option<String>,
    pub status: AssetStatus,
    pub platform_media_id: Option<String>,
    pub last_scanned_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// An AI-processing run over a set of assets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRecord {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub status: BatchStatus,
    pub total_images: i32,
    pub processed_images: i32,
    pub optimized_images: i32,
    pub failed_images: i32,
    pub bytes_saved: i64,
    pub error: Option<String>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A persisted unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    /// Direct foreign key to the correlated batch, when one exists.
    pub batch_id: Option<Uuid>,
    pub status: JobState,
    pub progress: i16,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
}

/// A single applied (or attempted) mutation to an external CMS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixRecord {
    pub id: Uuid,
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
    pub rolled_back_at: Option<OffsetDateTime>,
}

/// A purchased lot of AI credits, FIFO-consumed by creation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditPurchaseRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credits_amount: i32,
    pub credits_used: i32,
    pub credits_remaining: i32,
    pub price_per_credit_cents: i32,
    pub total_price_cents: i32,
    pub status: PurchaseStatus,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl CreditPurchaseRecord {
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        self.status == PurchaseStatus::Active
            && self.credits_remaining > 0
            && self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// One row per (user, calendar-month period) of metered usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub user_id: Uuid,
    /// Calendar month key, `YYYY-MM`.
    pub period: String,
    pub credits_used: i32,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload_text: Option<String>,
    pub created_at: OffsetDateTime,
}
