//! Site scanning.
//!
//! Visits every successfully crawled page of a connection, extracts image
//! references, and upserts them as assets. Individual page failures are
//! counted and skipped; they never abort the scan.

pub mod extract;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{ConnectionsRepo, ImageAssetsRepo, UpsertImageAssetParams};
use crate::cache::CacheState;
use crate::domain::types::AssetStatus;

pub use extract::{ExtractedImage, extract_images};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Outbound HTTP fetcher used in production.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitemend/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))
    }
}

/// Counters produced by one scan run; serialized into the job result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub pages_scanned: u32,
    pub pages_failed: u32,
    pub images_found: u32,
    pub images_missing_alt: u32,
    pub cancelled: bool,
}

pub struct ScanService {
    connections: Arc<dyn ConnectionsRepo>,
    assets: Arc<dyn ImageAssetsRepo>,
    fetcher: Arc<dyn PageFetcher>,
    cache: CacheState,
}

impl ScanService {
    pub fn new(
        connections: Arc<dyn ConnectionsRepo>,
        assets: Arc<dyn ImageAssetsRepo>,
        fetcher: Arc<dyn PageFetcher>,
        cache: CacheState,
    ) -> Self {
        Self {
            connections,
            assets,
            fetcher,
            cache,
        }
    }

    /// Scan every crawled page of the connection. `on_progress` receives a
    /// 0..=100 percentage after each page; cancellation is honored between
    /// pages, never mid-upsert.
    pub async fn scan_connection(
        &self,
        connection_id: Uuid,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(i16) + Send,
    ) -> Result<ScanOutcome, AppError> {
        let connection = self
            .connections
            .find_connection(connection_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let pages = self.connections.list_crawled_pages(connection_id).await?;
        info!(
            %connection_id,
            domain = %connection.domain,
            pages = pages.len(),
            "scan started"
        );

        let mut outcome = ScanOutcome::default();
        let total = pages.len().max(1);

        for (index, page) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                info!(%connection_id, "scan cancelled");
                break;
            }

            match self.scan_page(connection_id, &page.url).await {
                Ok((found, missing)) => {
                    outcome.pages_scanned += 1;
                    outcome.images_found += found;
                    outcome.images_missing_alt += missing;
                }
                Err(err) => {
                    outcome.pages_failed += 1;
                    warn!(%connection_id, page = %page.url, error = %err, "page scan failed");
                }
            }

            let progress = (((index + 1) * 100) / total) as i16;
            on_progress(progress);
        }

        self.cache.trigger.assets_scanned(connection_id).await;
        metrics::counter!("sitemend_pages_scanned_total")
            .increment(u64::from(outcome.pages_scanned));
        metrics::counter!("sitemend_images_found_total").increment(u64::from(outcome.images_found));
        info!(
            %connection_id,
            pages_scanned = outcome.pages_scanned,
            pages_failed = outcome.pages_failed,
            images_found = outcome.images_found,
            "scan finished"
        );

        Ok(outcome)
    }

    /// Fetch and process one page; returns (images found, images missing alt).
    async fn scan_page(&self, connection_id: Uuid, page_url: &str) -> Result<(u32, u32), AppError> {
        let parsed =
            Url::parse(page_url).map_err(|e| AppError::validation(format!("bad page url: {e}")))?;
        let html = self
            .fetcher
            .fetch_page(page_url)
            .await
            .map_err(|e| AppError::unexpected(e.to_string()))?;
        let images =
            extract_images(&parsed, &html).map_err(|e| AppError::unexpected(e.to_string()))?;

        let scanned_at = OffsetDateTime::now_utc();
        let mut missing = 0u32;
        for image in &images {
            let status = classify(image);
            if status == AssetStatus::NeedsAltText {
                missing += 1;
            }
            self.assets
                .upsert_asset(UpsertImageAssetParams {
                    connection_id,
                    url: image.url.clone(),
                    page_url: page_url.to_string(),
                    alt_text: image.alt_text.clone(),
                    is_decorative: image.is_decorative,
                    has_lazy_loading: image.has_lazy_loading,
                    width: image.width,
                    height: image.height,
                    format: image.format.clone(),
                    status,
                    scanned_at,
                })
                .await?;
        }

        debug!(page = %page_url, images = images.len(), "page scanned");
        Ok((images.len() as u32, missing))
    }
}

/// Initial status for a freshly observed image. Decorative images never
/// need alt text, so they stay `Detected`.
pub fn classify(image: &ExtractedImage) -> AssetStatus {
    if !image.is_decorative && image.alt_text.is_none() {
        AssetStatus::NeedsAltText
    } else {
        AssetStatus::Detected
    }
}
