use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        AssetQueryFilter, ImageAssetsRepo, RepoError, StoreSuggestionParams,
        UpsertImageAssetParams,
    },
    domain::entities::ImageAssetRecord,
    domain::types::AssetStatus,
};

use super::{PostgresRepositories, map_sqlx_error, parse_enum};

const ASSET_COLUMNS: &str = "id, connection_id, url, page_url, alt_text, has_alt_text, \
    suggested_alt_text, ai_description, ai_confidence, ai_tags, is_product_image, \
    is_decorative, has_lazy_loading, width, height, format, status, platform_media_id, \
    last_scanned_at, created_at, updated_at";

/// SQL expression of the one-way status ladder, matching
/// [`AssetStatus::rank`]. Terminal statuses never move.
const STATUS_PROMOTION: &str = "CASE \
    WHEN image_assets.status IN ('optimized', 'cancelled') THEN image_assets.status \
    WHEN array_position( \
        ARRAY['detected','needs_alt_text','needs_optimization','analyzing','optimized','cancelled'], \
        excluded.status) \
      > array_position( \
        ARRAY['detected','needs_alt_text','needs_optimization','analyzing','optimized','cancelled'], \
        image_assets.status) THEN excluded.status \
    ELSE image_assets.status END";

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: Uuid,
    connection_id: Uuid,
    url: String,
    page_url: String,
    alt_text: Option<String>,
    has_alt_text: bool,
    suggested_alt_text: Option<String>,
    ai_description: Option<String>,
    ai_confidence: Option<i16>,
    ai_tags: Vec<String>,
    is_product_image: bool,
    is_decorative: bool,
    has_lazy_loading: bool,
    width: Option<i32>,
    height: Option<i32>,
    format: Option<String>,
    status: String,
    platform_media_id: Option<String>,
    last_scanned_at: OffsetDateTime,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<AssetRow> for ImageAssetRecord {
    type Error = RepoError;

    fn try_from(row: AssetRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.id,
            connection_id: row.connection_id,
            url: row.url,
            page_url: row.page_url,
            alt_text: row.alt_text,
            has_alt_text: row.has_alt_text,
            suggested_alt_text: row.suggested_alt_text,
            ai_description: row.ai_description,
            ai_confidence: row.ai_confidence,
            ai_tags: row.ai_tags,
            is_product_image: row.is_product_image,
            is_decorative: row.is_decorative,
            has_lazy_loading: row.has_lazy_loading,
            width: row.width,
            height: row.height,
            format: row.format,
            status: parse_enum::<AssetStatus>(&row.status, "image_assets.status")?,
            platform_media_id: row.platform_media_id,
            last_scanned_at: row.last_scanned_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ImageAssetsRepo for PostgresRepositories {
    async fn upsert_asset(
        &self,
        params: UpsertImageAssetParams,
    ) -> Result<ImageAssetRecord, RepoError> {
        let sql = format!(
            "INSERT INTO image_assets (id, connection_id, url, page_url, alt_text, has_alt_text, \
                 is_decorative, has_lazy_loading, width, height, format, status, \
                 last_scanned_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13, $13) \
             ON CONFLICT (connection_id, url) DO UPDATE SET \
                 page_url = excluded.page_url, \
                 alt_text = excluded.alt_text, \
                 has_alt_text = excluded.has_alt_text, \
                 is_decorative = excluded.is_decorative, \
                 has_lazy_loading = excluded.has_lazy_loading, \
                 width = COALESCE(excluded.width, image_assets.width), \
                 height = COALESCE(excluded.height, image_assets.height), \
                 format = COALESCE(excluded.format, image_assets.format), \
                 status = {STATUS_PROMOTION}, \
                 last_scanned_at = excluded.last_scanned_at, \
                 updated_at = excluded.updated_at \
             RETURNING {ASSET_COLUMNS}"
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.connection_id)
            .bind(&params.url)
            .bind(&params.page_url)
            .bind(&params.alt_text)
            .bind(params.alt_text.is_some())
            .bind(params.is_decorative)
            .bind(params.has_lazy_loading)
            .bind(params.width)
            .bind(params.height)
            .bind(&params.format)
            .bind(params.status.as_str())
            .bind(params.scanned_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn find_asset(&self, id: Uuid) -> Result<Option<ImageAssetRecord>, RepoError> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM image_assets WHERE id = $1");
        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(ImageAssetRecord::try_from).transpose()
    }

    async fn list_assets(
        &self,
        connection_id: Uuid,
        filter: &AssetQueryFilter,
    ) -> Result<Vec<ImageAssetRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ASSET_COLUMNS} FROM image_assets WHERE connection_id = "
        ));
        qb.push_bind(connection_id);

        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status.as_str());
        }
        if filter.missing_alt_only {
            qb.push(" AND NOT has_alt_text AND NOT is_decorative");
        }
        qb.push(" ORDER BY page_url, url");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        let rows = qb
            .build_query_as::<AssetRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(ImageAssetRecord::try_from).collect()
    }

    async fn list_assets_by_ids(
        &self,
        connection_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ImageAssetRecord>, RepoError> {
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM image_assets \
             WHERE connection_id = $1 AND id = ANY($2) ORDER BY page_url, url"
        );
        let rows = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(connection_id)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(ImageAssetRecord::try_from).collect()
    }

    async fn store_suggestion(&self, params: StoreSuggestionParams) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE image_assets SET \
                 suggested_alt_text = $2, \
                 ai_description = $3, \
                 ai_confidence = $4, \
                 ai_tags = $5, \
                 is_product_image = $6, \
                 status = CASE WHEN status IN ('optimized', 'cancelled') \
                     THEN status ELSE 'analyzing' END, \
                 updated_at = $7 \
             WHERE id = $1",
        )
        .bind(params.asset_id)
        .bind(&params.suggested_alt_text)
        .bind(&params.ai_description)
        .bind(params.ai_confidence)
        .bind(&params.ai_tags)
        .bind(params.is_product_image)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn mark_optimized(&self, asset_id: Uuid, alt_text: &str) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE image_assets SET \
                 alt_text = $2, has_alt_text = TRUE, status = 'optimized', updated_at = $3 \
             WHERE id = $1",
        )
        .bind(asset_id)
        .bind(alt_text)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn restore_alt_text(
        &self,
        asset_id: Uuid,
        alt_text: Option<&str>,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE image_assets SET \
                 alt_text = $2, \
                 has_alt_text = $2 IS NOT NULL, \
                 status = CASE WHEN $2 IS NULL AND NOT is_decorative \
                     THEN 'needs_alt_text' ELSE 'detected' END, \
                 updated_at = $3 \
             WHERE id = $1",
        )
        .bind(asset_id)
        .bind(alt_text)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn set_platform_media_id(
        &self,
        asset_id: Uuid,
        media_id: &str,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE image_assets SET platform_media_id = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(asset_id)
        .bind(media_id)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
