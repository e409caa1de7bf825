use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ConnectionsRepo, RepoError},
    domain::entities::{ConnectionRecord, SitePageRecord},
    domain::types::Platform,
};

use super::{PostgresRepositories, map_sqlx_error, parse_enum};

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: Uuid,
    user_id: Uuid,
    platform: String,
    domain: String,
    api_credential: String,
    webhook_secret: Option<String>,
    webhook_url: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ConnectionRow> for ConnectionRecord {
    type Error = RepoError;

    fn try_from(row: ConnectionRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            platform: parse_enum::<Platform>(&row.platform, "connections.platform")?,
            domain: row.domain,
            api_credential: row.api_credential,
            webhook_secret: row.webhook_secret,
            webhook_url: row.webhook_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SitePageRow {
    id: Uuid,
    connection_id: Uuid,
    url: String,
    last_crawl_ok: bool,
    last_crawled_at: Option<OffsetDateTime>,
}

impl From<SitePageRow> for SitePageRecord {
    fn from(row: SitePageRow) -> Self {
        Self {
            id: row.id,
            connection_id: row.connection_id,
            url: row.url,
            last_crawl_ok: row.last_crawl_ok,
            last_crawled_at: row.last_crawled_at,
        }
    }
}

#[async_trait]
impl ConnectionsRepo for PostgresRepositories {
    async fn find_connection(&self, id: Uuid) -> Result<Option<ConnectionRecord>, RepoError> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            "SELECT id, user_id, platform, domain, api_credential, webhook_secret, webhook_url, \
             created_at, updated_at FROM connections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ConnectionRecord::try_from).transpose()
    }

    async fn list_crawled_pages(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<SitePageRecord>, RepoError> {
        let rows = sqlx::query_as::<_, SitePageRow>(
            "SELECT id, connection_id, url, last_crawl_ok, last_crawled_at \
             FROM site_pages WHERE connection_id = $1 AND last_crawl_ok ORDER BY url",
        )
        .bind(connection_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SitePageRecord::from).collect())
    }
}
