use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{FixesRepo, NewFixParams, RepoError},
    domain::entities::FixRecord,
    domain::types::{FixMethod, FixStatus},
};

use super::{PostgresRepositories, map_sqlx_error, parse_enum};

const FIX_COLUMNS: &str = "id, connection_id, asset_id, fix_type, description, before_state, \
    after_state, target_url, method, status, applied_at, rollback_deadline, rolled_back_at";

#[derive(sqlx::FromRow)]
struct FixRow {
    id: Uuid,
    connection_id: Uuid,
    asset_id: Uuid,
    fix_type: String,
    description: String,
    before_state: serde_json::Value,
    after_state: serde_json::Value,
    target_url: String,
    method: String,
    status: String,
    applied_at: OffsetDateTime,
    rollback_deadline: OffsetDateTime,
    rolled_back_at: Option<OffsetDateTime>,
}

impl TryFrom<FixRow> for FixRecord {
    type Error = RepoError;

    fn try_from(row: FixRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.id,
            connection_id: row.connection_id,
            asset_id: row.asset_id,
            fix_type: row.fix_type,
            description: row.description,
            before_state: row.before_state,
            after_state: row.after_state,
            target_url: row.target_url,
            method: parse_enum::<FixMethod>(&row.method, "fixes.method")?,
            status: parse_enum::<FixStatus>(&row.status, "fixes.status")?,
            applied_at: row.applied_at,
            rollback_deadline: row.rollback_deadline,
            rolled_back_at: row.rolled_back_at,
        })
    }
}

#[async_trait]
impl FixesRepo for PostgresRepositories {
    async fn insert_fix(&self, params: NewFixParams) -> Result<FixRecord, RepoError> {
        let sql = format!(
            "INSERT INTO fixes (id, connection_id, asset_id, fix_type, description, \
                 before_state, after_state, target_url, method, status, applied_at, \
                 rollback_deadline) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {FIX_COLUMNS}"
        );
        let row = sqlx::query_as::<_, FixRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.connection_id)
            .bind(params.asset_id)
            .bind(&params.fix_type)
            .bind(&params.description)
            .bind(&params.before_state)
            .bind(&params.after_state)
            .bind(&params.target_url)
            .bind(params.method.as_str())
            .bind(params.status.as_str())
            .bind(params.applied_at)
            .bind(params.rollback_deadline)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn find_fix(&self, id: Uuid) -> Result<Option<FixRecord>, RepoError> {
        let sql = format!("SELECT {FIX_COLUMNS} FROM fixes WHERE id = $1");
        let row = sqlx::query_as::<_, FixRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(FixRecord::try_from).transpose()
    }

    async fn list_fixes(&self, connection_id: Uuid) -> Result<Vec<FixRecord>, RepoError> {
        let sql = format!(
            "SELECT {FIX_COLUMNS} FROM fixes WHERE connection_id = $1 ORDER BY applied_at DESC"
        );
        let rows = sqlx::query_as::<_, FixRow>(&sql)
            .bind(connection_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(FixRecord::try_from).collect()
    }

    async fn mark_rolled_back(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE fixes SET status = 'rolled_back', rolled_back_at = $2 \
             WHERE id = $1 AND status = 'applied'",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
