use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{BatchesRepo, RepoError},
    domain::entities::BatchRecord,
    domain::types::JobState,
};

use super::{PostgresRepositories, map_sqlx_error, parse_enum};

const BATCH_COLUMNS: &str = "id, connection_id, status, total_images, processed_images, \
    optimized_images, failed_images, bytes_saved, error, cancelled_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: Uuid,
    connection_id: Uuid,
    status: String,
    total_images: i32,
    processed_images: i32,
    optimized_images: i32,
    failed_images: i32,
    bytes_saved: i64,
    error: Option<String>,
    cancelled_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<BatchRow> for BatchRecord {
    type Error = RepoError;

    fn try_from(row: BatchRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.id,
            connection_id: row.connection_id,
            status: parse_enum::<JobState>(&row.status, "optimization_batches.status")?,
            total_images: row.total_images,
            processed_images: row.processed_images,
            optimized_images: row.optimized_images,
            failed_images: row.failed_images,
            bytes_saved: row.bytes_saved,
            error: row.error,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BatchesRepo for PostgresRepositories {
    async fn create_batch(&self, connection_id: Uuid) -> Result<BatchRecord, RepoError> {
        // The partial unique index on live batches turns a second concurrent
        // create into RepoError::Duplicate.
        let sql = format!(
            "INSERT INTO optimization_batches \
                 (id, connection_id, status, total_images, processed_images, optimized_images, \
                  failed_images, bytes_saved, created_at, updated_at) \
             VALUES ($1, $2, 'pending', 0, 0, 0, 0, 0, $3, $3) \
             RETURNING {BATCH_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(connection_id)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn find_batch(&self, id: Uuid) -> Result<Option<BatchRecord>, RepoError> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM optimization_batches WHERE id = $1");
        let row = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(BatchRecord::try_from).transpose()
    }

    async fn set_batch_total(&self, id: Uuid, total: i32) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE optimization_batches SET total_images = $2, updated_at = $3 \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(total)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn record_batch_progress(
        &self,
        id: Uuid,
        processed: i32,
        optimized: i32,
        failed: i32,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE optimization_batches SET \
                 status = 'running', \
                 processed_images = $2, \
                 optimized_images = $3, \
                 failed_images = $4, \
                 updated_at = $5 \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(processed)
        .bind(optimized)
        .bind(failed)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn finish_batch(
        &self,
        id: Uuid,
        status: JobState,
        error: Option<&str>,
    ) -> Result<(), RepoError> {
        if !status.is_terminal() {
            return Err(RepoError::invalid_input(
                "finish_batch requires a terminal status",
            ));
        }

        sqlx::query(
            "UPDATE optimization_batches SET status = $2, error = $3, updated_at = $4 \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn cancel_batch(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE optimization_batches SET status = 'cancelled', cancelled_at = $2, updated_at = $2 \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
