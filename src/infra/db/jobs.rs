use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{JobsRepo, NewJobParams, RepoError},
    domain::entities::JobRecord,
    domain::types::{JobState, JobType},
};

use super::{PostgresRepositories, map_sqlx_error, parse_enum};

const JOB_COLUMNS: &str = "id, job_type, payload, batch_id, status, progress, result, error, \
    created_at, started_at, completed_at, failed_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    payload: serde_json::Value,
    batch_id: Option<Uuid>,
    status: String,
    progress: i16,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: OffsetDateTime,
    started_at: Option<OffsetDateTime>,
    completed_at: Option<OffsetDateTime>,
    failed_at: Option<OffsetDateTime>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = RepoError;

    fn try_from(row: JobRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.id,
            job_type: parse_enum::<JobType>(&row.job_type, "jobs.job_type")?,
            payload: row.payload,
            batch_id: row.batch_id,
            status: parse_enum::<JobState>(&row.status, "jobs.status")?,
            progress: row.progress,
            result: row.result,
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            failed_at: row.failed_at,
        })
    }
}

#[async_trait]
impl JobsRepo for PostgresRepositories {
    async fn create_job(&self, params: NewJobParams) -> Result<JobRecord, RepoError> {
        let sql = format!(
            "INSERT INTO jobs (id, job_type, payload, batch_id, status, progress, created_at) \
             VALUES ($1, $2, $3, $4, 'pending', 0, $5) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.job_type.as_str())
            .bind(&params.payload)
            .bind(params.batch_id)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<JobRecord>, RepoError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn claim_next_pending(&self) -> Result<Option<JobRecord>, RepoError> {
        // SKIP LOCKED keeps concurrent runners from double-claiming.
        let sql = format!(
            "UPDATE jobs SET status = 'running', started_at = $1 \
             WHERE id = ( \
                 SELECT id FROM jobs WHERE status = 'pending' \
                 ORDER BY created_at LIMIT 1 \
                 FOR UPDATE SKIP LOCKED) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn update_progress(&self, id: Uuid, progress: i16) -> Result<(), RepoError> {
        if !(0..=100).contains(&progress) {
            return Err(RepoError::invalid_input("progress must be within 0..=100"));
        }

        // Late lower values lose; terminal rows are untouched.
        sqlx::query(
            "UPDATE jobs SET progress = $2 \
             WHERE id = $1 AND status = 'running' AND progress <= $2",
        )
        .bind(id)
        .bind(progress)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn complete_job(&self, id: Uuid, result: serde_json::Value) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', progress = 100, result = $2, completed_at = $3 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(&result)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', error = $2, failed_at = $3 \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(error)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn cancel_job(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled' \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_jobs_for_batch(&self, batch_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE jobs SET status = 'cancelled' \
             WHERE batch_id = $1 AND status IN ('pending', 'running') \
             RETURNING id",
        )
        .bind(batch_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids)
    }
}
