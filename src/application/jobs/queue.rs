//! Job enqueueing and cancellation.
//!
//! Optimization work is correlated to its batch by a direct foreign key on
//! the job row; cancelling a batch sweeps its live jobs through that key
//! and fires their cancellation tokens.

use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::jobs::payload::JobPayload;
use crate::application::repos::{BatchesRepo, JobsRepo, NewJobParams, RepoError};
use crate::cache::CacheState;
use crate::domain::entities::{BatchRecord, JobRecord};

/// Live cancellation tokens, one per in-flight or pending job.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: DashMap<Uuid, CancellationToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for the job, created on first use.
    pub fn token(&self, job_id: Uuid) -> CancellationToken {
        self.tokens
            .entry(job_id)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    pub fn cancel(&self, job_id: Uuid) {
        if let Some(token) = self.tokens.get(&job_id) {
            token.cancel();
        }
    }

    pub fn remove(&self, job_id: Uuid) {
        self.tokens.remove(&job_id);
    }
}

pub struct JobQueue {
    jobs: Arc<dyn JobsRepo>,
    batches: Arc<dyn BatchesRepo>,
    cancels: Arc<CancelRegistry>,
    cache: CacheState,
}

impl JobQueue {
    pub fn new(
        jobs: Arc<dyn JobsRepo>,
        batches: Arc<dyn BatchesRepo>,
        cancels: Arc<CancelRegistry>,
        cache: CacheState,
    ) -> Self {
        Self {
            jobs,
            batches,
            cancels,
            cache,
        }
    }

    pub async fn enqueue_scan(&self, connection_id: Uuid) -> Result<JobRecord, AppError> {
        let payload = JobPayload::ScanImages { connection_id };
        let job = self
            .jobs
            .create_job(NewJobParams {
                job_type: payload.job_type(),
                payload: payload.encode()?,
                batch_id: None,
            })
            .await?;
        info!(job_id = %job.id, %connection_id, "scan job enqueued");
        Ok(job)
    }

    /// Create the batch row first, then the job pointing at it. A second
    /// live batch on the same connection is refused.
    pub async fn enqueue_optimize(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        asset_ids: Vec<Uuid>,
    ) -> Result<(BatchRecord, JobRecord), AppError> {
        if asset_ids.is_empty() {
            return Err(AppError::validation("no assets selected"));
        }

        let batch = match self.batches.create_batch(connection_id).await {
            Ok(batch) => batch,
            Err(RepoError::Duplicate { .. }) => return Err(AppError::BatchAlreadyActive),
            Err(err) => return Err(err.into()),
        };

        let payload = JobPayload::OptimizeImages {
            connection_id,
            user_id,
            batch_id: batch.id,
            asset_ids,
        };
        let job = self
            .jobs
            .create_job(NewJobParams {
                job_type: payload.job_type(),
                payload: payload.encode()?,
                batch_id: Some(batch.id),
            })
            .await?;

        self.cache.trigger.batch_updated(batch.id, connection_id).await;
        info!(job_id = %job.id, batch_id = %batch.id, %connection_id, "optimize job enqueued");
        Ok((batch, job))
    }

    /// Cancel one job: terminal state in storage first, then the token so a
    /// running handler stops at its next checkpoint.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<bool, AppError> {
        let cancelled = self.jobs.cancel_job(job_id).await?;
        if cancelled {
            self.cancels.cancel(job_id);
            self.cache.trigger.job_updated(job_id).await;
            info!(%job_id, "job cancelled");
        }
        Ok(cancelled)
    }

    /// Cancel a batch and every live job correlated to it.
    pub async fn cancel_batch(&self, batch_id: Uuid) -> Result<bool, AppError> {
        let now = OffsetDateTime::now_utc();
        let cancelled = self.batches.cancel_batch(batch_id, now).await?;
        if !cancelled {
            return Ok(false);
        }

        let swept = self.jobs.cancel_jobs_for_batch(batch_id).await?;
        for job_id in &swept {
            self.cancels.cancel(*job_id);
            self.cache.trigger.job_updated(*job_id).await;
        }

        if let Some(batch) = self.batches.find_batch(batch_id).await? {
            self.cache
                .trigger
                .batch_updated(batch_id, batch.connection_id)
                .await;
        }
        info!(%batch_id, jobs_swept = swept.len(), "batch cancelled");
        Ok(true)
    }
}
