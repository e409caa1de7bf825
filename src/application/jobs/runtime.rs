//! Job execution loop.
//!
//! A single runner polls for pending jobs, claims them one at a time, and
//! dispatches on the decoded payload. Terminal rows are immutable at the
//! storage layer, so a completion racing a cancellation resolves to
//! whichever transition landed first.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::jobs::JobContext;
use crate::application::jobs::payload::JobPayload;
use crate::application::webhooks::WebhookEvent;
use crate::domain::entities::JobRecord;
use crate::domain::types::JobState;

pub struct JobRunner {
    ctx: Arc<JobContext>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(ctx: Arc<JobContext>, poll_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            poll_interval,
            shutdown,
        }
    }

    /// Poll until shutdown. Drains all pending work before sleeping again.
    pub async fn run(self) {
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "job runner started");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
            while !self.shutdown.is_cancelled() {
                match self.tick().await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(err) => {
                        error!(error = %err, "job claim failed");
                        break;
                    }
                }
            }
        }
        info!("job runner stopped");
    }

    /// Claim and execute at most one job. Returns whether one was found.
    pub async fn tick(&self) -> Result<bool, AppError> {
        let Some(job) = self.ctx.jobs.claim_next_pending().await? else {
            return Ok(false);
        };
        self.ctx.cache.trigger.job_updated(job.id).await;
        self.execute(job).await;
        Ok(true)
    }

    async fn execute(&self, job: JobRecord) {
        let job_id = job.id;
        let token = self.ctx.cancels.token(job_id);
        metrics::counter!("sitemend_jobs_claimed_total").increment(1);
        info!(%job_id, job_type = job.job_type.as_str(), "job started");

        let outcome = match JobPayload::decode(job.job_type, &job.payload) {
            Ok(JobPayload::ScanImages { connection_id }) => {
                self.run_scan(job_id, connection_id, &token).await
            }
            Ok(JobPayload::OptimizeImages {
                connection_id,
                user_id,
                batch_id,
                asset_ids,
            }) => {
                self.run_optimize(job_id, connection_id, user_id, batch_id, &asset_ids, &token)
                    .await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(result) => {
                // No-op when a cancellation already made the row terminal.
                if let Err(err) = self.ctx.jobs.complete_job(job_id, result).await {
                    error!(%job_id, error = %err, "recording job completion failed");
                }
                info!(%job_id, "job finished");
            }
            Err(err) => {
                warn!(%job_id, error = %err, "job failed");
                metrics::counter!("sitemend_jobs_failed_total").increment(1);
                if let Err(err) = self.ctx.jobs.fail_job(job_id, &err.to_string()).await {
                    error!(%job_id, error = %err, "recording job failure failed");
                }
            }
        }

        self.ctx.cancels.remove(job_id);
        self.ctx.cache.trigger.job_updated(job_id).await;
    }

    /// Progress sink for handlers: each update is written fire-and-forget;
    /// the monotonic guard in storage discards late lower values.
    fn progress_sink(&self, job_id: Uuid) -> impl FnMut(i16) + Send + use<> {
        let jobs = Arc::clone(&self.ctx.jobs);
        let cache = self.ctx.cache.clone();
        move |progress: i16| {
            let jobs = Arc::clone(&jobs);
            let cache = cache.clone();
            tokio::spawn(async move {
                if let Err(err) = jobs.update_progress(job_id, progress).await {
                    warn!(%job_id, error = %err, "progress update failed");
                }
                cache.trigger.job_updated(job_id).await;
            });
        }
    }

    async fn run_scan(
        &self,
        job_id: Uuid,
        connection_id: Uuid,
        token: &CancellationToken,
    ) -> Result<serde_json::Value, AppError> {
        let outcome = self
            .ctx
            .scanner
            .scan_connection(connection_id, token, self.progress_sink(job_id))
            .await?;

        if !outcome.cancelled
            && let Some(connection) = self.ctx.connections.find_connection(connection_id).await?
        {
            self.ctx
                .notifier
                .notify(
                    &connection,
                    &WebhookEvent::ScanCompleted {
                        connection_id,
                        pages_scanned: outcome.pages_scanned,
                        images_found: outcome.images_found,
                        images_missing_alt: outcome.images_missing_alt,
                    },
                )
                .await;
        }

        serde_json::to_value(&outcome).map_err(|e| AppError::unexpected(e.to_string()))
    }

    async fn run_optimize(
        &self,
        job_id: Uuid,
        connection_id: Uuid,
        user_id: Uuid,
        batch_id: Uuid,
        asset_ids: &[Uuid],
        token: &CancellationToken,
    ) -> Result<serde_json::Value, AppError> {
        let outcome = self
            .ctx
            .optimizer
            .generate_suggestions(
                connection_id,
                user_id,
                batch_id,
                asset_ids,
                token,
                self.progress_sink(job_id),
            )
            .await?;

        if outcome.cancelled {
            // No-op when the batch canceller already closed the row.
            self.ctx
                .batches
                .cancel_batch(batch_id, OffsetDateTime::now_utc())
                .await?;
        } else {
            let note = outcome
                .insufficient_credits
                .then_some("INSUFFICIENT_CREDITS");
            self.ctx
                .batches
                .finish_batch(batch_id, JobState::Completed, note)
                .await?;

            if let Some(connection) = self.ctx.connections.find_connection(connection_id).await? {
                self.ctx
                    .notifier
                    .notify(
                        &connection,
                        &WebhookEvent::BatchCompleted {
                            connection_id,
                            batch_id,
                            processed: outcome.processed,
                            optimized: outcome.optimized,
                            failed: outcome.failed,
                        },
                    )
                    .await;
            }
        }
        self.ctx.cache.trigger.batch_updated(batch_id, connection_id).await;

        serde_json::to_value(&outcome).map_err(|e| AppError::unexpected(e.to_string()))
    }
}
