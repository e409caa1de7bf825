use std::{process, sync::Arc};

use clap::Parser;
use sitemend::{
    application::{
        credits::CreditService,
        error::AppError,
        fixes::FixService,
        jobs::{CancelRegistry, JobContext, JobQueue, JobRunner},
        optimizer::{SuggestionService, vision::HttpVisionClient},
        scanner::{HttpPageFetcher, ScanService},
        summary::SummaryService,
        webhooks::WebhookNotifier,
    },
    cache::CacheState,
    config,
    infra::{
        cms::CmsRouter,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        report_application_error(&err);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let cli = config::CliArgs::parse();
    let settings = config::load(&cli)
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(|err| AppError::unexpected(err.to_string()))?;

    run_serve(settings).await
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .clone()
        .ok_or_else(|| AppError::unexpected("database.url is required"))?;
    let pool = PostgresRepositories::connect(&database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::unexpected(format!("database connect failed: {err}")))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::unexpected(format!("migrations failed: {err}")))?;
    let db = PostgresRepositories::new(pool);

    let cache = CacheState::build(settings.cache.clone());
    let cancels = Arc::new(CancelRegistry::new());

    let repos = Arc::new(db.clone());
    let fetcher = Arc::new(
        HttpPageFetcher::new(settings.outbound.fetch_timeout)
            .map_err(|err| AppError::unexpected(err.to_string()))?,
    );
    let notifier = Arc::new(
        WebhookNotifier::new(settings.outbound.webhook_timeout)
            .map_err(|err| AppError::unexpected(err.to_string()))?,
    );
    let vision = Arc::new(
        HttpVisionClient::new(
            settings.vision.endpoint.clone(),
            settings.vision.api_key.clone(),
            settings.vision.timeout,
        )
        .map_err(|err| AppError::unexpected(err.to_string()))?,
    );
    let cms = Arc::new(
        CmsRouter::new(settings.outbound.fetch_timeout)
            .map_err(|err| AppError::unexpected(err.to_string()))?,
    );

    let credits = Arc::new(CreditService::new(
        repos.clone(),
        repos.clone(),
        cache.clone(),
    ));
    let scanner = Arc::new(ScanService::new(
        repos.clone(),
        repos.clone(),
        fetcher,
        cache.clone(),
    ));
    let optimizer = Arc::new(SuggestionService::new(
        repos.clone(),
        repos.clone(),
        credits.clone(),
        vision,
        cache.clone(),
        settings.jobs.optimizer_limits(),
    ));
    let fixes = Arc::new(FixService::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        cms,
        notifier.clone(),
        cache.clone(),
    ));
    let summaries = Arc::new(SummaryService::new(
        repos.clone(),
        repos.clone(),
        cache.clone(),
    ));
    let queue = Arc::new(JobQueue::new(
        repos.clone(),
        repos.clone(),
        cancels.clone(),
        cache.clone(),
    ));

    let shutdown = CancellationToken::new();
    let runner_ctx = Arc::new(JobContext {
        jobs: repos.clone(),
        batches: repos.clone(),
        connections: repos.clone(),
        scanner,
        optimizer,
        notifier,
        cancels,
        cache: cache.clone(),
    });
    let runner = JobRunner::new(runner_ctx, settings.jobs.poll_interval, shutdown.clone());
    let runner_handle = tokio::spawn(runner.run());

    let state = AppState {
        assets: repos.clone(),
        batches: repos.clone(),
        jobs: repos.clone(),
        fix_log: repos.clone(),
        audit: repos.clone(),
        queue,
        credits,
        fixes,
        summaries,
        cache,
        db,
    };
    let router = http::build_router(state);

    let serve_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            serve_shutdown.cancel();
        }
    });

    let result = http::serve(settings.server.addr, router, shutdown.clone()).await;
    shutdown.cancel();

    if let Err(err) = runner_handle.await {
        error!(error = %err, "job runner task panicked");
    }

    result.map_err(|err: InfraError| AppError::unexpected(err.to_string()))
}
