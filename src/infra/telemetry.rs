use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "sitemend_cache_hit_total",
            Unit::Count,
            "Total number of read-cache hits."
        );
        describe_counter!(
            "sitemend_cache_miss_total",
            Unit::Count,
            "Total number of read-cache misses."
        );
        describe_counter!(
            "sitemend_cache_evict_total",
            Unit::Count,
            "Total number of cache evictions due to capacity."
        );
        describe_counter!(
            "sitemend_cache_invalidate_total",
            Unit::Count,
            "Total number of cache entries dropped by invalidation."
        );
        describe_histogram!(
            "sitemend_cache_consume_ms",
            Unit::Milliseconds,
            "Cache event consumption latency in milliseconds."
        );
        describe_counter!(
            "sitemend_pages_scanned_total",
            Unit::Count,
            "Total number of pages scanned for images."
        );
        describe_counter!(
            "sitemend_images_found_total",
            Unit::Count,
            "Total number of image references observed by scans."
        );
        describe_counter!(
            "sitemend_suggestions_generated_total",
            Unit::Count,
            "Total number of alt-text suggestions stored."
        );
        describe_counter!(
            "sitemend_credits_consumed_total",
            Unit::Count,
            "Total number of credits consumed from the ledger."
        );
        describe_counter!(
            "sitemend_credit_denials_total",
            Unit::Count,
            "Total number of consumptions denied for lack of credits."
        );
        describe_counter!(
            "sitemend_fixes_applied_total",
            Unit::Count,
            "Total number of fixes applied to external platforms."
        );
        describe_counter!(
            "sitemend_fixes_rolled_back_total",
            Unit::Count,
            "Total number of fixes rolled back."
        );
        describe_counter!(
            "sitemend_jobs_claimed_total",
            Unit::Count,
            "Total number of background jobs claimed for execution."
        );
        describe_counter!(
            "sitemend_jobs_failed_total",
            Unit::Count,
            "Total number of background jobs that failed."
        );
        describe_counter!(
            "sitemend_webhooks_delivered_total",
            Unit::Count,
            "Total number of webhook deliveries accepted by endpoints."
        );
        describe_counter!(
            "sitemend_webhooks_failed_total",
            Unit::Count,
            "Total number of webhook deliveries that failed."
        );
    });
}
