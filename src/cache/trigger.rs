//! Cache trigger facade.
//!
//! Write paths call these convenience methods after a successful mutation;
//! the trigger publishes the event and consumes it in-line so downstream
//! reads see coherent state immediately.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};

pub struct CacheTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    pub async fn trigger(&self, kind: EventKind, consume_now: bool) {
        if !self.config.is_enabled() {
            debug!(event_kind = ?kind, "cache trigger skipped: cache disabled");
            return;
        }

        self.queue.publish(kind);

        if consume_now {
            self.consumer.consume().await;
        }
    }

    pub async fn assets_scanned(&self, connection_id: Uuid) {
        self.trigger(EventKind::AssetsScanned { connection_id }, true)
            .await;
    }

    pub async fn suggestion_stored(&self, connection_id: Uuid, asset_id: Uuid) {
        self.trigger(
            EventKind::SuggestionStored {
                connection_id,
                asset_id,
            },
            true,
        )
        .await;
    }

    pub async fn fixes_applied(&self, connection_id: Uuid) {
        self.trigger(EventKind::FixesApplied { connection_id }, true)
            .await;
    }

    pub async fn fix_rolled_back(&self, connection_id: Uuid, asset_id: Uuid) {
        self.trigger(
            EventKind::FixRolledBack {
                connection_id,
                asset_id,
            },
            true,
        )
        .await;
    }

    pub async fn credits_changed(&self, user_id: Uuid) {
        self.trigger(EventKind::CreditsChanged { user_id }, true)
            .await;
    }

    pub async fn batch_updated(&self, batch_id: Uuid, connection_id: Uuid) {
        self.trigger(
            EventKind::BatchUpdated {
                batch_id,
                connection_id,
            },
            true,
        )
        .await;
    }

    pub async fn job_updated(&self, job_id: Uuid) {
        self.trigger(EventKind::JobUpdated { job_id }, true).await;
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}
