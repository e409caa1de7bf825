//! Cache event consumer.
//!
//! Drains the event queue, plans the affected key set, and drops the
//! entries from the store and registry.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::debug;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::planner;
use super::registry::CacheRegistry;
use super::stats::CacheStats;
use super::store::CacheStore;

pub struct CacheConsumer {
    config: CacheConfig,
    store: Arc<CacheStore>,
    registry: Arc<CacheRegistry>,
    queue: Arc<EventQueue>,
    stats: Arc<CacheStats>,
}

impl CacheConsumer {
    pub fn new(
        config: CacheConfig,
        store: Arc<CacheStore>,
        registry: Arc<CacheRegistry>,
        queue: Arc<EventQueue>,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            queue,
            stats,
        }
    }

    /// Drain one batch of events and invalidate everything they touch.
    /// Returns the number of cache keys dropped.
    pub async fn consume(&self) -> usize {
        if !self.config.is_enabled() {
            return 0;
        }

        let started = Instant::now();
        let events = self.queue.drain(self.config.event_batch_size);
        if events.is_empty() {
            return 0;
        }

        let mut dropped = 0usize;
        for event in &events {
            let keys = planner::plan(&event.kind, &self.registry);
            for key in &keys {
                self.store.invalidate(key);
                self.registry.unregister(key);
            }
            dropped += keys.len();
            debug!(
                event_id = %event.id,
                event_kind = ?event.kind,
                invalidated = keys.len(),
                "cache event consumed"
            );
        }

        self.stats.record_invalidations(dropped as u64);
        histogram!("sitemend_cache_consume_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);

        dropped
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use uuid::Uuid;

    use super::*;
    use crate::cache::events::EventKind;
    use crate::cache::keys::{CacheKey, EntityKey};
    use crate::domain::credits::CreditBalance;

    fn build_consumer() -> (CacheConsumer, Arc<CacheStore>, Arc<CacheRegistry>, Arc<EventQueue>, Arc<CacheStats>)
    {
        let config = CacheConfig::default();
        let stats = Arc::new(CacheStats::new());
        let store = Arc::new(CacheStore::new(&config, Arc::clone(&stats)));
        let registry = Arc::new(CacheRegistry::new());
        let queue = Arc::new(EventQueue::new());
        let consumer = CacheConsumer::new(
            config,
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&stats),
        );
        (consumer, store, registry, queue, stats)
    }

    #[tokio::test]
    async fn consuming_drops_planned_entries() {
        let (consumer, store, registry, queue, stats) = build_consumer();
        let user = Uuid::new_v4();

        store.put_balance(user, CreditBalance::Unlimited);
        registry.register(
            CacheKey::CreditBalance(user),
            HashSet::from([EntityKey::UserCredits(user)]),
        );

        queue.publish(EventKind::CreditsChanged { user_id: user });
        let dropped = consumer.consume().await;

        assert_eq!(dropped, 1);
        assert!(store.get_balance(user).is_none());
        assert_eq!(stats.snapshot().invalidations, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let (consumer, _, _, _, stats) = build_consumer();
        assert_eq!(consumer.consume().await, 0);
        assert_eq!(stats.snapshot().invalidations, 0);
    }
}
