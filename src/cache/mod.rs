//! Tag-based cache invalidation.
//!
//! Write paths publish [`events::EventKind`] values through the
//! [`trigger::CacheTrigger`]; the [`consumer::CacheConsumer`] expands each
//! event into entity tags and drops every dependent entry, including
//! composite views registered under multiple tags.

pub mod config;
pub mod consumer;
pub mod events;
pub mod keys;
mod lock;
pub mod planner;
pub mod registry;
pub mod stats;
pub mod store;
pub mod trigger;

use std::sync::Arc;

pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{CacheEvent, EventKind, EventQueue};
pub use keys::{CacheKey, EntityKey};
pub use registry::CacheRegistry;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::CacheStore;
pub use trigger::CacheTrigger;

/// Everything the application layer needs to read through and invalidate
/// the cache, built once at startup.
#[derive(Clone)]
pub struct CacheState {
    pub store: Arc<CacheStore>,
    pub registry: Arc<CacheRegistry>,
    pub trigger: Arc<CacheTrigger>,
    pub stats: Arc<CacheStats>,
}

impl CacheState {
    pub fn build(config: CacheConfig) -> Self {
        let stats = Arc::new(CacheStats::new());
        let store = Arc::new(CacheStore::new(&config, Arc::clone(&stats)));
        let registry = Arc::new(CacheRegistry::new());
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(CacheConsumer::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&stats),
        ));
        let trigger = Arc::new(CacheTrigger::new(config, queue, consumer));

        Self {
            store,
            registry,
            trigger,
            stats,
        }
    }
}
