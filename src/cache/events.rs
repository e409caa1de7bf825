//! Cache event system.
//!
//! Write paths publish events; the consumer drains them and performs the
//! actual invalidation. Events carry a monotonic epoch so later events win
//! when several touch the same entity.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Mutations that require cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A scan upserted assets for the connection.
    AssetsScanned { connection_id: Uuid },
    /// A suggestion was stored for one of the connection's assets.
    SuggestionStored {
        connection_id: Uuid,
        asset_id: Uuid,
    },
    /// One or more fixes were applied (or attempted) for the connection.
    FixesApplied { connection_id: Uuid },
    /// A fix was rolled back, touching the asset it had optimized.
    FixRolledBack {
        connection_id: Uuid,
        asset_id: Uuid,
    },
    /// A user's credit balance changed (consumption or purchase).
    CreditsChanged { user_id: Uuid },
    /// Batch counters or status changed.
    BatchUpdated {
        batch_id: Uuid,
        connection_id: Uuid,
    },
    /// Job status or progress changed.
    JobUpdated { job_id: Uuid },
}

/// In-memory FIFO queue; contention is low, a mutex suffices.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, kind: EventKind) {
        let epoch = self.next_epoch();
        let event = CacheEvent::new(kind, epoch);

        debug!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?kind,
            "cache event enqueued"
        );

        mutex_lock(&self.queue, SOURCE, "publish").push_back(event);
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
