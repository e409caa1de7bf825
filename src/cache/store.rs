//! Typed cache storage.
//!
//! In-memory LRU caches for the read views the operation surface serves:
//! single assets, filtered asset lists, composite connection summaries,
//! credit balances, and job/batch progress snapshots.

use std::sync::Arc;
use std::sync::RwLock;

use lru::LruCache;
use uuid::Uuid;

use crate::application::summary::ConnectionSummary;
use crate::domain::credits::CreditBalance;
use crate::domain::entities::{BatchRecord, ImageAssetRecord, JobRecord};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::rw_write;
use super::stats::CacheStats;

const SOURCE: &str = "cache::store";

pub struct CacheStore {
    stats: Arc<CacheStats>,
    assets_by_id: RwLock<LruCache<Uuid, ImageAssetRecord>>,
    asset_lists: RwLock<LruCache<(Uuid, u64), Vec<ImageAssetRecord>>>,
    summaries: RwLock<LruCache<Uuid, ConnectionSummary>>,
    balances: RwLock<LruCache<Uuid, CreditBalance>>,
    batches: RwLock<LruCache<Uuid, BatchRecord>>,
    jobs: RwLock<LruCache<Uuid, JobRecord>>,
}

impl CacheStore {
    pub fn new(config: &CacheConfig, stats: Arc<CacheStats>) -> Self {
        Self {
            stats,
            assets_by_id: RwLock::new(LruCache::new(config.asset_limit_non_zero())),
            asset_lists: RwLock::new(LruCache::new(config.list_limit_non_zero())),
            summaries: RwLock::new(LruCache::new(config.summary_limit_non_zero())),
            balances: RwLock::new(LruCache::new(config.balance_limit_non_zero())),
            batches: RwLock::new(LruCache::new(config.progress_limit_non_zero())),
            jobs: RwLock::new(LruCache::new(config.progress_limit_non_zero())),
        }
    }

    fn hit_or_miss<T>(&self, value: Option<T>) -> Option<T> {
        match value {
            Some(v) => {
                self.stats.record_hit();
                Some(v)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn get_asset(&self, id: Uuid) -> Option<ImageAssetRecord> {
        let found = rw_write(&self.assets_by_id, SOURCE, "get_asset")
            .get(&id)
            .cloned();
        self.hit_or_miss(found)
    }

    pub fn put_asset(&self, asset: ImageAssetRecord) {
        let mut guard = rw_write(&self.assets_by_id, SOURCE, "put_asset");
        if guard.len() == guard.cap().get() && !guard.contains(&asset.id) {
            self.stats.record_eviction();
        }
        guard.put(asset.id, asset);
    }

    pub fn get_asset_list(&self, connection_id: Uuid, filter_hash: u64) -> Option<Vec<ImageAssetRecord>> {
        let found = rw_write(&self.asset_lists, SOURCE, "get_asset_list")
            .get(&(connection_id, filter_hash))
            .cloned();
        self.hit_or_miss(found)
    }

    pub fn put_asset_list(
        &self,
        connection_id: Uuid,
        filter_hash: u64,
        assets: Vec<ImageAssetRecord>,
    ) {
        let mut guard = rw_write(&self.asset_lists, SOURCE, "put_asset_list");
        if guard.len() == guard.cap().get() && !guard.contains(&(connection_id, filter_hash)) {
            self.stats.record_eviction();
        }
        guard.put((connection_id, filter_hash), assets);
    }

    pub fn get_summary(&self, connection_id: Uuid) -> Option<ConnectionSummary> {
        let found = rw_write(&self.summaries, SOURCE, "get_summary")
            .get(&connection_id)
            .cloned();
        self.hit_or_miss(found)
    }

    pub fn put_summary(&self, summary: ConnectionSummary) {
        rw_write(&self.summaries, SOURCE, "put_summary").put(summary.connection_id, summary);
    }

    pub fn get_balance(&self, user_id: Uuid) -> Option<CreditBalance> {
        let found = rw_write(&self.balances, SOURCE, "get_balance")
            .get(&user_id)
            .cloned();
        self.hit_or_miss(found)
    }

    pub fn put_balance(&self, user_id: Uuid, balance: CreditBalance) {
        rw_write(&self.balances, SOURCE, "put_balance").put(user_id, balance);
    }

    pub fn get_batch(&self, id: Uuid) -> Option<BatchRecord> {
        let found = rw_write(&self.batches, SOURCE, "get_batch").get(&id).cloned();
        self.hit_or_miss(found)
    }

    pub fn put_batch(&self, batch: BatchRecord) {
        rw_write(&self.batches, SOURCE, "put_batch").put(batch.id, batch);
    }

    pub fn get_job(&self, id: Uuid) -> Option<JobRecord> {
        let found = rw_write(&self.jobs, SOURCE, "get_job").get(&id).cloned();
        self.hit_or_miss(found)
    }

    pub fn put_job(&self, job: JobRecord) {
        rw_write(&self.jobs, SOURCE, "put_job").put(job.id, job);
    }

    /// Drop the entry for a single cache key.
    pub fn invalidate(&self, key: &CacheKey) {
        match key {
            CacheKey::AssetById(id) => {
                rw_write(&self.assets_by_id, SOURCE, "invalidate.asset").pop(id);
            }
            CacheKey::AssetList {
                connection_id,
                filter_hash,
            } => {
                rw_write(&self.asset_lists, SOURCE, "invalidate.list")
                    .pop(&(*connection_id, *filter_hash));
            }
            CacheKey::ConnectionSummary(id) => {
                rw_write(&self.summaries, SOURCE, "invalidate.summary").pop(id);
            }
            CacheKey::CreditBalance(id) => {
                rw_write(&self.balances, SOURCE, "invalidate.balance").pop(id);
            }
            CacheKey::BatchProgress(id) => {
                rw_write(&self.batches, SOURCE, "invalidate.batch").pop(id);
            }
            CacheKey::JobStatus(id) => {
                rw_write(&self.jobs, SOURCE, "invalidate.job").pop(id);
            }
        }
    }

    pub fn clear(&self) {
        rw_write(&self.assets_by_id, SOURCE, "clear.assets").clear();
        rw_write(&self.asset_lists, SOURCE, "clear.lists").clear();
        rw_write(&self.summaries, SOURCE, "clear.summaries").clear();
        rw_write(&self.balances, SOURCE, "clear.balances").clear();
        rw_write(&self.batches, SOURCE, "clear.batches").clear();
        rw_write(&self.jobs, SOURCE, "clear.jobs").clear();
    }
}
