//! Cache sizing and toggles.

use std::num::NonZeroUsize;

const DEFAULT_ASSET_LIMIT: usize = 4096;
const DEFAULT_LIST_LIMIT: usize = 256;
const DEFAULT_SUMMARY_LIMIT: usize = 512;
const DEFAULT_BALANCE_LIMIT: usize = 1024;
const DEFAULT_PROGRESS_LIMIT: usize = 1024;
const DEFAULT_EVENT_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub asset_limit: usize,
    pub list_limit: usize,
    pub summary_limit: usize,
    pub balance_limit: usize,
    pub progress_limit: usize,
    /// Max events consumed per drain pass.
    pub event_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            asset_limit: DEFAULT_ASSET_LIMIT,
            list_limit: DEFAULT_LIST_LIMIT,
            summary_limit: DEFAULT_SUMMARY_LIMIT,
            balance_limit: DEFAULT_BALANCE_LIMIT,
            progress_limit: DEFAULT_PROGRESS_LIMIT,
            event_batch_size: DEFAULT_EVENT_BATCH,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn non_zero(limit: usize, fallback: usize) -> NonZeroUsize {
        NonZeroUsize::new(limit)
            .or_else(|| NonZeroUsize::new(fallback))
            .unwrap_or(NonZeroUsize::MIN)
    }

    pub fn asset_limit_non_zero(&self) -> NonZeroUsize {
        Self::non_zero(self.asset_limit, DEFAULT_ASSET_LIMIT)
    }

    pub fn list_limit_non_zero(&self) -> NonZeroUsize {
        Self::non_zero(self.list_limit, DEFAULT_LIST_LIMIT)
    }

    pub fn summary_limit_non_zero(&self) -> NonZeroUsize {
        Self::non_zero(self.summary_limit, DEFAULT_SUMMARY_LIMIT)
    }

    pub fn balance_limit_non_zero(&self) -> NonZeroUsize {
        Self::non_zero(self.balance_limit, DEFAULT_BALANCE_LIMIT)
    }

    pub fn progress_limit_non_zero(&self) -> NonZeroUsize {
        Self::non_zero(self.progress_limit, DEFAULT_PROGRESS_LIMIT)
    }
}
