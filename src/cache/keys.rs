//! Cache key definitions.
//!
//! `EntityKey` names a domain entity (or derived group) for invalidation
//! purposes; `CacheKey` names a stored cache entry. The registry maps
//! between the two.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use uuid::Uuid;

use crate::application::repos::AssetQueryFilter;

/// Identifies a domain entity whose mutation invalidates dependent entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// The connection row itself (credentials, domain).
    Connection(Uuid),
    /// The set of image assets owned by a connection.
    ConnectionAssets(Uuid),
    /// The set of fixes owned by a connection.
    ConnectionFixes(Uuid),
    /// A user's credit state (usage row + purchased lots).
    UserCredits(Uuid),
    /// An optimization batch.
    Batch(Uuid),
    /// A background job.
    Job(Uuid),
}

/// Keys of concrete cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    AssetById(Uuid),
    /// A filtered asset listing, keyed by connection and filter hash.
    AssetList {
        connection_id: Uuid,
        filter_hash: u64,
    },
    /// Composite per-connection aggregate (issue counts + fix counts).
    /// Depends on both `ConnectionAssets` and `ConnectionFixes`.
    ConnectionSummary(Uuid),
    CreditBalance(Uuid),
    BatchProgress(Uuid),
    JobStatus(Uuid),
}

pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash an asset listing filter for `CacheKey::AssetList`.
pub fn hash_asset_filter(filter: &AssetQueryFilter) -> u64 {
    let mut hasher = DefaultHasher::new();
    filter.status.map(|s| s.as_str()).hash(&mut hasher);
    filter.missing_alt_only.hash(&mut hasher);
    filter.limit.hash(&mut hasher);
    hasher.finish()
}
