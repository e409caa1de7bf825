//! Invalidation planning.
//!
//! Translates a cache event into the entity tags it touches, then expands
//! those through the registry into concrete cache keys. Composite entries
//! (the connection summary) are registered under every constituent tag, so
//! "smart invalidation" here is simply: one mutation → all dependent keys.

use std::collections::HashSet;

use super::events::EventKind;
use super::keys::{CacheKey, EntityKey};
use super::registry::CacheRegistry;

/// Entity tags invalidated by an event.
pub fn affected_entities(kind: &EventKind) -> Vec<EntityKey> {
    match kind {
        EventKind::AssetsScanned { connection_id } => vec![
            EntityKey::ConnectionAssets(*connection_id),
        ],
        EventKind::SuggestionStored {
            connection_id,
            asset_id: _,
        } => vec![EntityKey::ConnectionAssets(*connection_id)],
        EventKind::FixesApplied { connection_id } => vec![
            // A fix write mutates assets too (alt text + status).
            EntityKey::ConnectionAssets(*connection_id),
            EntityKey::ConnectionFixes(*connection_id),
        ],
        EventKind::FixRolledBack {
            connection_id,
            asset_id: _,
        } => vec![
            EntityKey::ConnectionAssets(*connection_id),
            EntityKey::ConnectionFixes(*connection_id),
        ],
        EventKind::CreditsChanged { user_id } => vec![EntityKey::UserCredits(*user_id)],
        EventKind::BatchUpdated {
            batch_id,
            connection_id,
        } => vec![
            EntityKey::Batch(*batch_id),
            EntityKey::ConnectionAssets(*connection_id),
        ],
        EventKind::JobUpdated { job_id } => vec![EntityKey::Job(*job_id)],
    }
}

/// Direct keys known without a registry lookup. These cover entries that are
/// read before the first registered write (progress polling, balances).
pub fn direct_keys(kind: &EventKind) -> Vec<CacheKey> {
    match kind {
        EventKind::AssetsScanned { connection_id } => {
            vec![CacheKey::ConnectionSummary(*connection_id)]
        }
        EventKind::SuggestionStored { asset_id, .. } => vec![CacheKey::AssetById(*asset_id)],
        EventKind::FixesApplied { connection_id } => {
            vec![CacheKey::ConnectionSummary(*connection_id)]
        }
        EventKind::FixRolledBack {
            connection_id,
            asset_id,
        } => vec![
            CacheKey::ConnectionSummary(*connection_id),
            CacheKey::AssetById(*asset_id),
        ],
        EventKind::CreditsChanged { user_id } => vec![CacheKey::CreditBalance(*user_id)],
        EventKind::BatchUpdated { batch_id, .. } => vec![CacheKey::BatchProgress(*batch_id)],
        EventKind::JobUpdated { job_id } => vec![CacheKey::JobStatus(*job_id)],
    }
}

/// Full key set to drop for an event: registry expansion plus direct keys.
pub fn plan(kind: &EventKind, registry: &CacheRegistry) -> HashSet<CacheKey> {
    let mut keys: HashSet<CacheKey> = direct_keys(kind).into_iter().collect();
    for entity in affected_entities(kind) {
        keys.extend(registry.unregister_entity(&entity));
    }
    keys
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn fix_event_clears_summary_and_registered_lists() {
        let registry = CacheRegistry::new();
        let conn = Uuid::new_v4();

        let list_key = CacheKey::AssetList {
            connection_id: conn,
            filter_hash: 42,
        };
        registry.register(
            list_key,
            HashSet::from([EntityKey::ConnectionAssets(conn)]),
        );
        let summary_key = CacheKey::ConnectionSummary(conn);
        registry.register(
            summary_key,
            HashSet::from([
                EntityKey::ConnectionAssets(conn),
                EntityKey::ConnectionFixes(conn),
            ]),
        );

        let keys = plan(
            &EventKind::FixesApplied {
                connection_id: conn,
            },
            &registry,
        );

        assert!(keys.contains(&list_key));
        assert!(keys.contains(&summary_key));
    }

    #[test]
    fn credit_event_targets_only_that_user() {
        let registry = CacheRegistry::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        registry.register(
            CacheKey::CreditBalance(other),
            HashSet::from([EntityKey::UserCredits(other)]),
        );

        let keys = plan(&EventKind::CreditsChanged { user_id: user }, &registry);
        assert_eq!(keys, HashSet::from([CacheKey::CreditBalance(user)]));
    }
}
