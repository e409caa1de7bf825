//! Bidirectional cache registry.
//!
//! Tracks which cache entries depend on which entities so an entity change
//! can be translated into the exact set of entries to drop.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{CacheKey, EntityKey};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

pub struct CacheRegistry {
    entity_to_keys: RwLock<HashMap<EntityKey, HashSet<CacheKey>>>,
    key_to_entities: RwLock<HashMap<CacheKey, HashSet<EntityKey>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            entity_to_keys: RwLock::new(HashMap::new()),
            key_to_entities: RwLock::new(HashMap::new()),
        }
    }

    /// Register a cache entry with every entity it was derived from.
    /// A composite entry (the connection summary) registers against all of
    /// its constituent tags, so any one of them invalidates it.
    pub fn register(&self, cache_key: CacheKey, entities: HashSet<EntityKey>) {
        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "register.e2k");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "register.k2e");

        for entity in &entities {
            e2k.entry(*entity).or_default().insert(cache_key);
        }
        k2e.insert(cache_key, entities);
    }

    pub fn keys_for_entity(&self, entity: &EntityKey) -> HashSet<CacheKey> {
        rw_read(&self.entity_to_keys, SOURCE, "keys_for_entity")
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a cache key and clean up entity mappings; called on eviction.
    pub fn unregister(&self, cache_key: &CacheKey) {
        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "unregister.e2k");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "unregister.k2e");

        if let Some(entities) = k2e.remove(cache_key) {
            for entity in entities {
                if let Some(keys) = e2k.get_mut(&entity) {
                    keys.remove(cache_key);
                    if keys.is_empty() {
                        e2k.remove(&entity);
                    }
                }
            }
        }
    }

    /// Drop all mappings for an entity, returning the affected cache keys.
    pub fn unregister_entity(&self, entity: &EntityKey) -> HashSet<CacheKey> {
        let mut e2k = rw_write(&self.entity_to_keys, SOURCE, "unregister_entity.e2k");
        let mut k2e = rw_write(&self.key_to_entities, SOURCE, "unregister_entity.k2e");

        let affected = e2k.remove(entity).unwrap_or_default();
        for cache_key in &affected {
            if let Some(entities) = k2e.get_mut(cache_key) {
                entities.remove(entity);
                // The entry may survive with other dependencies; the caller
                // decides whether to drop it from the store.
            }
        }

        affected
    }

    pub fn clear(&self) {
        rw_write(&self.entity_to_keys, SOURCE, "clear.e2k").clear();
        rw_write(&self.key_to_entities, SOURCE, "clear.k2e").clear();
    }

    pub fn entity_count(&self) -> usize {
        rw_read(&self.entity_to_keys, SOURCE, "entity_count").len()
    }

    pub fn key_count(&self) -> usize {
        rw_read(&self.key_to_entities, SOURCE, "key_count").len()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
