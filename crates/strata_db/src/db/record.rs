// record.rs - Process-wide bookkeeping for one database
//
// Owns the registry, the entity index and both caches. Cached entries are
// keyed by archetype, cached queries by query mask; each cached entry
// remembers which queries matched it so structural changes can invalidate
// exactly those queries.

use crate::db::cache::CachedEntry;
use crate::db::{Archetype, CachedQuery, ComponentId, ComponentRegistry, Entry, EntityIndex};
use std::collections::HashMap;
use tracing::{error, trace};

#[derive(Debug, Default)]
pub struct MasterRecord {
    registry: ComponentRegistry,
    entities: EntityIndex,
    cached_entries: HashMap<Archetype, CachedEntry>,
    cached_queries: HashMap<Archetype, CachedQuery>,
}

impl MasterRecord {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    #[inline]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    #[inline]
    pub fn entities(&self) -> &EntityIndex {
        &self.entities
    }

    #[inline]
    pub(crate) fn entities_mut(&mut self) -> &mut EntityIndex {
        &mut self.entities
    }

    pub fn archetype_has_component(&self, archetype: &Archetype, component: ComponentId) -> bool {
        archetype.has(component)
    }

    /// The live cached result for a query mask, if one was ever built.
    pub fn cached_query(&self, query: &Archetype) -> Option<&CachedQuery> {
        self.cached_queries.get(query)
    }

    /// Start caching a newly created archetype.
    ///
    /// Existing queries whose mask it satisfies are linked to it and
    /// invalidated so their next run picks it up.
    pub(crate) fn track_archetype(&mut self, archetype: &Archetype) {
        let mut cached = CachedEntry::new(archetype.clone());
        for (mask, query) in self.cached_queries.iter_mut() {
            if archetype.contains_all(mask) {
                cached.matching_queries.insert(mask.clone());
                query.invalidate();
            }
        }
        self.cached_entries.insert(archetype.clone(), cached);
    }

    /// Mark an archetype's snapshot stale along with every query that matched it.
    pub(crate) fn invalidate_archetype(&mut self, archetype: &Archetype) {
        let Some(cached) = self.cached_entries.get_mut(archetype) else {
            error!(archetype = ?archetype, "no cached entry for modified archetype");
            return;
        };
        cached.valid = false;
        for mask in &cached.matching_queries {
            if let Some(query) = self.cached_queries.get_mut(mask) {
                query.invalidate();
            }
        }
        trace!(archetype = ?archetype, queries = cached.matching_queries.len(), "invalidated archetype");
    }

    /// Return the cached result for `query`, rebuilding it first if it is
    /// missing or stale.
    ///
    /// `active` lists archetypes in creation order, which fixes the order of
    /// matching entries.
    pub(crate) fn refresh_query(
        &mut self,
        query: &Archetype,
        active: &[Archetype],
        entries: &HashMap<Archetype, Entry>,
    ) -> &CachedQuery {
        let Self {
            cached_entries,
            cached_queries,
            ..
        } = self;

        let cached = cached_queries
            .entry(query.clone())
            .or_insert_with(|| CachedQuery::new(query.clone()));
        if cached.version().is_valid() {
            return cached;
        }

        cached.clear();
        for archetype in active {
            if !archetype.contains_all(query) {
                continue;
            }
            let Some(entry) = entries.get(archetype) else {
                error!(archetype = ?archetype, "active archetype has no entry");
                continue;
            };
            let cached_entry = cached_entries
                .entry(archetype.clone())
                .or_insert_with(|| CachedEntry::new(archetype.clone()));
            if !cached_entry.valid {
                refresh_entry(cached_entry, entry);
            }
            cached_entry.matching_queries.insert(query.clone());
            cached.push(cached_entry.snapshot.clone());
        }
        cached.mark_updated();
        cached
    }
}

/// Rebuild a cached entry from its Entry's non-empty chunks.
fn refresh_entry(cached: &mut CachedEntry, entry: &Entry) {
    cached.snapshot.clear();
    for chunk in entry.chunks() {
        cached.snapshot.push_view(crate::db::ChunkView {
            chunk_id: chunk.id(),
            start: 0,
            len: chunk.len(),
        });
    }
    cached.valid = true;
}
