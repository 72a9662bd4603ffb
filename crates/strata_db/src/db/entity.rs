// entity.rs - Entity and chunk identity, plus the global entity index

use crate::db::Archetype;
use crate::telemetry::DatabaseStats;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Opaque entity identifier. The nil id is never assigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Uuid);

impl EntityId {
    /// The invalid id.
    pub const NIL: Self = Self(Uuid::nil());

    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.0.is_nil()
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one chunk inside an Entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkId(Uuid);

impl ChunkId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where an entity currently lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: EntityId,
    pub archetype: Archetype,
    pub chunk_id: ChunkId,
    pub slot: usize,
}

/// Authoritative map from entity id to its storage location.
///
/// Every entity is created and destroyed through this index, so it also
/// carries the entity counters.
#[derive(Debug, Default)]
pub struct EntityIndex {
    records: HashMap<EntityId, EntityRecord>,
    stats: DatabaseStats,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id located at `(archetype, chunk_id, slot)`.
    pub(crate) fn register(&mut self, archetype: Archetype, chunk_id: ChunkId, slot: usize) -> EntityId {
        let id = EntityId::generate();
        self.records.insert(
            id,
            EntityRecord {
                id,
                archetype,
                chunk_id,
                slot,
            },
        );
        self.stats.record_created(1);
        id
    }

    /// Point an existing id at a new location (migration keeps the id).
    pub(crate) fn relocate(&mut self, id: EntityId, archetype: Archetype, chunk_id: ChunkId, slot: usize) {
        self.records.insert(
            id,
            EntityRecord {
                id,
                archetype,
                chunk_id,
                slot,
            },
        );
    }

    pub(crate) fn remove(&mut self, id: &EntityId) -> Option<EntityRecord> {
        self.records.remove(id)
    }

    #[inline]
    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.records.get(id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: &EntityId) -> Option<&mut EntityRecord> {
        self.records.get_mut(id)
    }

    #[inline]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> &DatabaseStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut DatabaseStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_invalid() {
        assert!(!EntityId::NIL.is_valid());
        assert!(!EntityId::default().is_valid());
        assert!(EntityId::generate().is_valid());
    }

    #[test]
    fn register_and_relocate() {
        let mut index = EntityIndex::new();
        let bare = Archetype::bare(2);
        let chunk = ChunkId::generate();

        let id = index.register(bare.clone(), chunk, 0);
        assert_eq!(index.get(&id).map(|r| r.slot), Some(0));

        let moved_to = ChunkId::generate();
        let archetype = Archetype::bare(2).with(1);
        index.relocate(id, archetype.clone(), moved_to, 4);

        let record = index.get(&id).unwrap();
        assert_eq!(record.archetype, archetype);
        assert_eq!(record.chunk_id, moved_to);
        assert_eq!(record.slot, 4);
        assert_eq!(index.len(), 1);

        assert!(index.remove(&id).is_some());
        assert!(!index.contains(&id));
    }
}
