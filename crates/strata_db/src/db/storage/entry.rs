// entry.rs - Chunk pool for one archetype
//
// Decides which chunk receives the next insertion. Non-full chunks sit on an
// "available" stack: a chunk is popped when it fills and pushed back once a
// removal opens room in it again.

use super::{ArchetypePlan, Chunk, ResolvedPayload};
use crate::db::{Archetype, ChunkId, EntityId, EntityIndex, EntityRecord, EntrySnapshot};
use crate::error::StorageError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// All chunks sharing one archetype.
pub struct Entry {
    archetype: Archetype,
    plan: Arc<ArchetypePlan>,
    chunks: HashMap<ChunkId, Chunk>,
    all_chunk_ids: Vec<ChunkId>,
    available_chunk_ids: Vec<ChunkId>,
    chunk_count_warn_threshold: usize,
    warned_chunk_count: bool,
}

impl Entry {
    pub(crate) fn new(archetype: Archetype, plan: ArchetypePlan, chunk_count_warn_threshold: usize) -> Self {
        Self {
            archetype,
            plan: Arc::new(plan),
            chunks: HashMap::new(),
            all_chunk_ids: Vec::new(),
            available_chunk_ids: Vec::new(),
            chunk_count_warn_threshold,
            warned_chunk_count: false,
        }
    }

    #[inline]
    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    #[inline]
    pub fn plan(&self) -> &ArchetypePlan {
        &self.plan
    }

    pub fn chunk(&self, id: &ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub(crate) fn chunk_mut(&mut self, id: &ChunkId) -> Option<&mut Chunk> {
        self.chunks.get_mut(id)
    }

    /// Chunk ids in creation order.
    #[inline]
    pub fn chunk_ids(&self) -> &[ChunkId] {
        &self.all_chunk_ids
    }

    /// Chunks in creation order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.all_chunk_ids.iter().filter_map(|id| self.chunks.get(id))
    }

    /// Ids of chunks with room, top of the stack last.
    #[inline]
    pub fn available_chunk_ids(&self) -> &[ChunkId] {
        &self.available_chunk_ids
    }

    pub fn num_chunks(&self) -> usize {
        self.all_chunk_ids.len()
    }

    /// Live entities across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.values().map(Chunk::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.values().all(Chunk::is_empty)
    }

    /// Top of the available stack, creating a new chunk when none is left.
    fn next_chunk_id(&mut self) -> ChunkId {
        while let Some(&id) = self.available_chunk_ids.last() {
            if self.chunks.contains_key(&id) {
                return id;
            }
            self.available_chunk_ids.pop();
        }

        let id = ChunkId::generate();
        self.all_chunk_ids.push(id);
        self.available_chunk_ids.push(id);
        debug!(chunk = %id, chunks = self.all_chunk_ids.len(), "created chunk");

        if !self.warned_chunk_count && self.all_chunk_ids.len() > self.chunk_count_warn_threshold {
            self.warned_chunk_count = true;
            warn!(
                archetype = ?self.archetype,
                chunks = self.all_chunk_ids.len(),
                threshold = self.chunk_count_warn_threshold,
                "archetype exceeded the chunk count threshold, consider a larger chunk budget"
            );
        }
        id
    }

    /// The chunk that should receive the next insertion.
    pub(crate) fn available_chunk(&mut self) -> &mut Chunk {
        let id = self.next_chunk_id();
        let archetype = &self.archetype;
        let plan = &self.plan;
        self.chunks
            .entry(id)
            .or_insert_with(|| Chunk::new(id, archetype.clone(), Arc::clone(plan)))
    }

    /// Put a chunk that regained room back on the available stack.
    pub(crate) fn make_available(&mut self, chunk_id: ChunkId) {
        if self.available_chunk_ids.last() != Some(&chunk_id) {
            self.available_chunk_ids.push(chunk_id);
        }
    }

    /// Add `count` entities, spilling across as many chunks as needed.
    pub(crate) fn add_entities(
        &mut self,
        payloads: &[ResolvedPayload<'_>],
        count: usize,
        index: &mut EntityIndex,
        out: &mut EntrySnapshot,
    ) -> Result<(), StorageError> {
        let mut remaining = count;
        while remaining > 0 {
            let chunk = self.available_chunk();
            let added = chunk.add_entities(payloads, remaining, index, out)?;
            let full = chunk.is_full();
            if full {
                self.available_chunk_ids.pop();
            }
            remaining -= added;
        }
        Ok(())
    }

    /// Migrate `ids` out of `source` into this entry's chunks.
    pub(crate) fn take_entities(
        &mut self,
        ids: &[EntityId],
        source: &mut Entry,
        payloads: &[ResolvedPayload<'_>],
        index: &mut EntityIndex,
        out: &mut EntrySnapshot,
    ) -> Result<(), StorageError> {
        let mut offset = 0;
        while offset < ids.len() {
            let chunk = self.available_chunk();
            let consumed = chunk.take_entities(&ids[offset..], source, payloads, index, out)?;
            let full = chunk.is_full();
            if full {
                self.available_chunk_ids.pop();
            }
            offset += consumed;
        }
        Ok(())
    }

    /// Swap-remove one entity from its chunk.
    pub(crate) fn remove_entity(
        &mut self,
        record: &EntityRecord,
        was_moved: bool,
        index: &mut EntityIndex,
    ) -> Result<(), StorageError> {
        let Some(chunk) = self.chunks.get_mut(&record.chunk_id) else {
            error!(entity = %record.id, chunk = %record.chunk_id, "chunk not found for entity");
            return Ok(());
        };
        if chunk.remove_entity(record, was_moved, index)? {
            self.make_available(record.chunk_id);
        }
        Ok(())
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("archetype", &self.archetype)
            .field("chunks", &self.all_chunk_ids.len())
            .field("available", &self.available_chunk_ids.len())
            .field("entities", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{plan_archetype, Component, ComponentRegistry, ComponentType};
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Position {
        x: f32,
        y: f32,
        z: f32,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Health {
        value: i32,
    }

    crate::define_component!(Position);
    crate::define_component!(Health);

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(&[ComponentType::of::<Position>(), ComponentType::of::<Health>()])
            .unwrap()
    }

    fn entry_for(registry: &ComponentRegistry, names: &[&str]) -> Entry {
        let archetype = registry.archetype_from_names(names);
        let plan = plan_archetype(&archetype, registry, 1024).unwrap();
        Entry::new(archetype, plan, 80)
    }

    fn payload<'a, T: Component>(registry: &ComponentRegistry, value: &'a T) -> ResolvedPayload<'a> {
        ResolvedPayload {
            component: registry.id_of::<T>().unwrap(),
            name: T::NAME,
            bytes: bytemuck::bytes_of(value),
        }
    }

    #[test]
    fn spills_into_a_second_chunk() {
        let registry = registry();
        let mut entry = entry_for(&registry, &["Health"]);
        let mut index = EntityIndex::new();
        let health = Health { value: 4 };
        let mut out = EntrySnapshot::new(entry.archetype().clone());

        entry
            .add_entities(&[payload(&registry, &health)], 300, &mut index, &mut out)
            .unwrap();

        assert_eq!(entry.num_chunks(), 2);
        assert_eq!(entry.len(), 300);
        let lens: Vec<usize> = out.chunks().iter().map(|view| view.len).collect();
        assert_eq!(lens, vec![255, 45]);
        assert_eq!(entry.available_chunk_ids(), &[entry.chunk_ids()[1]]);
    }

    #[test]
    fn removal_returns_full_chunk_to_pool() {
        let registry = registry();
        let mut entry = entry_for(&registry, &["Health"]);
        let mut index = EntityIndex::new();
        let health = Health { value: 4 };
        let mut out = EntrySnapshot::new(entry.archetype().clone());
        entry
            .add_entities(&[payload(&registry, &health)], 300, &mut index, &mut out)
            .unwrap();

        let first_chunk = entry.chunk_ids()[0];
        let victim = entry.chunk(&first_chunk).unwrap().entity_ids()[10];
        let record = index.get(&victim).cloned().unwrap();
        entry.remove_entity(&record, false, &mut index).unwrap();
        index.remove(&victim);

        assert_eq!(entry.available_chunk_ids().last(), Some(&first_chunk));

        // The reopened chunk receives the next insertion.
        let mut out = EntrySnapshot::new(entry.archetype().clone());
        entry
            .add_entities(&[payload(&registry, &health)], 1, &mut index, &mut out)
            .unwrap();
        assert_eq!(out.chunks()[0].chunk_id, first_chunk);
        assert_eq!(entry.available_chunk_ids(), &[entry.chunk_ids()[1]]);
    }

    #[test]
    fn bare_entry_has_no_byte_limit() {
        let registry = registry();
        let mut entry = entry_for(&registry, &[]);
        let mut index = EntityIndex::new();
        let mut out = EntrySnapshot::new(entry.archetype().clone());

        entry.add_entities(&[], 1100, &mut index, &mut out).unwrap();

        assert_eq!(entry.num_chunks(), 1);
        let chunk = entry.chunks().next().unwrap();
        assert_eq!(chunk.len(), 1100);
        assert!(!chunk.has_blob());
    }

    #[test]
    fn take_copies_overlap_and_adds_payload() {
        let registry = registry();
        let mut source = entry_for(&registry, &["Health"]);
        let mut destination = entry_for(&registry, &["Position", "Health"]);
        let mut index = EntityIndex::new();

        let health = Health { value: 42 };
        let mut out = EntrySnapshot::new(source.archetype().clone());
        source
            .add_entities(&[payload(&registry, &health)], 3, &mut index, &mut out)
            .unwrap();
        let ids: Vec<EntityId> = source.chunks().next().unwrap().entity_ids().to_vec();

        let position = Position { x: 1.0, y: 0.0, z: -1.0 };
        let mut out = EntrySnapshot::new(destination.archetype().clone());
        destination
            .take_entities(&ids, &mut source, &[payload(&registry, &position)], &mut index, &mut out)
            .unwrap();

        assert!(source.is_empty());
        assert_eq!(destination.len(), 3);
        assert_eq!(out.num_entities(), 3);

        let chunk = destination.chunks().next().unwrap();
        let health_id = registry.id_of::<Health>().unwrap();
        let position_id = registry.id_of::<Position>().unwrap();
        assert!(chunk.column::<Health>(health_id, 0..3).unwrap().iter().all(|h| *h == health));
        assert!(chunk.column::<Position>(position_id, 0..3).unwrap().iter().all(|p| *p == position));

        for id in &ids {
            let record = index.get(id).unwrap();
            assert_eq!(&record.archetype, destination.archetype());
            assert_eq!(record.chunk_id, chunk.id());
        }
        #[cfg(feature = "metrics")]
        assert_eq!(index.stats().live_entities(), 3);
    }

    #[test]
    fn take_without_new_payload_is_fatal() {
        let registry = registry();
        let mut source = entry_for(&registry, &["Health"]);
        let mut destination = entry_for(&registry, &["Position", "Health"]);
        let mut index = EntityIndex::new();

        let health = Health { value: 1 };
        let mut out = EntrySnapshot::new(source.archetype().clone());
        source
            .add_entities(&[payload(&registry, &health)], 1, &mut index, &mut out)
            .unwrap();
        let ids: Vec<EntityId> = source.chunks().next().unwrap().entity_ids().to_vec();

        let mut out = EntrySnapshot::new(destination.archetype().clone());
        let err = destination
            .take_entities(&ids, &mut source, &[], &mut index, &mut out)
            .unwrap_err();
        assert!(matches!(err, StorageError::UnpopulatedColumn { .. }));
    }
}
