// chunk.rs - Fixed-capacity columnar block for one archetype
//
// Entities fill slots in order and stay dense: removal swaps the last slot
// into the hole. Slot indices are tracked externally in the EntityIndex, so
// every swap updates the moved entity's record.

use super::blob::Blob;
use super::{ArchetypePlan, ColumnLayout, Entry, ResolvedPayload};
use crate::db::{Archetype, ChunkId, ChunkView, Component, ComponentId, EntityId, EntityIndex, EntityRecord, EntrySnapshot};
use crate::error::StorageError;
use std::mem::size_of;
use std::ops::Range;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{error, trace, warn};

/// Storage for up to `capacity` entities of one archetype.
///
/// The blob is allocated on first insertion and released again when the
/// chunk empties.
pub struct Chunk {
    id: ChunkId,
    archetype: Archetype,
    plan: Arc<ArchetypePlan>,
    blob: Option<Blob>,
    entity_ids: Vec<EntityId>,
}

impl Chunk {
    pub(crate) fn new(id: ChunkId, archetype: Archetype, plan: Arc<ArchetypePlan>) -> Self {
        Self {
            id,
            archetype,
            plan,
            blob: None,
            entity_ids: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ChunkId {
        self.id
    }

    #[inline]
    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    #[inline]
    pub fn plan(&self) -> &ArchetypePlan {
        &self.plan
    }

    /// Ids in slot order.
    #[inline]
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.entity_ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.plan.capacity()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.plan.capacity() - self.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.remaining_capacity() == 0
    }

    /// Whether the chunk currently holds a memory block.
    #[inline]
    pub fn has_blob(&self) -> bool {
        self.blob.is_some()
    }

    fn ensure_blob(&mut self, index: &mut EntityIndex) -> Result<(), StorageError> {
        if self.blob.is_none() && !self.plan.is_storageless() {
            self.blob = Some(Blob::zeroed(self.plan.blob_size())?);
            index.stats_mut().record_blob_allocated();
            trace!(chunk = %self.id, bytes = self.plan.blob_size(), "allocated chunk blob");
        }
        Ok(())
    }

    fn release_blob(&mut self, index: &mut EntityIndex) {
        if self.blob.take().is_some() {
            index.stats_mut().record_blob_released();
            trace!(chunk = %self.id, "released chunk blob");
        }
    }

    fn blob(&self) -> Result<&Blob, StorageError> {
        self.blob.as_ref().ok_or(StorageError::BlobNotAllocated)
    }

    fn blob_mut(&mut self) -> Result<&mut Blob, StorageError> {
        self.blob.as_mut().ok_or(StorageError::BlobNotAllocated)
    }

    /// Write one element into a column slot.
    fn write(&mut self, column: &ColumnLayout, slot: usize, bytes: &[u8]) -> Result<(), StorageError> {
        if column.size == 0 {
            return Ok(());
        }
        self.blob_mut()?
            .bytes_mut(column.byte_range(slot, 1))?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Match payloads to destination columns.
    fn resolve_columns<'p>(
        &self,
        payloads: &[ResolvedPayload<'p>],
    ) -> Result<Vec<(usize, &'p [u8])>, StorageError> {
        payloads
            .iter()
            .map(|payload| {
                let pos = self.plan.column_position(payload.component).ok_or_else(|| {
                    StorageError::MissingColumn {
                        component: payload.name.to_string(),
                    }
                })?;
                let column = &self.plan.columns()[pos];
                if payload.bytes.len() != column.size {
                    return Err(StorageError::SizeMismatch {
                        component: payload.name.to_string(),
                        expected: column.size,
                        actual: payload.bytes.len(),
                    });
                }
                Ok((pos, payload.bytes))
            })
            .collect()
    }

    /// Append up to `count` entities initialized from `payloads`.
    ///
    /// Returns how many were added (bounded by remaining capacity) and records
    /// the new slot range in `out`.
    pub(crate) fn add_entities(
        &mut self,
        payloads: &[ResolvedPayload<'_>],
        count: usize,
        index: &mut EntityIndex,
        out: &mut EntrySnapshot,
    ) -> Result<usize, StorageError> {
        let added = count.min(self.remaining_capacity());
        if added == 0 {
            return Ok(0);
        }

        let writes = self.resolve_columns(payloads)?;
        self.ensure_blob(index)?;

        let plan = Arc::clone(&self.plan);
        let start = self.len();
        for slot in start..start + added {
            for &(pos, bytes) in &writes {
                self.write(&plan.columns()[pos], slot, bytes)?;
            }
            let id = index.register(self.archetype.clone(), self.id, slot);
            self.entity_ids.push(id);
        }

        out.push_view(ChunkView {
            chunk_id: self.id,
            start,
            len: added,
        });
        Ok(added)
    }

    /// Swap-remove the entity described by `record`.
    ///
    /// `was_moved` marks a migration rather than a deletion and leaves the
    /// entity counters alone. Returns true when a previously full chunk has
    /// room again, so the Entry can put it back into its available pool.
    pub(crate) fn remove_entity(
        &mut self,
        record: &EntityRecord,
        was_moved: bool,
        index: &mut EntityIndex,
    ) -> Result<bool, StorageError> {
        let slot = record.slot;
        if self.entity_ids.get(slot) != Some(&record.id) {
            error!(entity = %record.id, slot, chunk = %self.id, "entity has an invalid slot index");
            return Ok(false);
        }

        let was_full = self.is_full();
        let last = self.len() - 1;
        self.entity_ids.swap_remove(slot);

        if !was_moved {
            index.stats_mut().record_destroyed(1);
        }

        if slot == last {
            if self.is_empty() {
                self.release_blob(index);
            }
            return Ok(was_full);
        }

        if let Some(blob) = self.blob.as_mut() {
            for column in self.plan.columns() {
                if column.size == 0 {
                    continue;
                }
                blob.copy_within(column.byte_range(last, 1), column.byte_range(slot, 1).start)?;
            }
        }

        let moved = self.entity_ids[slot];
        let moved_record = index
            .get_mut(&moved)
            .ok_or(StorageError::UnknownEntity { entity: moved })?;
        moved_record.slot = slot;

        Ok(was_full)
    }

    /// Migrate entities from `source` into this chunk.
    ///
    /// Overlapping columns are copied from each entity's old chunk, `payloads`
    /// supply the newly added components, and the entity is then swap-removed
    /// from its old chunk. Every destination column must end up written.
    /// Returns how many ids were consumed (migrated or skipped as unknown).
    pub(crate) fn take_entities(
        &mut self,
        ids: &[EntityId],
        source: &mut Entry,
        payloads: &[ResolvedPayload<'_>],
        index: &mut EntityIndex,
        out: &mut EntrySnapshot,
    ) -> Result<usize, StorageError> {
        if ids.is_empty() {
            warn!(chunk = %self.id, "no entity ids to take");
            return Ok(0);
        }

        let writes = self.resolve_columns(payloads)?;
        let mut supplied = vec![false; self.plan.columns().len()];
        for &(pos, _) in &writes {
            supplied[pos] = true;
        }

        let plan = Arc::clone(&self.plan);
        let start = self.len();
        let mut consumed = 0;

        for &id in ids {
            if self.is_full() {
                break;
            }
            consumed += 1;

            let Some(record) = index.get(&id).cloned() else {
                error!(entity = %id, "cannot migrate unknown entity");
                continue;
            };
            let Some(old_chunk) = source.chunk(&record.chunk_id) else {
                error!(entity = %id, chunk = %record.chunk_id, "entity's chunk is missing from its entry");
                continue;
            };

            self.ensure_blob(index)?;
            let slot = self.len();
            let mut populated = supplied.clone();

            for old_column in old_chunk.plan().columns() {
                let Some(pos) = plan.column_position(old_column.component) else {
                    continue;
                };
                let column = &plan.columns()[pos];
                if column.size != old_column.size {
                    return Err(StorageError::SizeMismatch {
                        component: column.name.to_string(),
                        expected: column.size,
                        actual: old_column.size,
                    });
                }
                populated[pos] = true;
                if column.size > 0 {
                    let bytes = old_chunk.blob()?.bytes(old_column.byte_range(record.slot, 1))?;
                    self.write(column, slot, bytes)?;
                }
            }

            if let Some(pos) = populated.iter().position(|written| !written) {
                return Err(StorageError::UnpopulatedColumn {
                    component: plan.columns()[pos].name.to_string(),
                });
            }

            for &(pos, bytes) in &writes {
                self.write(&plan.columns()[pos], slot, bytes)?;
            }

            source.remove_entity(&record, true, index)?;
            index.relocate(id, self.archetype.clone(), self.id, slot);
            self.entity_ids.push(id);
        }

        out.push_view(ChunkView {
            chunk_id: self.id,
            start,
            len: self.len() - start,
        });
        Ok(consumed)
    }

    /// Raw bytes of one component for the entity at `slot`.
    pub fn component_bytes(&self, component: ComponentId, slot: usize) -> Option<&[u8]> {
        if slot >= self.len() {
            return None;
        }
        let column = self.plan.column(component)?;
        if column.size == 0 {
            return Some(&[]);
        }
        self.blob.as_ref()?.bytes(column.byte_range(slot, 1)).ok()
    }

    fn typed_column(&self, component: ComponentId, range: &Range<usize>, element_size: usize) -> Result<&ColumnLayout, StorageError> {
        let column = self
            .plan
            .column(component)
            .ok_or_else(|| StorageError::MissingColumn {
                component: format!("#{component}"),
            })?;
        if column.size != element_size {
            return Err(StorageError::SizeMismatch {
                component: column.name.to_string(),
                expected: column.size,
                actual: element_size,
            });
        }
        if range.start > range.end || range.end > self.len() {
            return Err(StorageError::OutOfBounds {
                start: range.start,
                end: range.end,
                len: self.len(),
            });
        }
        Ok(column)
    }

    /// Typed view of `range` slots of a component column.
    pub fn column<T: Component>(&self, component: ComponentId, range: Range<usize>) -> Result<&[T], StorageError> {
        let column = self.typed_column(component, &range, size_of::<T>())?;
        if column.size == 0 {
            return Ok(zero_sized_slice(range.len()));
        }
        if range.is_empty() {
            return Ok(Default::default());
        }
        let bytes = self.blob()?.bytes(column.byte_range(range.start, range.len()))?;
        bytemuck::try_cast_slice(bytes).map_err(|_| StorageError::Misaligned {
            component: column.name.to_string(),
        })
    }

    /// Mutable typed view of `range` slots of a component column.
    pub fn column_mut<T: Component>(&mut self, component: ComponentId, range: Range<usize>) -> Result<&mut [T], StorageError> {
        let column = self.typed_column(component, &range, size_of::<T>())?.clone();
        if column.size == 0 {
            return Ok(zero_sized_slice_mut(range.len()));
        }
        if range.is_empty() {
            return Ok(Default::default());
        }
        let bytes = self.blob_mut()?.bytes_mut(column.byte_range(range.start, range.len()))?;
        bytemuck::try_cast_slice_mut(bytes).map_err(|_| StorageError::Misaligned {
            component: column.name.to_string(),
        })
    }
}

fn zero_sized_slice<'a, T>(len: usize) -> &'a [T] {
    debug_assert_eq!(size_of::<T>(), 0);
    // Safety: T is zero-sized, so a dangling aligned pointer is valid for any length.
    unsafe { std::slice::from_raw_parts(NonNull::<T>::dangling().as_ptr(), len) }
}

fn zero_sized_slice_mut<'a, T>(len: usize) -> &'a mut [T] {
    debug_assert_eq!(size_of::<T>(), 0);
    // Safety: as above; zero-sized elements never alias memory.
    unsafe { std::slice::from_raw_parts_mut(NonNull::<T>::dangling().as_ptr(), len) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{plan_archetype, ComponentRegistry, ComponentType};
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

    fn chunk_for(registry: &ComponentRegistry, names: &[&str]) -> Chunk {
        let archetype = registry.archetype_from_names(names);
        let plan = plan_archetype(&archetype, registry, 1024).unwrap();
        Chunk::new(ChunkId::generate(), archetype, Arc::new(plan))
    }

    fn payload<'a, T: Component>(registry: &ComponentRegistry, value: &'a T) -> ResolvedPayload<'a> {
        ResolvedPayload {
            component: registry.id_of::<T>().unwrap(),
            name: T::NAME,
            bytes: bytemuck::bytes_of(value),
        }
    }

    fn add_health(chunk: &mut Chunk, registry: &ComponentRegistry, index: &mut EntityIndex, value: i32) {
        let health = Health { value };
        let mut out = EntrySnapshot::new(chunk.archetype().clone());
        chunk
            .add_entities(&[payload(registry, &health)], 1, index, &mut out)
            .unwrap();
    }

    #[test]
    fn add_is_capped_by_capacity() {
        let registry = registry();
        let mut chunk = chunk_for(&registry, &["Position"]);
        let mut index = EntityIndex::new();
        let position = Position { x: 1.0, y: 2.0, z: 3.0 };
        let mut out = EntrySnapshot::new(chunk.archetype().clone());

        assert!(!chunk.has_blob());
        let added = chunk
            .add_entities(&[payload(&registry, &position)], 100, &mut index, &mut out)
            .unwrap();

        // (1024 - 4) / 12
        assert_eq!(added, 85);
        assert!(chunk.is_full());
        assert!(chunk.has_blob());
        assert_eq!(out.num_entities(), 85);
        assert_eq!(index.len(), 85);

        let id = registry.id_of::<Position>().unwrap();
        let column = chunk.column::<Position>(id, 0..85).unwrap();
        assert!(column.iter().all(|p| *p == position));

        let first = chunk.entity_ids()[0];
        assert_eq!(index.get(&first).map(|r| r.slot), Some(0));
    }

    #[test]
    fn payload_without_column_is_rejected() {
        let registry = registry();
        let mut chunk = chunk_for(&registry, &["Position"]);
        let mut index = EntityIndex::new();
        let health = Health { value: 3 };
        let mut out = EntrySnapshot::new(chunk.archetype().clone());

        let err = chunk
            .add_entities(&[payload(&registry, &health)], 1, &mut index, &mut out)
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingColumn { .. }));
        assert!(chunk.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn swap_remove_moves_last_slot_into_hole() {
        let registry = registry();
        let mut chunk = chunk_for(&registry, &["Health"]);
        let mut index = EntityIndex::new();
        for value in [10, 20, 30] {
            add_health(&mut chunk, &registry, &mut index, value);
        }
        let ids = chunk.entity_ids().to_vec();

        let record = index.get(&ids[0]).cloned().unwrap();
        assert!(!chunk.remove_entity(&record, false, &mut index).unwrap());
        index.remove(&ids[0]);

        assert_eq!(chunk.entity_ids(), &[ids[2], ids[1]]);
        assert_eq!(index.get(&ids[2]).map(|r| r.slot), Some(0));

        let health = registry.id_of::<Health>().unwrap();
        assert_eq!(
            chunk.column::<Health>(health, 0..2).unwrap(),
            &[Health { value: 30 }, Health { value: 20 }]
        );
    }

    #[test]
    fn emptying_a_full_chunk_reopens_and_frees_it() {
        let registry = registry();
        let mut chunk = chunk_for(&registry, &["Health"]);
        let mut index = EntityIndex::new();
        let health = Health { value: 1 };
        let mut out = EntrySnapshot::new(chunk.archetype().clone());
        chunk
            .add_entities(&[payload(&registry, &health)], 1000, &mut index, &mut out)
            .unwrap();

        // (1024 - 4) / 4
        assert_eq!(chunk.len(), 255);
        assert!(chunk.is_full());

        let ids = chunk.entity_ids().to_vec();
        let last = index.get(&ids[254]).cloned().unwrap();
        assert!(chunk.remove_entity(&last, false, &mut index).unwrap());
        index.remove(&last.id);

        for id in &ids[..254] {
            let record = index.get(id).cloned().unwrap();
            assert!(!chunk.remove_entity(&record, false, &mut index).unwrap());
            index.remove(id);
        }

        assert!(chunk.is_empty());
        assert!(!chunk.has_blob());
        #[cfg(feature = "metrics")]
        {
            assert_eq!(index.stats().live_blobs(), 0);
            assert_eq!(index.stats().live_entities(), 0);
        }
    }

    #[test]
    fn stale_slot_is_ignored() {
        let registry = registry();
        let mut chunk = chunk_for(&registry, &["Health"]);
        let mut index = EntityIndex::new();
        add_health(&mut chunk, &registry, &mut index, 5);

        let mut record = index.get(&chunk.entity_ids()[0]).cloned().unwrap();
        record.slot = 7;
        assert!(!chunk.remove_entity(&record, false, &mut index).unwrap());
        assert_eq!(chunk.len(), 1);
    }

    #[test]
    fn typed_column_checks_element_size() {
        let registry = registry();
        let mut chunk = chunk_for(&registry, &["Health"]);
        let mut index = EntityIndex::new();
        add_health(&mut chunk, &registry, &mut index, 5);

        let health = registry.id_of::<Health>().unwrap();
        assert!(matches!(
            chunk.column::<Position>(health, 0..1),
            Err(StorageError::SizeMismatch { .. })
        ));
        assert!(matches!(
            chunk.column::<Health>(health, 0..2),
            Err(StorageError::OutOfBounds { .. })
        ));

        chunk.column_mut::<Health>(health, 0..1).unwrap()[0].value = 9;
        assert_eq!(chunk.component_bytes(health, 0), Some(&9i32.to_ne_bytes()[..]));
    }
}
