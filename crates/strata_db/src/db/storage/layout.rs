// layout.rs - Column layout and capacity planning for one archetype
//
// Every chunk of an archetype shares the same layout, so it is computed once
// when the Entry is created. Offsets are relative to the blob base, which is
// aligned to BLOB_ALIGN; since no registered type may exceed that alignment,
// relative alignment equals absolute alignment.

use crate::db::{Archetype, ComponentId, ComponentRegistry};
use crate::error::StorageError;
use std::ops::Range;

/// Alignment of every chunk blob, and the largest component alignment accepted.
pub const BLOB_ALIGN: usize = 64;

/// Placement of one component column inside a chunk blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnLayout {
    pub component: ComponentId,
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
    pub align: usize,
}

impl ColumnLayout {
    /// Byte range covering `len` elements starting at `slot`.
    #[inline]
    pub fn byte_range(&self, slot: usize, len: usize) -> Range<usize> {
        let start = self.offset + slot * self.size;
        start..start + len * self.size
    }
}

/// Precomputed layout shared by all chunks of one archetype.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypePlan {
    columns: Vec<ColumnLayout>,
    capacity: usize,
    bytes_per_entity: usize,
    alignment_padding: usize,
    blob_size: usize,
}

impl ArchetypePlan {
    /// Columns in ascending component order.
    #[inline]
    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }

    pub fn column(&self, component: ComponentId) -> Option<&ColumnLayout> {
        self.column_position(component).map(|pos| &self.columns[pos])
    }

    /// Index of a component's column within `columns()`.
    pub fn column_position(&self, component: ComponentId) -> Option<usize> {
        self.columns
            .binary_search_by_key(&component, |column| column.component)
            .ok()
    }

    /// Entities per chunk. Unbounded for storageless archetypes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn bytes_per_entity(&self) -> usize {
        self.bytes_per_entity
    }

    /// Worst-case padding reserved for aligning column starts.
    #[inline]
    pub fn alignment_padding(&self) -> usize {
        self.alignment_padding
    }

    #[inline]
    pub fn blob_size(&self) -> usize {
        self.blob_size
    }

    /// Archetypes whose components take no bytes (the bare archetype, or only
    /// zero-sized markers) never allocate a blob.
    #[inline]
    pub fn is_storageless(&self) -> bool {
        self.bytes_per_entity == 0
    }
}

/// Compute column offsets and capacity for `archetype` in a `budget` byte chunk.
///
/// `capacity = (budget - sum of alignments) / bytes_per_entity`. A capacity of
/// zero for an archetype that stores bytes is a configuration error.
pub fn plan_archetype(
    archetype: &Archetype,
    registry: &ComponentRegistry,
    budget: usize,
) -> Result<ArchetypePlan, StorageError> {
    let mut columns = Vec::with_capacity(archetype.count());
    let mut alignment_padding = 0;
    let mut bytes_per_entity = 0;

    for component in archetype.components() {
        let info = registry
            .info(component)
            .ok_or_else(|| StorageError::MissingColumn {
                component: format!("#{component}"),
            })?;
        alignment_padding += info.alignment;
        bytes_per_entity += info.byte_size;
        columns.push(ColumnLayout {
            component,
            name: info.name,
            offset: 0,
            size: info.byte_size,
            align: info.alignment,
        });
    }

    if bytes_per_entity == 0 {
        return Ok(ArchetypePlan {
            columns,
            capacity: usize::MAX,
            bytes_per_entity,
            alignment_padding,
            blob_size: 0,
        });
    }

    let capacity = budget.saturating_sub(alignment_padding) / bytes_per_entity;
    if capacity == 0 {
        return Err(StorageError::ZeroCapacity {
            archetype: registry.describe(archetype),
            budget,
            bytes_per_entity,
        });
    }

    let mut next = 0;
    for column in &mut columns {
        column.offset = align_up(next, column.align);
        next = column.offset + column.size * capacity;
        if next > budget {
            return Err(StorageError::OutOfBounds {
                start: column.offset,
                end: next,
                len: budget,
            });
        }
    }

    Ok(ArchetypePlan {
        columns,
        capacity,
        bytes_per_entity,
        alignment_padding,
        blob_size: budget,
    })
}

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}
