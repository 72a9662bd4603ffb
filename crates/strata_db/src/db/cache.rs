// cache.rs - Version-stamped query result snapshots
//
// A snapshot never aliases chunk memory. It records which slot ranges of
// which chunks matched, and column data is resolved through the database at
// access time. Staleness is detected by comparing version numbers.

use crate::db::{Archetype, ChunkId};
use std::collections::HashSet;
use std::ops::Range;

/// Monotonic version plus a validity flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheVersion {
    number: u32,
    valid: bool,
}

impl CacheVersion {
    /// Bump the number and mark valid.
    pub fn update(&mut self) {
        self.number = self.number.wrapping_add(1);
        self.valid = true;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn number(&self) -> u32 {
        self.number
    }
}

/// A contiguous run of occupied slots in one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkView {
    pub chunk_id: ChunkId,
    pub start: usize,
    pub len: usize,
}

impl ChunkView {
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// The materialized slot ranges of one archetype.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntrySnapshot {
    archetype: Archetype,
    chunks: Vec<ChunkView>,
}

impl EntrySnapshot {
    pub fn new(archetype: Archetype) -> Self {
        Self {
            archetype,
            chunks: Vec::new(),
        }
    }

    #[inline]
    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    #[inline]
    pub fn chunks(&self) -> &[ChunkView] {
        &self.chunks
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn num_entities(&self) -> usize {
        self.chunks.iter().map(|view| view.len).sum()
    }

    /// Record a slot range. Empty ranges are dropped.
    pub(crate) fn push_view(&mut self, view: ChunkView) {
        if view.len > 0 {
            self.chunks.push(view);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.chunks.clear();
    }
}

/// Per-archetype snapshot plus the queries that matched it.
#[derive(Debug)]
pub(crate) struct CachedEntry {
    pub snapshot: EntrySnapshot,
    pub matching_queries: HashSet<Archetype>,
    pub valid: bool,
}

impl CachedEntry {
    pub fn new(archetype: Archetype) -> Self {
        Self {
            snapshot: EntrySnapshot::new(archetype),
            matching_queries: HashSet::new(),
            valid: false,
        }
    }
}

/// Result of one query mask: the matching archetypes' snapshots.
#[derive(Clone, Debug)]
pub struct CachedQuery {
    query: Archetype,
    matching: Vec<EntrySnapshot>,
    version: CacheVersion,
}

impl CachedQuery {
    pub fn new(query: Archetype) -> Self {
        Self {
            query,
            matching: Vec::new(),
            version: CacheVersion::default(),
        }
    }

    /// A private result holding exactly `matching`, stamped with `version`.
    pub(crate) fn from_parts(query: Archetype, matching: Vec<EntrySnapshot>, version: CacheVersion) -> Self {
        Self {
            query,
            matching,
            version,
        }
    }

    /// The query mask.
    #[inline]
    pub fn query(&self) -> &Archetype {
        &self.query
    }

    #[inline]
    pub fn matching(&self) -> &[EntrySnapshot] {
        &self.matching
    }

    #[inline]
    pub fn version(&self) -> CacheVersion {
        self.version
    }

    pub fn num_entities(&self) -> usize {
        self.matching.iter().map(EntrySnapshot::num_entities).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.matching.clear();
    }

    pub(crate) fn push(&mut self, snapshot: EntrySnapshot) {
        self.matching.push(snapshot);
    }

    pub(crate) fn invalidate(&mut self) {
        self.version.invalidate();
    }

    pub(crate) fn mark_updated(&mut self) {
        self.version.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_update_and_invalidate() {
        let mut version = CacheVersion::default();
        assert!(!version.is_valid());

        version.update();
        assert!(version.is_valid());
        assert_eq!(version.number(), 1);

        version.invalidate();
        assert!(!version.is_valid());
        assert_eq!(version.number(), 1);

        version.update();
        assert_eq!(version.number(), 2);
    }

    #[test]
    fn snapshot_drops_empty_views() {
        let mut snapshot = EntrySnapshot::new(Archetype::bare(1));
        let chunk_id = ChunkId::generate();
        snapshot.push_view(ChunkView { chunk_id, start: 0, len: 0 });
        snapshot.push_view(ChunkView { chunk_id, start: 3, len: 4 });

        assert_eq!(snapshot.num_chunks(), 1);
        assert_eq!(snapshot.num_entities(), 4);
        assert_eq!(snapshot.chunks()[0].range(), 3..7);
    }
}
