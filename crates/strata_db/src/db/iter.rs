// iter.rs - Cursor over a cached query result
//
// The iterator owns a private copy of the query result and the version it
// was built against. It does not borrow the database; every data access
// takes the database explicitly and first checks that the live cached query
// still carries the captured version.

use crate::db::{Archetype, CachedQuery, ChunkView, Component, Database, EntityId, EntrySnapshot};
use tracing::error;

/// Restartable cursor walking matching archetypes, then chunks within each.
///
/// ```ignore
/// let mut it = db.run_query(&mut query);
/// while it.next() {
///     let ids = it.entities(&db);
///     let positions = it.column::<Position>(&db);
/// }
/// ```
#[derive(Clone, Debug)]
pub struct QueryIterator {
    snapshot: Option<CachedQuery>,
    entry_index: isize,
    chunk_index: usize,
}

impl Default for QueryIterator {
    fn default() -> Self {
        Self::detached()
    }
}

impl QueryIterator {
    pub(crate) fn new(snapshot: CachedQuery) -> Self {
        Self {
            snapshot: Some(snapshot),
            entry_index: -1,
            chunk_index: 0,
        }
    }

    /// An iterator with no result behind it. Never valid, never advances.
    pub fn detached() -> Self {
        Self {
            snapshot: None,
            entry_index: -1,
            chunk_index: 0,
        }
    }

    /// Advance to the next chunk of the current entry, else to the first
    /// chunk of the next entry that has any. Returns false once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let Some(snapshot) = &self.snapshot else {
            return false;
        };
        let entries = snapshot.matching();

        if let Ok(current) = usize::try_from(self.entry_index) {
            if let Some(entry) = entries.get(current) {
                if self.chunk_index + 1 < entry.num_chunks() {
                    self.chunk_index += 1;
                    return true;
                }
            }
        }

        loop {
            self.entry_index = (self.entry_index + 1).min(entries.len() as isize);
            self.chunk_index = 0;
            match entries.get(self.entry_index as usize) {
                None => return false,
                Some(entry) if entry.num_chunks() > 0 => return true,
                Some(_) => continue,
            }
        }
    }

    /// Rewind to before the first position.
    pub fn reset(&mut self) {
        self.entry_index = -1;
        self.chunk_index = 0;
    }

    /// True while no matching archetype has been structurally modified since
    /// this iterator's result was built.
    pub fn is_valid(&self, db: &Database) -> bool {
        let Some(snapshot) = &self.snapshot else {
            return false;
        };
        db.record()
            .cached_query(snapshot.query())
            .is_some_and(|live| {
                live.version().is_valid() && live.version().number() == snapshot.version().number()
            })
    }

    /// The private result this iterator walks.
    pub fn result(&self) -> Option<&CachedQuery> {
        self.snapshot.as_ref()
    }

    /// Entities across every matching archetype in the result.
    pub fn total_entities(&self) -> usize {
        self.snapshot.as_ref().map_or(0, CachedQuery::num_entities)
    }

    fn position(&self) -> Option<(&EntrySnapshot, &ChunkView)> {
        let entry_index = usize::try_from(self.entry_index).ok()?;
        let entry = self.snapshot.as_ref()?.matching().get(entry_index)?;
        let view = entry.chunks().get(self.chunk_index)?;
        Some((entry, view))
    }

    /// Archetype at the current position.
    pub fn archetype(&self) -> Option<&Archetype> {
        self.position().map(|(entry, _)| entry.archetype())
    }

    /// Number of entities at the current position.
    pub fn num_entities(&self) -> usize {
        self.position().map_or(0, |(_, view)| view.len)
    }

    fn checked_position(&self, db: &Database) -> Option<(&EntrySnapshot, &ChunkView)> {
        if !self.is_valid(db) {
            error!("invalid iterator");
            return None;
        }
        let position = self.position();
        if position.is_none() {
            error!(entry = self.entry_index, chunk = self.chunk_index, "iterator is not on a valid position");
        }
        position
    }

    /// Entity ids at the current position.
    pub fn entities<'db>(&self, db: &'db Database) -> &'db [EntityId] {
        let Some((entry, view)) = self.checked_position(db) else {
            return &[];
        };
        db.entry(entry.archetype())
            .and_then(|e| e.chunk(&view.chunk_id))
            .and_then(|chunk| chunk.entity_ids().get(view.range()))
            .unwrap_or_else(|| {
                error!(chunk = %view.chunk_id, "chunk behind iterator is missing");
                &[]
            })
    }

    /// Component column at the current position.
    pub fn column<'db, T: Component>(&self, db: &'db Database) -> &'db [T] {
        let Some((entry, view)) = self.checked_position(db) else {
            return &[];
        };
        let Some(component) = db.registry().id_of::<T>() else {
            error!(component = T::NAME, "component type is not registered");
            return &[];
        };
        if !entry.archetype().has(component) {
            error!(component = T::NAME, "component is not part of this archetype");
            return &[];
        }
        let Some(chunk) = db.entry(entry.archetype()).and_then(|e| e.chunk(&view.chunk_id)) else {
            error!(chunk = %view.chunk_id, "chunk behind iterator is missing");
            return &[];
        };
        chunk.column::<T>(component, view.range()).unwrap_or_else(|err| {
            error!(component = T::NAME, %err, "cannot view column");
            &[]
        })
    }

    /// Mutable component column at the current position.
    ///
    /// Writing component values is not a structural change and does not
    /// invalidate outstanding iterators.
    pub fn column_mut<'db, T: Component>(&self, db: &'db mut Database) -> &'db mut [T] {
        let Some((entry, view)) = self.checked_position(db) else {
            return Default::default();
        };
        let Some(component) = db.registry().id_of::<T>() else {
            error!(component = T::NAME, "component type is not registered");
            return Default::default();
        };
        if !entry.archetype().has(component) {
            error!(component = T::NAME, "component is not part of this archetype");
            return Default::default();
        }
        let Some(chunk) = db.chunk_mut(entry.archetype(), &view.chunk_id) else {
            error!(chunk = %view.chunk_id, "chunk behind iterator is missing");
            return Default::default();
        };
        chunk.column_mut::<T>(component, view.range()).unwrap_or_else(|err| {
            error!(component = T::NAME, %err, "cannot view column");
            Default::default()
        })
    }
}
