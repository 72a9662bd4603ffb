// database.rs - Entity lifecycle and query orchestration
//
// The Database owns every Entry (one per archetype) and the MasterRecord.
// Structural changes (add, remove, migrate) invalidate the touched
// archetypes' cached entries and, through them, every query that matched.

use crate::config::{validate_chunk_byte_budget, DatabaseConfig};
use crate::db::storage::ResolvedPayload;
use crate::db::{
    plan_archetype, Archetype, CachedQuery, Chunk, ChunkId, Component, ComponentInfo,
    ComponentPayload, ComponentQuery, ComponentRegistry, ComponentType, Composition, Entry,
    EntityId, EntrySnapshot, MasterRecord, QueryIterator,
};
use crate::error::{DatabaseError, StorageError};
use crate::telemetry::DatabaseStats;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// In-memory entity-component database.
///
/// Single-threaded: every operation runs to completion before returning.
///
/// # Example
/// ```ignore
/// let mut db = Database::new();
/// db.initialize(&[ComponentType::of::<Position>()], 128 * 1024)?;
///
/// let mut it = db.add_entities(&Composition::new().with(Position::default()), 100);
/// let mut query = ComponentQuery::new().with::<Position>();
/// let mut it = db.run_query(&mut query);
/// while it.next() {
///     for position in it.column::<Position>(&db) { /* ... */ }
/// }
/// ```
#[derive(Debug, Default)]
pub struct Database {
    config: DatabaseConfig,
    record: MasterRecord,
    entries: HashMap<Archetype, Entry>,
    active_archetypes: Vec<Archetype>,
    initialized: bool,
}

/// Log and abort on a violated storage invariant.
fn fatal(err: StorageError) -> ! {
    error!(%err, "chunk storage invariant violated");
    panic!("chunk storage invariant violated: {err}");
}

impl Database {
    /// Create an uninitialized database with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an uninitialized database with explicit configuration.
    pub fn with_config(config: DatabaseConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Register component types and reserve the bare archetype.
    ///
    /// Calling this a second time keeps the existing registry and only logs
    /// a warning.
    pub fn initialize(
        &mut self,
        component_types: &[ComponentType],
        chunk_byte_budget: usize,
    ) -> Result<(), DatabaseError> {
        if self.initialized {
            warn!("database is already initialized, ignoring");
            return Ok(());
        }

        validate_chunk_byte_budget(chunk_byte_budget)?;
        let registry = ComponentRegistry::new(component_types)?;

        self.config.chunk_byte_budget = chunk_byte_budget;
        self.record = MasterRecord::new(registry);
        self.entries.clear();
        self.active_archetypes.clear();

        let bare = self.record.registry().bare_archetype();
        if let Err(err) = self.ensure_entry(&bare) {
            fatal(err);
        }

        self.initialized = true;
        info!(
            components = self.record.registry().len(),
            chunk_byte_budget,
            "database initialized"
        );
        Ok(())
    }

    /// `initialize` using the configured chunk budget.
    pub fn initialize_with_config(&mut self, component_types: &[ComponentType]) -> Result<(), DatabaseError> {
        self.config.validate()?;
        let budget = self.config.chunk_byte_budget;
        self.initialize(component_types, budget)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &ComponentRegistry {
        self.record.registry()
    }

    #[inline]
    pub fn record(&self) -> &MasterRecord {
        &self.record
    }

    #[inline]
    pub fn stats(&self) -> &DatabaseStats {
        self.record.entities().stats()
    }

    pub fn component_info<T: Component>(&self) -> Option<&ComponentInfo> {
        let id = self.registry().id_of::<T>()?;
        self.registry().info(id)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.record.entities().len()
    }

    /// Number of archetypes that have an Entry, the bare archetype included.
    pub fn archetype_count(&self) -> usize {
        self.active_archetypes.len()
    }

    /// Archetypes in creation order.
    pub fn archetypes(&self) -> &[Archetype] {
        &self.active_archetypes
    }

    pub fn entry(&self, archetype: &Archetype) -> Option<&Entry> {
        self.entries.get(archetype)
    }

    pub fn chunk(&self, archetype: &Archetype, chunk_id: &ChunkId) -> Option<&Chunk> {
        self.entries.get(archetype)?.chunk(chunk_id)
    }

    pub(crate) fn chunk_mut(&mut self, archetype: &Archetype, chunk_id: &ChunkId) -> Option<&mut Chunk> {
        self.entries.get_mut(archetype)?.chunk_mut(chunk_id)
    }

    fn ensure_entry(&mut self, archetype: &Archetype) -> Result<(), StorageError> {
        if self.entries.contains_key(archetype) {
            return Ok(());
        }
        let plan = plan_archetype(archetype, self.record.registry(), self.config.chunk_byte_budget)?;
        debug!(
            archetype = %self.record.registry().describe(archetype),
            capacity = plan.capacity(),
            "creating entry"
        );
        let entry = Entry::new(archetype.clone(), plan, self.config.chunk_count_warn_threshold);
        self.entries.insert(archetype.clone(), entry);
        self.active_archetypes.push(archetype.clone());
        self.record.track_archetype(archetype);
        Ok(())
    }

    /// Resolve payloads against the registry, setting their bits in `archetype`.
    /// Unregistered types are logged and dropped.
    fn resolve_payloads<'a>(
        &self,
        payloads: &'a [ComponentPayload],
        archetype: &mut Archetype,
    ) -> Vec<ResolvedPayload<'a>> {
        let registry = self.record.registry();
        let mut resolved = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let ty = payload.component_type();
            let Some(component) = registry.id_of_type(ty.type_id()) else {
                error!(component = ty.name(), "attempted to add unknown component type");
                continue;
            };
            archetype.insert(component);
            resolved.push(ResolvedPayload {
                component,
                name: ty.name(),
                bytes: payload.bytes(),
            });
        }
        resolved
    }

    /// Current version of the live cached query for `query`, rebuilding it if needed.
    fn refresh_cached_query(&mut self, query: &Archetype) -> crate::db::CacheVersion {
        self.record
            .refresh_query(query, &self.active_archetypes, &self.entries)
            .version()
    }

    // ------------------------------------------------------------------
    // Entity creation
    // ------------------------------------------------------------------

    /// Add one entity. Returns None if the database is not initialized.
    pub fn add_entity(&mut self, components: &Composition) -> Option<EntityId> {
        let mut it = self.add_entities(components, 1);
        if !it.next() {
            return None;
        }
        it.entities(self).first().copied()
    }

    /// Add one entity and return an iterator over it.
    pub fn add_entity_and_iterate(&mut self, components: &Composition) -> QueryIterator {
        self.add_entities(components, 1)
    }

    /// Add `count` entities sharing the same initial component values.
    ///
    /// The returned iterator covers exactly the newly added entities.
    pub fn add_entities(&mut self, components: &Composition, count: usize) -> QueryIterator {
        if !self.initialized {
            error!("add_entities called before initialize");
            return QueryIterator::detached();
        }
        if count == 0 {
            warn!("add_entities called with a count of zero");
            return QueryIterator::detached();
        }

        let mut archetype = self.record.registry().bare_archetype();
        let payloads = self.resolve_payloads(components.payloads(), &mut archetype);

        match self.try_add_entities(&archetype, &payloads, count) {
            Ok(it) => it,
            Err(err) => fatal(err),
        }
    }

    fn try_add_entities(
        &mut self,
        archetype: &Archetype,
        payloads: &[ResolvedPayload<'_>],
        count: usize,
    ) -> Result<QueryIterator, StorageError> {
        self.ensure_entry(archetype)?;

        let mut snapshot = EntrySnapshot::new(archetype.clone());
        let entry = self.entries.get_mut(archetype).ok_or_else(|| StorageError::MissingEntry {
            archetype: self.record.registry().describe(archetype),
        })?;
        entry.add_entities(payloads, count, self.record.entities_mut(), &mut snapshot)?;

        self.record.invalidate_archetype(archetype);
        let version = self.refresh_cached_query(archetype);
        debug!(count, archetype = %self.record.registry().describe(archetype), "added entities");

        Ok(QueryIterator::new(CachedQuery::from_parts(
            archetype.clone(),
            vec![snapshot],
            version,
        )))
    }

    // ------------------------------------------------------------------
    // Entity removal
    // ------------------------------------------------------------------

    pub fn remove_entity(&mut self, id: EntityId) {
        self.remove_entities(&[id]);
    }

    /// Delete entities. Invalid or unknown ids are skipped with a warning.
    ///
    /// Every touched archetype is invalidated once, after all removals.
    pub fn remove_entities(&mut self, ids: &[EntityId]) {
        let mut modified: Vec<Archetype> = Vec::new();

        for &id in ids {
            if !id.is_valid() {
                warn!("skipping removal of the nil entity id");
                continue;
            }
            let Some(record) = self.record.entities().get(&id).cloned() else {
                warn!(entity = %id, "skipping removal of unknown entity");
                continue;
            };
            let Some(entry) = self.entries.get_mut(&record.archetype) else {
                error!(entity = %id, "entity's archetype has no entry");
                continue;
            };
            if let Err(err) = entry.remove_entity(&record, false, self.record.entities_mut()) {
                fatal(err);
            }
            self.record.entities_mut().remove(&id);

            if !modified.contains(&record.archetype) {
                modified.push(record.archetype);
            }
        }

        for archetype in &modified {
            self.record.invalidate_archetype(archetype);
        }
    }

    // ------------------------------------------------------------------
    // Migration
    // ------------------------------------------------------------------

    pub fn update_entity(
        &mut self,
        id: EntityId,
        to_add: &Composition,
        to_remove: &[ComponentType],
    ) -> QueryIterator {
        self.update_entities(&[id], to_add, to_remove)
    }

    /// Add and/or remove components on a batch of entities.
    ///
    /// All known ids must currently share one archetype; a mixed batch is
    /// rejected outright. An update that would leave the archetype unchanged
    /// is rejected as well. Migration is not atomic: a storage invariant
    /// violation midway aborts the process.
    pub fn update_entities(
        &mut self,
        ids: &[EntityId],
        to_add: &Composition,
        to_remove: &[ComponentType],
    ) -> QueryIterator {
        if !self.initialized {
            error!("update_entities called before initialize");
            return QueryIterator::detached();
        }

        let mut current: Option<&Archetype> = None;
        let mut valid_ids = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(record) = self.record.entities().get(&id) else {
                error!(entity = %id, "cannot update unknown entity");
                continue;
            };
            match current {
                None => current = Some(&record.archetype),
                Some(archetype) if *archetype != record.archetype => {
                    error!("all entities in one update must share an archetype, rejecting batch");
                    return QueryIterator::detached();
                }
                Some(_) => {}
            }
            valid_ids.push(id);
        }
        let Some(old) = current.cloned() else {
            warn!("update_entities found no known entities");
            return QueryIterator::detached();
        };

        let mut new = old.clone();
        let payloads = self.resolve_payloads(to_add.payloads(), &mut new);
        let registry = self.record.registry();
        for ty in to_remove {
            match registry.id_of_type(ty.type_id()) {
                Some(component) => new.remove(component),
                None => error!(component = ty.name(), "attempted to remove unknown component type"),
            }
        }
        let payloads: Vec<ResolvedPayload<'_>> = payloads
            .into_iter()
            .filter(|payload| {
                let kept = new.has(payload.component);
                if !kept {
                    warn!(component = payload.name, "component is both added and removed, dropping its value");
                }
                kept
            })
            .collect();

        if new == old {
            error!(
                archetype = %registry.describe(&old),
                "update would not change the archetype, rejecting"
            );
            return QueryIterator::detached();
        }

        match self.try_migrate(&old, &new, &valid_ids, &payloads) {
            Ok(it) => it,
            Err(err) => fatal(err),
        }
    }

    fn try_migrate(
        &mut self,
        old: &Archetype,
        new: &Archetype,
        ids: &[EntityId],
        payloads: &[ResolvedPayload<'_>],
    ) -> Result<QueryIterator, StorageError> {
        self.ensure_entry(new)?;

        let mut destination = self.entries.remove(new).ok_or_else(|| StorageError::MissingEntry {
            archetype: self.record.registry().describe(new),
        })?;
        let mut snapshot = EntrySnapshot::new(new.clone());
        let result = match self.entries.get_mut(old) {
            Some(source) => destination.take_entities(ids, source, payloads, self.record.entities_mut(), &mut snapshot),
            None => Err(StorageError::MissingEntry {
                archetype: self.record.registry().describe(old),
            }),
        };
        self.entries.insert(new.clone(), destination);
        result?;

        self.record.invalidate_archetype(old);
        self.record.invalidate_archetype(new);
        let version = self.refresh_cached_query(new);
        debug!(
            count = snapshot.num_entities(),
            from = %self.record.registry().describe(old),
            to = %self.record.registry().describe(new),
            "migrated entities"
        );

        Ok(QueryIterator::new(CachedQuery::from_parts(
            new.clone(),
            vec![snapshot],
            version,
        )))
    }

    // ------------------------------------------------------------------
    // Queries and lookups
    // ------------------------------------------------------------------

    /// Run a query, reusing its cached result while still valid.
    pub fn run_query(&mut self, query: &mut ComponentQuery) -> QueryIterator {
        if !self.initialized {
            error!("run_query called before initialize");
            return QueryIterator::detached();
        }
        let mask = query.archetype(self.record.registry()).clone();
        let cached = self
            .record
            .refresh_query(&mask, &self.active_archetypes, &self.entries);
        QueryIterator::new(cached.clone())
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        id.is_valid() && self.record.entities().contains(&id)
    }

    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        let Some(record) = self.record.entities().get(&id) else {
            return false;
        };
        self.registry()
            .id_of::<T>()
            .is_some_and(|component| self.record.archetype_has_component(&record.archetype, component))
    }

    pub fn get_component<T: Component>(&self, id: EntityId) -> Option<&T> {
        let record = self.record.entities().get(&id)?;
        let component = self.registry().id_of::<T>()?;
        if !record.archetype.has(component) {
            return None;
        }
        let chunk = self.chunk(&record.archetype, &record.chunk_id)?;
        chunk
            .column::<T>(component, record.slot..record.slot + 1)
            .ok()?
            .first()
    }

    /// Mutable access to one component value. Not a structural change.
    pub fn get_component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        let record = self.record.entities().get(&id)?;
        let component = self.record.registry().id_of::<T>()?;
        if !record.archetype.has(component) {
            return None;
        }
        let chunk = self
            .entries
            .get_mut(&record.archetype)?
            .chunk_mut(&record.chunk_id)?;
        chunk
            .column_mut::<T>(component, record.slot..record.slot + 1)
            .ok()?
            .first_mut()
    }
}
