//! Archetype-based entity-component storage.
//!
//! Entities with the same set of component types share an [`Archetype`] and
//! live together in fixed-size chunks, one contiguous column per component.
//! Queries match archetypes by bitset containment and are cached until a
//! matching archetype is structurally modified.

mod archetype;
mod builder;
mod cache;
mod component;
mod database;
mod entity;
mod iter;
mod query;
mod record;
pub mod storage;

pub use archetype::Archetype;
pub use builder::{ComponentPayload, Composition};
pub use cache::{CacheVersion, CachedQuery, ChunkView, EntrySnapshot};
pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry, ComponentType};
pub use database::Database;
pub use entity::{ChunkId, EntityId, EntityIndex, EntityRecord};
pub use iter::QueryIterator;
pub use query::ComponentQuery;
pub use record::MasterRecord;
pub use storage::{plan_archetype, ArchetypePlan, Chunk, ColumnLayout, Entry, BLOB_ALIGN};

/// Spawn a single entity from a list of component values.
///
/// # Example
/// ```ignore
/// let id = spawn!(db, Position { x: 1.0, y: 2.0, z: 0.0 }, Health { value: 100 });
/// ```
#[macro_export]
macro_rules! spawn {
    ($db:expr $(, $component:expr)+ $(,)?) => {{
        let composition = $crate::db::Composition::new()
            $(.with($component))+;
        $db.add_entity(&composition)
    }};
}
