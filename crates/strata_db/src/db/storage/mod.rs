//! Chunked columnar storage.
//!
//! An [`Entry`] owns every [`Chunk`] of one archetype. Each chunk is a single
//! raw allocation split into one column per component, laid out by
//! [`plan_archetype`].

mod blob;
mod chunk;
mod entry;
mod layout;

pub use chunk::Chunk;
pub use entry::Entry;
pub use layout::{plan_archetype, ArchetypePlan, ColumnLayout, BLOB_ALIGN};

use crate::db::ComponentId;

/// A component payload resolved against the registry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ResolvedPayload<'a> {
    pub component: ComponentId,
    pub name: &'static str,
    pub bytes: &'a [u8],
}
