// error.rs - Error types for configuration, registration and chunk storage

use crate::db::EntityId;
use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chunk byte budget {budget} is below the minimum of {minimum} bytes")]
    BudgetTooSmall { budget: usize, minimum: usize },
    #[error("chunk count warning threshold must be at least 1")]
    ZeroWarnThreshold,
    #[error("malformed database config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Recoverable failures surfaced by the database façade.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("component {name} requires alignment {align}, chunks only guarantee {supported}")]
    UnsupportedAlignment {
        name: &'static str,
        align: usize,
        supported: usize,
    },
}

/// Violations of the chunk layout invariants.
///
/// These indicate a bug in layout computation or in the caller's use of the
/// storage layer, never bad user input. The database logs and aborts on them.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("archetype {archetype} fits zero entities in a {budget} byte chunk ({bytes_per_entity} bytes per entity)")]
    ZeroCapacity {
        archetype: String,
        budget: usize,
        bytes_per_entity: usize,
    },
    #[error("column range {start}..{end} falls outside the {len} byte chunk blob")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("chunk has no column for component {component}")]
    MissingColumn { component: String },
    #[error("column {component} was left unpopulated after migration")]
    UnpopulatedColumn { component: String },
    #[error("component {component} is {expected} bytes in the destination but {actual} bytes in the source")]
    SizeMismatch {
        component: String,
        expected: usize,
        actual: usize,
    },
    #[error("column {component} is not aligned for its element type")]
    Misaligned { component: String },
    #[error("chunk blob allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },
    #[error("chunk blob accessed before allocation")]
    BlobNotAllocated,
    #[error("entity {entity} is stored in a chunk but missing from the entity index")]
    UnknownEntity { entity: EntityId },
    #[error("no entry exists for archetype {archetype}")]
    MissingEntry { archetype: String },
}
