//! Strata Database
//!
//! In-memory, archetype-based entity-component storage:
//! - Component type registry and archetype bitsets
//! - Chunked columnar storage with manual layout and alignment
//! - Entity migration between archetypes
//! - Cached, version-stamped query results

pub mod config;
pub mod db;
pub mod error;
pub mod telemetry;

pub use bytemuck;
pub use config::DatabaseConfig;
pub use db::{
    Archetype, Component, ComponentId, ComponentInfo, ComponentQuery, ComponentRegistry,
    ComponentType, Composition, Database, EntityId, QueryIterator,
};
pub use error::{ConfigError, DatabaseError, StorageError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
