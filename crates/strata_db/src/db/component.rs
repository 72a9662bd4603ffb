// component.rs - Component types and the per-database registry
//
// Components are plain-old-data values identified by their Rust TypeId.
// Each database assigns every registered type a bit position in registration
// order; that bit doubles as the component's id everywhere inside storage.

use crate::db::storage::BLOB_ALIGN;
use crate::db::Archetype;
use crate::error::DatabaseError;
use bytemuck::Pod;
use std::any::TypeId;
use std::collections::HashMap;
use std::mem::{align_of, size_of};
use tracing::{error, warn};

/// Archetype bit position of a registered component type.
pub type ComponentId = u32;

/// Trait for storable component values.
///
/// `Pod` guarantees the value can be copied byte-for-byte in and out of chunk
/// memory and that any byte pattern read back is a valid value. Zero-sized
/// marker components are allowed.
pub trait Component: Pod + Send + Sync {
    /// Human-readable name used in logs and name-based archetype lookups.
    const NAME: &'static str;
}

/// Helper macro to implement the Component trait.
///
/// # Example
/// ```ignore
/// #[repr(C)]
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// struct Position { x: f32, y: f32, z: f32 }
///
/// define_component!(Position, "Position");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $name:expr) => {
        impl $crate::db::Component for $ty {
            const NAME: &'static str = $name;
        }
    };
    ($ty:ty) => {
        $crate::define_component!($ty, stringify!($ty));
    };
}

/// Layout descriptor handed to `Database::initialize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentType {
    type_id: TypeId,
    name: &'static str,
    size: usize,
    align: usize,
}

impl ComponentType {
    /// Describe a Rust component type.
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
            size: size_of::<T>(),
            align: align_of::<T>(),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }
}

/// Registered component metadata. Immutable once the registry is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentInfo {
    pub name: &'static str,
    pub archetype_bit: ComponentId,
    pub byte_size: usize,
    pub alignment: usize,
    pub type_id: TypeId,
}

/// Fixed table of component types known to one database.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    by_type: HashMap<TypeId, ComponentId>,
    by_name: HashMap<&'static str, ComponentId>,
}

impl ComponentRegistry {
    /// Build the registry, assigning bits in slice order.
    ///
    /// Repeated types are skipped with a warning. Types whose alignment exceeds
    /// what a chunk blob guarantees are rejected.
    pub fn new(types: &[ComponentType]) -> Result<Self, DatabaseError> {
        let mut registry = Self::default();

        for ty in types {
            if registry.by_type.contains_key(&ty.type_id) {
                warn!(component = ty.name, "component type registered twice, ignoring duplicate");
                continue;
            }
            if ty.align > BLOB_ALIGN {
                return Err(DatabaseError::UnsupportedAlignment {
                    name: ty.name,
                    align: ty.align,
                    supported: BLOB_ALIGN,
                });
            }

            let bit = registry.infos.len() as ComponentId;
            registry.infos.push(ComponentInfo {
                name: ty.name,
                archetype_bit: bit,
                byte_size: ty.size,
                alignment: ty.align,
                type_id: ty.type_id,
            });
            registry.by_type.insert(ty.type_id, bit);
            if registry.by_name.insert(ty.name, bit).is_some() {
                warn!(component = ty.name, "two component types share a name, name lookups resolve to the later one");
            }
        }

        Ok(registry)
    }

    /// Number of registered types (and bit length of every archetype).
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }

    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id as usize)
    }

    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.id_of_type(TypeId::of::<T>())
    }

    pub fn id_of_type(&self, type_id: TypeId) -> Option<ComponentId> {
        self.by_type.get(&type_id).copied()
    }

    pub fn id_of_name(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    /// The all-zero archetype sized for this registry.
    pub fn bare_archetype(&self) -> Archetype {
        Archetype::bare(self.len())
    }

    /// Build an archetype from component names. Unknown names are logged and skipped.
    pub fn archetype_from_names(&self, names: &[&str]) -> Archetype {
        let mut archetype = self.bare_archetype();
        for name in names {
            match self.id_of_name(name) {
                Some(bit) => archetype.insert(bit),
                None => error!(component = *name, "unknown component type name, skipping"),
            }
        }
        archetype
    }

    /// Build an archetype from component descriptors. Unknown types are logged and skipped.
    pub fn archetype_from_types(&self, types: &[ComponentType]) -> Archetype {
        let mut archetype = self.bare_archetype();
        for ty in types {
            match self.id_of_type(ty.type_id) {
                Some(bit) => archetype.insert(bit),
                None => error!(component = ty.name, "unknown component type, skipping"),
            }
        }
        archetype
    }

    /// Readable label such as `[Position, Tag]`.
    pub fn describe(&self, archetype: &Archetype) -> String {
        let names: Vec<&str> = archetype
            .components()
            .map(|bit| self.info(bit).map_or("?", |info| info.name))
            .collect();
        format!("[{}]", names.join(", "))
    }
}
