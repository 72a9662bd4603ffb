// query.rs - Required-component filters

use crate::db::{Archetype, Component, ComponentRegistry, ComponentType};

/// A set of required component types.
///
/// The compiled bitmask is cached on the query after its first run and reset
/// whenever the requirement list changes.
#[derive(Clone, Debug, Default)]
pub struct ComponentQuery {
    required: Vec<ComponentType>,
    cached_archetype: Option<Archetype>,
}

impl ComponentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require component `T`. Requiring the same type twice is a no-op.
    pub fn require<T: Component>(&mut self) -> &mut Self {
        let ty = ComponentType::of::<T>();
        if !self.required.contains(&ty) {
            self.required.push(ty);
            self.cached_archetype = None;
        }
        self
    }

    /// Builder-style `require`.
    pub fn with<T: Component>(mut self) -> Self {
        self.require::<T>();
        self
    }

    #[inline]
    pub fn required(&self) -> &[ComponentType] {
        &self.required
    }

    /// Whether the bitmask has been compiled.
    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.cached_archetype.is_some()
    }

    pub(crate) fn archetype(&mut self, registry: &ComponentRegistry) -> &Archetype {
        let required = &self.required;
        self.cached_archetype
            .get_or_insert_with(|| registry.archetype_from_types(required))
    }
}
