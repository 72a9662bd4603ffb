// builder.rs - Component payloads handed to add/update calls

use crate::db::{Component, ComponentType};

/// Owned byte payload for a single component value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentPayload {
    component_type: ComponentType,
    bytes: Box<[u8]>,
}

impl ComponentPayload {
    /// Capture a Rust-typed component by value.
    pub fn new<T: Component>(value: T) -> Self {
        Self {
            component_type: ComponentType::of::<T>(),
            bytes: bytemuck::bytes_of(&value).into(),
        }
    }

    #[inline]
    pub fn component_type(&self) -> &ComponentType {
        &self.component_type
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Builder for the set of component values an entity is created or updated with.
///
/// Each component type appears at most once; adding a type again replaces
/// the earlier value.
#[derive(Clone, Debug, Default)]
pub struct Composition {
    payloads: Vec<ComponentPayload>,
}

impl Composition {
    /// Create a new empty composition (bare entities).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component by value.
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Add or replace a component value in place.
    pub fn insert<T: Component>(&mut self, value: T) -> &mut Self {
        self.insert_payload(ComponentPayload::new(value))
    }

    /// Add or replace a pre-built payload.
    pub fn insert_payload(&mut self, payload: ComponentPayload) -> &mut Self {
        let type_id = payload.component_type.type_id();
        match self
            .payloads
            .iter_mut()
            .find(|existing| existing.component_type.type_id() == type_id)
        {
            Some(existing) => *existing = payload,
            None => self.payloads.push(payload),
        }
        self
    }

    pub fn contains<T: Component>(&self) -> bool {
        let wanted = ComponentType::of::<T>().type_id();
        self.payloads
            .iter()
            .any(|payload| payload.component_type.type_id() == wanted)
    }

    #[inline]
    pub fn payloads(&self) -> &[ComponentPayload] {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}
