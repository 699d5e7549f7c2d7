//! Attribute read guards
//!
//! A read guard pins an attribute's generation (and optionally shares its
//! enum lock) for as long as it lives. Everything read through the guard
//! stays valid until it is dropped.

use std::sync::Arc;

use attrstore_concurrency::{EnumReadGuard, GenerationGuard};

use crate::attribute::{AttributeVector, ReadableAttribute};

/// Read access to one attribute under a pinned generation
pub trait AttributeReadGuard: Send + Sync {
    /// The guarded attribute
    fn attribute(&self) -> &dyn ReadableAttribute;

    /// Whether enum handles stay stable for the guard's lifetime
    fn is_stable_enum(&self) -> bool;
}

/// Read guard over an owned attribute
pub struct AttributeGuard {
    attribute: Arc<dyn AttributeVector>,
    generation: GenerationGuard,
    enum_guard: Option<EnumReadGuard>,
}

impl AttributeGuard {
    /// Pin `attribute`; with `stable_enum` also share its enum lock
    ///
    /// Taking a stable-enum guard blocks while a writer is changing the
    /// attribute's enum store.
    pub fn new(attribute: Arc<dyn AttributeVector>, stable_enum: bool) -> Self {
        let generation = attribute.base().take_generation_guard();
        let enum_guard = stable_enum.then(|| attribute.base().enum_lock().read());
        AttributeGuard {
            attribute,
            generation,
            enum_guard,
        }
    }

    /// The owned attribute behind the guard
    pub fn vector(&self) -> &Arc<dyn AttributeVector> {
        &self.attribute
    }

    /// Pinned generation
    pub fn generation(&self) -> attrstore_core::Generation {
        self.generation.generation()
    }
}

impl AttributeReadGuard for AttributeGuard {
    fn attribute(&self) -> &dyn ReadableAttribute {
        self.attribute.as_readable()
    }

    fn is_stable_enum(&self) -> bool {
        self.enum_guard.is_some()
    }
}

impl std::fmt::Debug for AttributeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeGuard")
            .field("attribute", &self.attribute.name())
            .field("generation", &self.generation())
            .field("stable_enum", &self.is_stable_enum())
            .finish()
    }
}
