//! Name to imported attribute registry

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::ImportedAttributeVector;

/// Imported attributes of one collection, by name
#[derive(Debug, Default)]
pub struct ImportedAttributesRepo {
    attributes: RwLock<BTreeMap<String, Arc<ImportedAttributeVector>>>,
}

impl ImportedAttributesRepo {
    /// Empty repo
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `attribute` under its own name, replacing any previous one
    pub fn add(&self, attribute: Arc<ImportedAttributeVector>) {
        let name = attribute.name().to_string();
        debug!(target: "attr::imported", name = %name, "Registered imported attribute");
        self.attributes.write().insert(name, attribute);
    }

    /// Imported attribute named `name`
    pub fn get(&self, name: &str) -> Option<Arc<ImportedAttributeVector>> {
        self.attributes.read().get(name).cloned()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.attributes.read().keys().cloned().collect()
    }

    /// Every registered imported attribute
    pub fn all(&self) -> Vec<Arc<ImportedAttributeVector>> {
        self.attributes.read().values().cloned().collect()
    }

    /// Number of registered attributes
    pub fn len(&self) -> usize {
        self.attributes.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the search cache of every registered attribute
    pub fn clear_search_caches(&self) {
        for attribute in self.attributes.read().values() {
            attribute.clear_search_cache();
        }
    }
}
