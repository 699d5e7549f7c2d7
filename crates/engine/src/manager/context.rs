//! Per-reader attribute guard cache

use dashmap::DashMap;
use std::sync::Arc;

use super::AttributeManager;
use crate::guard::AttributeReadGuard;

/// Read guards taken by one reader, one per (name, stable enum)
///
/// Repeated lookups within one request return the same guard, so every
/// read of an attribute in that request sees the same generation.
pub struct AttributeContext<'a> {
    manager: &'a AttributeManager,
    guards: DashMap<(String, bool), Arc<dyn AttributeReadGuard>>,
}

impl<'a> AttributeContext<'a> {
    pub(crate) fn new(manager: &'a AttributeManager) -> Self {
        AttributeContext {
            manager,
            guards: DashMap::new(),
        }
    }

    /// Guard for `name`, owned or imported
    pub fn get_attribute(&self, name: &str) -> Option<Arc<dyn AttributeReadGuard>> {
        self.guard(name, false)
    }

    /// Guard for `name` that also keeps enum handles stable
    pub fn get_attribute_stable_enum(&self, name: &str) -> Option<Arc<dyn AttributeReadGuard>> {
        self.guard(name, true)
    }

    /// Drop every stable-enum guard so enum writers can proceed
    pub fn release_enum_guards(&self) {
        self.guards.retain(|(_, stable), _| !*stable);
    }

    /// Number of cached guards
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether no guard is cached
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    fn guard(&self, name: &str, stable_enum: bool) -> Option<Arc<dyn AttributeReadGuard>> {
        let key = (name.to_string(), stable_enum);
        if let Some(guard) = self.guards.get(&key) {
            return Some(Arc::clone(guard.value()));
        }
        let guard = self.manager.get_attribute_read_guard(name, stable_enum)?;
        Some(Arc::clone(self.guards.entry(key).or_insert(guard).value()))
    }
}

impl std::fmt::Debug for AttributeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeContext")
            .field("guards", &self.guards.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrstore_core::{AttributeConfig, BasicType, CollectionType, ManagerSettings};

    fn manager(dir: &std::path::Path) -> AttributeManager {
        let m = AttributeManager::new(ManagerSettings {
            base_dir: dir.to_path_buf(),
            ..ManagerSettings::default()
        });
        m.add_vector("s", AttributeConfig::new(BasicType::String, CollectionType::Single));
        m
    }

    #[test]
    fn test_guard_reused_within_context() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let ctx = m.create_context();
        let a = ctx.get_attribute("s").unwrap();
        let b = ctx.get_attribute("s").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(ctx.get_attribute("missing").is_none());
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_release_enum_guards_unblocks_writer() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let attr = m.get_attribute("s").unwrap();
        let ctx = m.create_context();
        let stable = ctx.get_attribute_stable_enum("s").unwrap();
        assert!(stable.is_stable_enum());
        ctx.get_attribute("s").unwrap();
        drop(stable);
        assert!(attr.base().enum_lock().is_locked());

        ctx.release_enum_guards();
        assert_eq!(ctx.len(), 1);
        assert!(!attr.base().enum_lock().is_locked());
        attr.add_docs(1).unwrap();
        attr.update_string(1, "x");
        attr.commit(false);
        assert_eq!(ctx.get_attribute("s").unwrap().attribute().get_string(1), "x");
    }
}
