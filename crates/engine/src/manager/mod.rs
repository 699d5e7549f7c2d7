//! Attribute manager: the per-collection attribute registry
//!
//! Attributes are registered by name and loaded lazily on first access,
//! at most once per name even when many readers ask at the same time. The
//! first caller flips the slot to `Loading` and performs the load with the
//! registry lock released; later callers wait on the same pending load and
//! all of them observe the one resulting instance.
//!
//! ```text
//! Registered ──first get──▶ Loading ──ok──▶ Ready
//!      ▲                       │
//!      └────────failed─────────┘
//! ```
//!
//! Imported attributes live in a separate repo and are served through the
//! same read-guard entry point.

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use attrstore_concurrency::Interlock;
use attrstore_core::{AttributeConfig, AttributesConfig, ImportedSpec, ManagerSettings, Result};
use attrstore_storage::AttributeReader;

use crate::attribute::{create_attribute, AttributeVector};
use crate::guard::{AttributeGuard, AttributeReadGuard};
use crate::imported::{ImportedAttributeVector, ImportedAttributesRepo};
use crate::metastore::{DocumentMetaStore, GidToLidChangeListener};
use crate::reference::ReferenceAttribute;

pub mod context;

pub use context::AttributeContext;

/// Builds an empty attribute from its name, config and base file name
pub type AttributeFactory =
    dyn Fn(&str, &AttributeConfig, &Path) -> Result<Arc<dyn AttributeVector>> + Send + Sync;

/// A load in progress that other callers can wait for
struct PendingLoad {
    result: Mutex<Option<Option<Arc<dyn AttributeVector>>>>,
    done: Condvar,
}

impl PendingLoad {
    fn new() -> Self {
        PendingLoad {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn finish(&self, attribute: Option<Arc<dyn AttributeVector>>) {
        *self.result.lock() = Some(attribute);
        self.done.notify_all();
    }

    fn wait(&self) -> Option<Arc<dyn AttributeVector>> {
        let mut result = self.result.lock();
        while result.is_none() {
            self.done.wait(&mut result);
        }
        result.clone().flatten()
    }
}

enum SlotState {
    Registered,
    Loading(Arc<PendingLoad>),
    Ready(Arc<dyn AttributeVector>),
}

struct Slot {
    config: AttributeConfig,
    state: SlotState,
}

/// Outcome of inspecting a slot under the registry lock
enum Access {
    Ready(Arc<dyn AttributeVector>),
    Wait(Arc<PendingLoad>),
    Load(Arc<PendingLoad>, AttributeConfig),
}

/// Resets the slot and wakes waiters if the loader unwinds
struct LoadTicket<'a> {
    manager: &'a AttributeManager,
    name: &'a str,
    pending: Arc<PendingLoad>,
    finished: bool,
}

impl LoadTicket<'_> {
    fn finish(mut self, attribute: Option<Arc<dyn AttributeVector>>) -> Option<Arc<dyn AttributeVector>> {
        self.manager.settle(self.name, attribute.clone());
        self.pending.finish(attribute.clone());
        self.finished = true;
        attribute
    }
}

impl Drop for LoadTicket<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.manager.settle(self.name, None);
            self.pending.finish(None);
        }
    }
}

/// Registry of one collection's attributes
pub struct AttributeManager {
    settings: ManagerSettings,
    slots: Mutex<FxHashMap<String, Slot>>,
    factory: Box<AttributeFactory>,
    interlock: Arc<Interlock>,
    imported: ImportedAttributesRepo,
}

impl AttributeManager {
    /// Manager creating stores with the default factory
    pub fn new(settings: ManagerSettings) -> Self {
        Self::with_factory(settings, Box::new(|name: &str, config: &AttributeConfig, base: &Path| {
            create_attribute(name, config, base)
        }))
    }

    /// Manager creating stores through `factory`
    pub fn with_factory(settings: ManagerSettings, factory: Box<AttributeFactory>) -> Self {
        AttributeManager {
            settings,
            slots: Mutex::new(FxHashMap::default()),
            factory,
            interlock: Arc::new(Interlock::new()),
            imported: ImportedAttributesRepo::new(),
        }
    }

    /// Manager with every `[[attribute]]` of `config` registered
    ///
    /// `[[imported]]` entries need the referenced collection and are wired
    /// separately through [`AttributeManager::add_imported_from_spec`].
    pub fn from_config(config: &AttributesConfig) -> Self {
        let manager = Self::new(config.manager.clone());
        for spec in &config.attributes {
            manager.add_vector(&spec.name, spec.config.clone());
        }
        manager
    }

    /// Manager settings
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Register `name` with `config`
    ///
    /// Registering an existing name succeeds only if basic type and
    /// collection type match the existing registration; a conflict is
    /// logged and returns false.
    pub fn add_vector(&self, name: &str, config: AttributeConfig) -> bool {
        let mut slots = self.slots.lock();
        if let Some(existing) = slots.get(name) {
            if existing.config.is_type_compatible(&config) {
                return true;
            }
            warn!(
                target: "attr::manager",
                name,
                existing_datatype = existing.config.basic_type.as_str(),
                existing_collectiontype = existing.config.collection_type.as_str(),
                requested_datatype = config.basic_type.as_str(),
                requested_collectiontype = config.collection_type.as_str(),
                "Attribute type conflict"
            );
            return false;
        }
        debug!(target: "attr::manager", name, datatype = config.basic_type.as_str(), "Registered attribute");
        slots.insert(
            name.to_string(),
            Slot {
                config,
                state: SlotState::Registered,
            },
        );
        true
    }

    /// Registered attribute names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` is loaded
    pub fn is_loaded(&self, name: &str) -> bool {
        matches!(
            self.slots.lock().get(name).map(|s| &s.state),
            Some(SlotState::Ready(_))
        )
    }

    /// Attribute named `name`, loading it on first access
    ///
    /// Returns `None` for unknown names and failed loads. A failed load
    /// leaves the attribute registered, so a later call retries.
    pub fn get_attribute(&self, name: &str) -> Option<Arc<dyn AttributeVector>> {
        let access = {
            let mut slots = self.slots.lock();
            let slot = slots.get_mut(name)?;
            match &slot.state {
                SlotState::Ready(attribute) => Access::Ready(Arc::clone(attribute)),
                SlotState::Loading(pending) => Access::Wait(Arc::clone(pending)),
                SlotState::Registered => {
                    let pending = Arc::new(PendingLoad::new());
                    slot.state = SlotState::Loading(Arc::clone(&pending));
                    Access::Load(pending, slot.config.clone())
                }
            }
        };
        match access {
            Access::Ready(attribute) => Some(attribute),
            Access::Wait(pending) => pending.wait(),
            Access::Load(pending, config) => {
                let ticket = LoadTicket {
                    manager: self,
                    name,
                    pending,
                    finished: false,
                };
                let attribute = self.load_attribute(name, &config);
                ticket.finish(attribute)
            }
        }
    }

    /// Read guard for an owned or imported attribute
    ///
    /// Imported names take precedence. Unknown names give `None`.
    pub fn get_attribute_read_guard(&self, name: &str, stable_enum: bool) -> Option<Arc<dyn AttributeReadGuard>> {
        if let Some(imported) = self.imported.get(name) {
            return Some(Arc::new(imported.make_read_guard(stable_enum)));
        }
        let attribute = self.get_attribute(name)?;
        Some(Arc::new(AttributeGuard::new(attribute, stable_enum)))
    }

    /// Every owned attribute that loads, in name order
    pub fn get_attribute_list(&self) -> Vec<Arc<dyn AttributeVector>> {
        self.names()
            .iter()
            .filter_map(|name| self.get_attribute(name))
            .collect()
    }

    /// Per-reader guard cache over this manager
    pub fn create_context(&self) -> AttributeContext<'_> {
        AttributeContext::new(self)
    }

    /// Imported attributes of this collection
    pub fn imported_attributes(&self) -> &ImportedAttributesRepo {
        &self.imported
    }

    /// Register an imported attribute
    pub fn add_imported(&self, attribute: Arc<ImportedAttributeVector>) {
        self.imported.add(attribute);
    }

    /// Wire an `[[imported]]` entry against the referenced collection
    ///
    /// The reference attribute is looked up here and the target attribute in
    /// `target_manager`. The reference attribute is subscribed to
    /// `target_meta_store` and its target lids populated from it. Returns
    /// false (logged) if either attribute is missing or the reference is not
    /// a reference attribute.
    pub fn add_imported_from_spec(
        &self,
        spec: &ImportedSpec,
        local_meta_store: Arc<DocumentMetaStore>,
        target_manager: &AttributeManager,
        target_meta_store: Arc<DocumentMetaStore>,
    ) -> bool {
        let reference = self
            .get_attribute(&spec.reference)
            .and_then(|a| a.into_any().downcast::<ReferenceAttribute>().ok());
        let Some(reference) = reference else {
            warn!(target: "attr::manager", name = %spec.name, reference = %spec.reference, "Missing reference attribute");
            return false;
        };
        let Some(target) = target_manager.get_attribute(&spec.target) else {
            warn!(target: "attr::manager", name = %spec.name, target_attr = %spec.target, "Missing target attribute");
            return false;
        };

        let subscribed = self
            .imported
            .all()
            .iter()
            .any(|i| Arc::ptr_eq(i.reference(), &reference));
        if !subscribed {
            target_meta_store.add_listener(Arc::clone(&reference) as Arc<dyn GidToLidChangeListener>);
            reference.populate_target_lids(&target_meta_store);
        }

        let imported = ImportedAttributeVector::new(
            spec.name.clone(),
            reference,
            local_meta_store,
            target,
            target_meta_store,
            spec.search_cache,
        )
        .with_min_target_hits_for_approximation(self.settings.min_target_hits_for_approximation);
        self.add_imported(Arc::new(imported));
        info!(
            target: "attr::manager",
            name = %spec.name,
            reference = %spec.reference,
            target_attr = %spec.target,
            search_cache = spec.search_cache,
            "Added imported attribute"
        );
        true
    }

    /// Drop cached imported search results
    pub fn clear_imported_search_caches(&self) {
        self.imported.clear_search_caches();
    }

    /// Save every loaded attribute to its base file name
    pub fn save_all(&self) -> Result<()> {
        let loaded: Vec<Arc<dyn AttributeVector>> = self
            .slots
            .lock()
            .values()
            .filter_map(|slot| match &slot.state {
                SlotState::Ready(attribute) => Some(Arc::clone(attribute)),
                _ => None,
            })
            .collect();
        for attribute in loaded {
            attribute.save()?;
        }
        Ok(())
    }

    fn load_attribute(&self, name: &str, config: &AttributeConfig) -> Option<Arc<dyn AttributeVector>> {
        let base_file_name = self.settings.base_dir.join(name);
        let attribute = match (self.factory)(name, config, &base_file_name) {
            Ok(attribute) => attribute,
            Err(e) => {
                warn!(target: "attr::manager", name, error = %e, "Failed to create attribute");
                return None;
            }
        };
        let base = attribute.base();
        base.set_interlock(Arc::clone(&self.interlock));
        base.set_stats_interval(Duration::from_millis(self.settings.stats_interval_ms));

        if AttributeReader::exists(&base_file_name) {
            if !attribute.load() {
                return None;
            }
        } else {
            attribute.add_reserved_doc();
            debug!(target: "attr::manager", name, "No saved attribute, starting empty");
        }
        info!(
            target: "attr::manager",
            name,
            committed_doc_id_limit = attribute.committed_doc_id_limit(),
            "Attribute ready"
        );
        Some(attribute)
    }

    fn settle(&self, name: &str, attribute: Option<Arc<dyn AttributeVector>>) {
        if let Some(slot) = self.slots.lock().get_mut(name) {
            slot.state = match attribute {
                Some(attribute) => SlotState::Ready(attribute),
                None => SlotState::Registered,
            };
        }
    }
}

impl std::fmt::Debug for AttributeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeManager")
            .field("base_dir", &self.settings.base_dir)
            .field("attributes", &self.names())
            .field("imported", &self.imported.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrstore_core::{BasicType, CollectionType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn int_config() -> AttributeConfig {
        AttributeConfig::new(BasicType::Int32, CollectionType::Single)
    }

    fn manager_in(dir: &Path) -> AttributeManager {
        AttributeManager::new(ManagerSettings {
            base_dir: dir.to_path_buf(),
            ..ManagerSettings::default()
        })
    }

    #[test]
    fn test_unknown_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager_in(dir.path());
        assert!(m.get_attribute("nope").is_none());
        assert!(m.get_attribute_read_guard("nope", false).is_none());
    }

    #[test]
    fn test_type_conflict_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager_in(dir.path());
        assert!(m.add_vector("a", int_config()));
        assert!(m.add_vector("a", int_config().with_fast_search(true)));
        assert!(!m.add_vector("a", AttributeConfig::new(BasicType::Int32, CollectionType::Array)));
        assert!(!m.add_vector("a", AttributeConfig::new(BasicType::Int64, CollectionType::Single)));
    }

    #[test]
    fn test_lazy_load_creates_reserved_doc() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager_in(dir.path());
        m.add_vector("a", int_config());
        assert!(!m.is_loaded("a"));
        let a = m.get_attribute("a").unwrap();
        assert!(m.is_loaded("a"));
        assert_eq!(a.committed_doc_id_limit(), 1);
        assert!(Arc::ptr_eq(&a, &m.get_attribute("a").unwrap()));
    }

    #[test]
    fn test_loads_saved_attribute() {
        let dir = tempfile::tempdir().unwrap();
        {
            let m = manager_in(dir.path());
            m.add_vector("a", int_config());
            let a = m.get_attribute("a").unwrap();
            a.add_docs(2).unwrap();
            a.update_int(2, 42);
            a.commit(false);
            m.save_all().unwrap();
        }
        let m = manager_in(dir.path());
        m.add_vector("a", int_config());
        let a = m.get_attribute("a").unwrap();
        assert_eq!(a.committed_doc_id_limit(), 3);
        assert_eq!(a.get_int(2), 42);
    }

    #[test]
    fn test_failed_load_reverts_to_registered() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let m = AttributeManager::with_factory(
            ManagerSettings {
                base_dir: dir.path().to_path_buf(),
                ..ManagerSettings::default()
            },
            Box::new(move |name: &str, _config: &AttributeConfig, _base: &Path| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(attrstore_core::Error::Config(format!("no store for {}", name)))
            }),
        );
        m.add_vector("a", int_config());
        assert!(m.get_attribute("a").is_none());
        assert!(!m.is_loaded("a"));
        assert!(m.get_attribute("a").is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mismatched_saved_type_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let m = manager_in(dir.path());
            m.add_vector("a", int_config());
            m.get_attribute("a").unwrap();
            m.save_all().unwrap();
        }
        let m = manager_in(dir.path());
        m.add_vector("a", AttributeConfig::new(BasicType::Double, CollectionType::Single));
        assert!(m.get_attribute("a").is_none());
    }

    #[test]
    fn test_from_config_and_attribute_list() {
        let text = r#"
[[attribute]]
name = "b"
datatype = "string"

[[attribute]]
name = "a"
datatype = "int8"
collectiontype = "array"
"#;
        let mut config = AttributesConfig::from_toml_str(text).unwrap();
        let dir = tempfile::tempdir().unwrap();
        config.manager.base_dir = dir.path().to_path_buf();
        let m = AttributeManager::from_config(&config);
        let names: Vec<String> = m.get_attribute_list().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
