//! Imported attributes: fields of a referenced collection seen locally
//!
//! An imported attribute stores nothing. Reads go local lid → target lid
//! (through the reference attribute) → value (through the target
//! attribute), always under an `ImportedAttributeReadGuard` that pins both
//! sides. Searches evaluate the term on the target attribute and map the
//! hits back through the reverse mapping.

use std::sync::Arc;
use tracing::debug;

use attrstore_core::DEFAULT_MIN_TARGET_HITS_FOR_APPROXIMATION;

use crate::attribute::{AttributeVector, ReadableAttribute};
use crate::metastore::DocumentMetaStore;
use crate::reference::ReferenceAttribute;

pub mod cache;
pub mod merger;
pub mod read_guard;
pub mod repo;
pub mod search_context;

pub use cache::{BitVectorSearchCache, CacheEntry};
pub use merger::PostingListMerger;
pub use read_guard::ImportedAttributeReadGuard;
pub use repo::ImportedAttributesRepo;
pub use search_context::ImportedSearchContext;

/// Value-less view of a target attribute through a reference attribute
pub struct ImportedAttributeVector {
    name: String,
    reference: Arc<ReferenceAttribute>,
    local_meta_store: Arc<DocumentMetaStore>,
    target: Arc<dyn AttributeVector>,
    target_meta_store: Arc<DocumentMetaStore>,
    search_cache: Option<Arc<BitVectorSearchCache>>,
    min_target_hits_for_approximation: u32,
}

impl ImportedAttributeVector {
    /// Import `target` under `name` through `reference`
    pub fn new(
        name: impl Into<String>,
        reference: Arc<ReferenceAttribute>,
        local_meta_store: Arc<DocumentMetaStore>,
        target: Arc<dyn AttributeVector>,
        target_meta_store: Arc<DocumentMetaStore>,
        use_search_cache: bool,
    ) -> Self {
        ImportedAttributeVector {
            name: name.into(),
            reference,
            local_meta_store,
            target,
            target_meta_store,
            search_cache: use_search_cache.then(|| Arc::new(BitVectorSearchCache::new())),
            min_target_hits_for_approximation: DEFAULT_MIN_TARGET_HITS_FOR_APPROXIMATION,
        }
    }

    /// Target hit count from which hit estimates are scaled instead of counted
    pub fn with_min_target_hits_for_approximation(mut self, hits: u32) -> Self {
        self.min_target_hits_for_approximation = hits;
        self
    }

    /// Imported attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference attribute doing the lid translation
    pub fn reference(&self) -> &Arc<ReferenceAttribute> {
        &self.reference
    }

    /// Meta store of the referring collection
    pub fn local_meta_store(&self) -> &Arc<DocumentMetaStore> {
        &self.local_meta_store
    }

    /// Attribute values are read from
    pub fn target(&self) -> &Arc<dyn AttributeVector> {
        &self.target
    }

    /// Meta store of the referenced collection
    pub fn target_meta_store(&self) -> &Arc<DocumentMetaStore> {
        &self.target_meta_store
    }

    /// Search cache, when enabled
    pub fn search_cache(&self) -> Option<&Arc<BitVectorSearchCache>> {
        self.search_cache.as_ref()
    }

    /// Threshold between exact and scaled hit estimates
    pub fn min_target_hits_for_approximation(&self) -> u32 {
        self.min_target_hits_for_approximation
    }

    /// Consistent read view over reference and target
    pub fn make_read_guard(self: &Arc<Self>, stable_enum: bool) -> ImportedAttributeReadGuard {
        ImportedAttributeReadGuard::new(Arc::clone(self), stable_enum)
    }

    /// Drop every cached search result
    pub fn clear_search_cache(&self) {
        if let Some(cache) = &self.search_cache {
            cache.clear();
            debug!(target: "attr::imported", name = %self.name, "Cleared imported search cache");
        }
    }
}

impl std::fmt::Debug for ImportedAttributeVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedAttributeVector")
            .field("name", &self.name)
            .field("reference", &self.reference.name())
            .field("target", &self.target.name())
            .field("search_cache", &self.search_cache.is_some())
            .finish()
    }
}
