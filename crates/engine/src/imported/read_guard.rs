//! Read guard over an imported attribute
//!
//! Construction order matters: the reference attribute's generation is
//! pinned first, then the target attribute is guarded, then the target lid
//! array is snapshotted, and last the target lid limit is read. The two
//! sides are pinned separately, so the target lid limit may lag the
//! reference mapping; `target_lid` hides any target lid at or beyond it.

use std::sync::Arc;

use attrstore_concurrency::{GenerationGuard, RcuSnapshot};
use attrstore_core::{AttrValue, BasicType, CollectionType, DocId, QueryTerm, Weighted};

use super::{ImportedAttributeVector, ImportedSearchContext};
use crate::attribute::{AttributeVector, EnumHandle, ReadableAttribute};
use crate::guard::{AttributeGuard, AttributeReadGuard};
use crate::search::{SearchContext, SearchParams, TermMatcher};

/// Point-in-time view of an imported attribute
pub struct ImportedAttributeReadGuard {
    imported: Arc<ImportedAttributeVector>,
    _reference_guard: GenerationGuard,
    target_guard: AttributeGuard,
    target_lids: RcuSnapshot<DocId>,
    local_doc_id_limit: DocId,
    target_doc_id_limit: DocId,
}

impl ImportedAttributeReadGuard {
    /// Pin `imported`'s reference and target attributes
    pub fn new(imported: Arc<ImportedAttributeVector>, stable_enum: bool) -> Self {
        let reference = imported.reference();
        let reference_guard = reference.base().take_generation_guard();
        let target_guard = AttributeGuard::new(Arc::clone(imported.target()), stable_enum);
        let target_lids = reference.target_lids_snapshot();
        let target_doc_id_limit = imported.target().committed_doc_id_limit();
        let local_doc_id_limit = reference
            .committed_doc_id_limit()
            .min(target_lids.len() as DocId);
        ImportedAttributeReadGuard {
            imported,
            _reference_guard: reference_guard,
            target_guard,
            target_lids,
            local_doc_id_limit,
            target_doc_id_limit,
        }
    }

    /// Target lid of `lid`; 0 when unmapped, out of range or stale
    #[inline]
    pub fn target_lid(&self, lid: DocId) -> DocId {
        if lid >= self.local_doc_id_limit {
            return 0;
        }
        match self.target_lids.get(lid as usize) {
            Some(target) if target < self.target_doc_id_limit => target,
            _ => 0,
        }
    }

    /// The imported attribute
    pub fn imported(&self) -> &Arc<ImportedAttributeVector> {
        &self.imported
    }

    /// Target attribute, read under this guard
    pub fn target(&self) -> &dyn ReadableAttribute {
        self.target_guard.attribute()
    }

    /// Local lid limit captured at construction
    pub fn local_doc_id_limit(&self) -> DocId {
        self.local_doc_id_limit
    }

    /// Target lid limit captured at construction
    pub fn target_doc_id_limit(&self) -> DocId {
        self.target_doc_id_limit
    }
}

impl AttributeReadGuard for ImportedAttributeReadGuard {
    fn attribute(&self) -> &dyn ReadableAttribute {
        self
    }

    fn is_stable_enum(&self) -> bool {
        self.target_guard.is_stable_enum()
    }
}

impl ReadableAttribute for ImportedAttributeReadGuard {
    fn name(&self) -> &str {
        self.imported.name()
    }

    fn basic_type(&self) -> BasicType {
        self.target().basic_type()
    }

    fn collection_type(&self) -> CollectionType {
        self.target().collection_type()
    }

    fn num_docs(&self) -> DocId {
        self.local_doc_id_limit
    }

    fn committed_doc_id_limit(&self) -> DocId {
        self.local_doc_id_limit
    }

    fn fast_search(&self) -> bool {
        self.target().fast_search()
    }

    fn is_filter(&self) -> bool {
        self.target().is_filter()
    }

    fn is_imported(&self) -> bool {
        true
    }

    fn value_count(&self, lid: DocId) -> u32 {
        self.target().value_count(self.target_lid(lid))
    }

    fn get_int(&self, lid: DocId) -> i64 {
        self.target().get_int(self.target_lid(lid))
    }

    fn get_float(&self, lid: DocId) -> f64 {
        self.target().get_float(self.target_lid(lid))
    }

    fn get_string(&self, lid: DocId) -> String {
        self.target().get_string(self.target_lid(lid))
    }

    fn get_enum(&self, lid: DocId) -> Option<EnumHandle> {
        self.target().get_enum(self.target_lid(lid))
    }

    fn find_enum(&self, value: &str) -> Option<EnumHandle> {
        self.target().find_enum(value)
    }

    fn get_values(&self, lid: DocId) -> Vec<Weighted<AttrValue>> {
        self.target().get_values(self.target_lid(lid))
    }

    fn match_doc(&self, lid: DocId, matcher: &TermMatcher) -> Option<i32> {
        match self.target_lid(lid) {
            0 => None,
            target => self.target().match_doc(target, matcher),
        }
    }

    fn create_search_context(&self, term: &QueryTerm, params: &SearchParams) -> Box<dyn SearchContext + '_> {
        Box::new(ImportedSearchContext::new(self, term, params))
    }

    fn serialize_for_sort(&self, lid: DocId, ascending: bool) -> Vec<u8> {
        self.target().serialize_for_sort(self.target_lid(lid), ascending)
    }
}

impl std::fmt::Debug for ImportedAttributeReadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedAttributeReadGuard")
            .field("name", &self.imported.name())
            .field("local_doc_id_limit", &self.local_doc_id_limit)
            .field("target_doc_id_limit", &self.target_doc_id_limit)
            .finish()
    }
}
