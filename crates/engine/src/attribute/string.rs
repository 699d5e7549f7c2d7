//! Single-value string attribute backed by an enum store

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use attrstore_concurrency::RcuVector;
use attrstore_core::{AttrValue, AttributeConfig, DocId, Error, Generation, QueryTerm, Result, Weighted};
use attrstore_storage::{AttributeReader, FileKind, SaveTarget};

use super::enum_store::EMPTY_HANDLE;
use super::{
    attribute_vector_plumbing, check_fixed_width_body, delegate_base_metadata, sort_blob,
    AttributeBase, AttributeVector, ElementValue, EnumHandle, EnumStore, ReadableAttribute,
    StoreStats,
};
use crate::search::{AttributeSearchContext, SearchContext, SearchParams, TermMatcher};

#[derive(Debug, Clone)]
enum Change {
    Assign(DocId, String),
    Clear(DocId),
}

/// One string per document, stored as enum handles
pub struct SingleValueStringAttribute {
    base: AttributeBase,
    enum_store: EnumStore,
    handles: RcuVector<EnumHandle>,
    changes: Mutex<Vec<Change>>,
}

impl SingleValueStringAttribute {
    /// Create an empty attribute
    pub fn new(name: impl Into<String>, config: AttributeConfig, base_file_name: impl Into<PathBuf>) -> Self {
        let base = AttributeBase::new(name, config, base_file_name);
        let handles = RcuVector::new(Arc::clone(base.generation_holder()));
        SingleValueStringAttribute {
            base,
            enum_store: EnumStore::new(),
            handles,
            changes: Mutex::new(Vec::new()),
        }
    }

    /// The dictionary
    pub fn enum_store(&self) -> &EnumStore {
        &self.enum_store
    }

    fn handle(&self, lid: DocId) -> EnumHandle {
        self.handles.get(lid as usize).unwrap_or(EMPTY_HANDLE)
    }

    /// Committed value of `lid`
    pub fn get(&self, lid: DocId) -> Arc<str> {
        self.enum_store
            .get(self.handle(lid))
            .unwrap_or_else(|| Arc::from(""))
    }

    fn in_range(&self, lid: DocId) -> bool {
        (lid as usize) < self.handles.len()
    }

    fn buffer(&self, lid: DocId, change: Change) -> bool {
        if !self.in_range(lid) {
            return false;
        }
        self.changes.lock().push(change);
        true
    }

    fn assign_handle(&self, lid: DocId, handle: EnumHandle) {
        let old = self.handle(lid);
        self.enum_store.inc_ref(handle);
        self.handles.set(lid as usize, handle);
        self.enum_store.dec_ref(old);
    }
}

impl ReadableAttribute for SingleValueStringAttribute {
    delegate_base_metadata!();

    fn value_count(&self, lid: DocId) -> u32 {
        self.in_range(lid) as u32
    }

    fn get_int(&self, lid: DocId) -> i64 {
        self.get(lid).parse().unwrap_or(0)
    }

    fn get_float(&self, lid: DocId) -> f64 {
        self.get(lid).parse().unwrap_or(0.0)
    }

    fn get_string(&self, lid: DocId) -> String {
        self.get(lid).to_string()
    }

    fn get_enum(&self, lid: DocId) -> Option<EnumHandle> {
        self.in_range(lid).then(|| self.handle(lid))
    }

    fn find_enum(&self, value: &str) -> Option<EnumHandle> {
        self.enum_store.find(value)
    }

    fn get_values(&self, lid: DocId) -> Vec<Weighted<AttrValue>> {
        if !self.in_range(lid) {
            return Vec::new();
        }
        vec![Weighted::new(AttrValue::String(self.get_string(lid)), 1)]
    }

    fn match_doc(&self, lid: DocId, matcher: &TermMatcher) -> Option<i32> {
        let value = self.get(lid);
        (!value.is_empty() && matcher.matches_str(&value)).then_some(1)
    }

    fn create_search_context(&self, term: &QueryTerm, params: &SearchParams) -> Box<dyn SearchContext + '_> {
        Box::new(AttributeSearchContext::new(self, term, params))
    }

    fn serialize_for_sort(&self, lid: DocId, ascending: bool) -> Vec<u8> {
        sort_blob::serialize_str(&self.get(lid), ascending)
    }
}

impl AttributeVector for SingleValueStringAttribute {
    attribute_vector_plumbing!();

    fn grow(&self, num_docs: DocId) -> bool {
        let old_len = self.handles.len();
        self.handles.ensure_size(num_docs as usize, EMPTY_HANDLE);
        for _ in old_len..self.handles.len() {
            self.enum_store.inc_ref(EMPTY_HANDLE);
        }
        true
    }

    fn clear_doc(&self, lid: DocId) -> u32 {
        self.buffer(lid, Change::Clear(lid)) as u32
    }

    fn on_commit(&self) {
        let changes = std::mem::take(&mut *self.changes.lock());
        if changes.is_empty() {
            return;
        }
        let _modifier = self.base.enum_modifier();
        let mut updates = 0u64;
        for change in changes {
            match change {
                Change::Assign(lid, value) => {
                    let handle = self.enum_store.insert(&value);
                    self.assign_handle(lid, handle);
                    updates += 1;
                }
                Change::Clear(lid) => self.assign_handle(lid, EMPTY_HANDLE),
            }
        }
        self.base.update_status(|s| s.updates += updates);
    }

    fn store_stats(&self) -> StoreStats {
        let mut memory = self.handles.memory_usage();
        memory += self.enum_store.memory_usage();
        StoreStats {
            num_values: self.handles.len() as u64,
            num_unique_values: self.enum_store.num_unique() as u64,
            memory,
        }
    }

    fn on_shrink_lid_space(&self, limit: DocId) {
        let len = self.handles.len() as DocId;
        for lid in limit..len {
            self.enum_store.dec_ref(self.handle(lid));
        }
        self.handles.shrink(limit as usize);
    }

    fn enumerated_save(&self) -> bool {
        true
    }

    fn before_inc_generation(&self, current: Generation) {
        self.enum_store.assign_generation(current);
    }

    fn reclaim_memory(&self, oldest_used: Generation) {
        self.base.generation_holder().reclaim(oldest_used);
        self.enum_store.reclaim(oldest_used);
    }

    /// `.udat` holds the sorted unique values, `.dat` one index per lid
    fn on_save(&self, target: &mut dyn SaveTarget, doc_id_limit: DocId) -> Result<()> {
        let values: Vec<Arc<str>> = (0..doc_id_limit).map(|lid| self.get(lid)).collect();
        let unique: BTreeMap<&str, u32> = {
            let mut sorted: Vec<&str> = values.iter().map(|v| &**v).collect();
            sorted.sort_unstable();
            sorted.dedup();
            sorted.into_iter().zip(0u32..).collect()
        };

        let udat = target.writer(FileKind::Udat);
        for value in unique.keys() {
            value.to_string().encode(udat);
        }
        let dat = target.writer(FileKind::Dat);
        for value in &values {
            dat.write_u32::<LittleEndian>(unique[&**value])?;
        }
        Ok(())
    }

    fn on_load(&self, reader: &AttributeReader) -> Result<()> {
        let name = self.base.name();
        let limit = reader.header().doc_id_limit as usize;
        let mut udat = reader.body(FileKind::Udat);
        let mut unique = Vec::new();
        while !udat.is_empty() {
            unique.push(String::decode(&mut udat).map_err(|e| Error::Corruption(format!("{}: .udat: {}", name, e)))?);
        }
        let mut dat = reader.body(FileKind::Dat);
        check_fixed_width_body(name, ".dat", dat, limit, 4)?;
        let mut indexes = Vec::with_capacity(limit);
        for _ in 0..limit {
            let idx = dat
                .read_u32::<LittleEndian>()
                .map_err(|e| Error::Corruption(format!("{}: .dat: {}", name, e)))?;
            if idx as usize >= unique.len() {
                return Err(Error::Corruption(format!(
                    "{}: enum index {} beyond {} unique values",
                    name,
                    idx,
                    unique.len()
                )));
            }
            indexes.push(idx);
        }

        let _modifier = self.base.enum_modifier();
        self.changes.lock().clear();
        self.enum_store.reset();
        let handles: Vec<EnumHandle> = unique.iter().map(|v| self.enum_store.insert(v)).collect();
        self.handles.shrink(0);
        self.handles.reserve(limit);
        for idx in indexes {
            let handle = handles[idx as usize];
            self.enum_store.inc_ref(handle);
            self.handles.push(handle);
        }
        Ok(())
    }

    fn update_string(&self, lid: DocId, value: &str) -> bool {
        self.buffer(lid, Change::Assign(lid, value.to_string()))
    }
}
