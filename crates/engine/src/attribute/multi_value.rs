//! Multi-value attributes: arrays and weighted sets
//!
//! Each document owns an immutable element slice. Commit builds a new slice
//! for every touched document and swaps it in; the replaced slice goes on
//! the hold list so memory accounting reflects what old readers may still
//! reach.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;

use attrstore_core::{
    ArithmeticOp, AttrValue, AttributeConfig, DocId, Error, MemoryUsage, QueryTerm, Result,
    Weighted,
};
use attrstore_storage::{AttributeReader, FileKind, SaveTarget};

use super::{
    attribute_vector_plumbing, check_fixed_width_body, delegate_base_metadata, AttributeBase,
    AttributeVector, ElementValue, ReadableAttribute, StoreStats,
};
use crate::search::{AttributeSearchContext, SearchContext, SearchParams, TermMatcher};

type Elements<T> = Arc<[Weighted<T>]>;

#[derive(Debug, Clone)]
enum Change<T> {
    Append(DocId, T, i32),
    Remove(DocId, T),
    Clear(DocId),
    Weight(DocId, T, ArithmeticOp, f64),
}

impl<T> Change<T> {
    fn lid(&self) -> DocId {
        match self {
            Change::Append(lid, ..)
            | Change::Remove(lid, ..)
            | Change::Clear(lid)
            | Change::Weight(lid, ..) => *lid,
        }
    }
}

/// Array or weighted-set attribute over `T`
pub struct MultiValueAttribute<T: ElementValue> {
    base: AttributeBase,
    docs: RwLock<Vec<Elements<T>>>,
    changes: Mutex<Vec<Change<T>>>,
    empty: Elements<T>,
}

impl<T: ElementValue> MultiValueAttribute<T> {
    /// Create an empty attribute
    pub fn new(name: impl Into<String>, config: AttributeConfig, base_file_name: impl Into<PathBuf>) -> Self {
        MultiValueAttribute {
            base: AttributeBase::new(name, config, base_file_name),
            docs: RwLock::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
            empty: Arc::from(Vec::new()),
        }
    }

    /// Committed elements of `lid`
    pub fn elements(&self, lid: DocId) -> Elements<T> {
        self.docs
            .read()
            .get(lid as usize)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }

    fn is_weighted_set(&self) -> bool {
        self.base.config().collection_type.is_weighted_set()
    }

    fn in_range(&self, lid: DocId) -> bool {
        (lid as usize) < self.docs.read().len()
    }

    fn buffer(&self, change: Change<T>) -> bool {
        if !self.in_range(change.lid()) {
            return false;
        }
        self.changes.lock().push(change);
        true
    }

    fn first(&self, lid: DocId) -> T {
        self.elements(lid)
            .first()
            .map(|e| e.value.clone())
            .unwrap_or_else(T::undefined)
    }

    /// Apply one change to a working copy; returns whether it was non-idempotent
    fn apply_change(&self, elements: &mut Vec<Weighted<T>>, change: Change<T>) -> bool {
        let config = self.base.config();
        match change {
            Change::Append(_, value, weight) => {
                if self.is_weighted_set() {
                    match elements.iter_mut().find(|e| e.value == value) {
                        Some(existing) => existing.weight = weight,
                        None => elements.push(Weighted::new(value, weight)),
                    }
                } else {
                    elements.push(Weighted::new(value, 1));
                }
                false
            }
            Change::Remove(_, value) => {
                elements.retain(|e| e.value != value);
                false
            }
            Change::Clear(_) => {
                elements.clear();
                false
            }
            Change::Weight(_, key, op, operand) => {
                let pos = match elements.iter().position(|e| e.value == key) {
                    Some(pos) => pos,
                    None if config.create_if_nonexistent => {
                        elements.push(Weighted::new(key, 0));
                        elements.len() - 1
                    }
                    None => return false,
                };
                let updated = op.apply_i64(elements[pos].weight as i64, operand);
                let updated = updated.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                if updated == 0 && config.remove_if_zero {
                    elements.remove(pos);
                } else {
                    elements[pos].weight = updated;
                }
                true
            }
        }
    }

    fn element_bytes(elements: &[Weighted<T>]) -> usize {
        elements.len() * std::mem::size_of::<Weighted<T>>()
            + elements.iter().map(|e| e.value.heap_bytes()).sum::<usize>()
    }
}

impl<T: ElementValue> ReadableAttribute for MultiValueAttribute<T> {
    delegate_base_metadata!();

    fn value_count(&self, lid: DocId) -> u32 {
        self.elements(lid).len() as u32
    }

    fn get_int(&self, lid: DocId) -> i64 {
        self.first(lid).to_attr().as_i64().unwrap_or(i64::MIN)
    }

    fn get_float(&self, lid: DocId) -> f64 {
        self.first(lid).to_attr().as_f64().unwrap_or(f64::NAN)
    }

    fn get_string(&self, lid: DocId) -> String {
        self.first(lid).to_attr().to_string()
    }

    fn get_values(&self, lid: DocId) -> Vec<Weighted<AttrValue>> {
        self.elements(lid)
            .iter()
            .map(|e| Weighted::new(e.value.to_attr(), e.weight))
            .collect()
    }

    fn match_doc(&self, lid: DocId, matcher: &TermMatcher) -> Option<i32> {
        let elements = self.elements(lid);
        if self.is_weighted_set() {
            elements
                .iter()
                .find(|e| e.value.matches(matcher))
                .map(|e| e.weight)
        } else {
            let hits = elements.iter().filter(|e| e.value.matches(matcher)).count();
            (hits > 0).then_some(hits as i32)
        }
    }

    fn create_search_context(&self, term: &QueryTerm, params: &SearchParams) -> Box<dyn SearchContext + '_> {
        Box::new(AttributeSearchContext::new(self, term, params))
    }

    /// Ascending sorts on the smallest element, descending on the largest
    fn serialize_for_sort(&self, lid: DocId, ascending: bool) -> Vec<u8> {
        let elements = self.elements(lid);
        let pick = elements.iter().map(|e| &e.value).reduce(|best, v| {
            let better = if ascending { v < best } else { v > best };
            if better {
                v
            } else {
                best
            }
        });
        match pick {
            Some(v) => v.sort_blob(ascending),
            None => T::undefined().sort_blob(ascending),
        }
    }
}

impl<T: ElementValue> AttributeVector for MultiValueAttribute<T> {
    attribute_vector_plumbing!();

    fn grow(&self, num_docs: DocId) -> bool {
        let mut docs = self.docs.write();
        if docs.len() < num_docs as usize {
            docs.resize(num_docs as usize, Arc::clone(&self.empty));
        }
        true
    }

    fn clear_doc(&self, lid: DocId) -> u32 {
        let count = self.value_count(lid);
        self.buffer(Change::Clear(lid));
        count
    }

    fn on_commit(&self) {
        let changes = std::mem::take(&mut *self.changes.lock());
        if changes.is_empty() {
            return;
        }
        let mut touched: FxHashMap<DocId, Vec<Weighted<T>>> = FxHashMap::default();
        let mut updates = 0u64;
        let mut non_idempotent = 0u64;
        for change in changes {
            let lid = change.lid();
            let working = touched
                .entry(lid)
                .or_insert_with(|| self.elements(lid).to_vec());
            if self.apply_change(working, change) {
                non_idempotent += 1;
            }
            updates += 1;
        }
        {
            let mut docs = self.docs.write();
            for (lid, elements) in touched {
                if let Some(slot) = docs.get_mut(lid as usize) {
                    let old = std::mem::replace(slot, Arc::from(elements));
                    if !old.is_empty() {
                        let bytes = Self::element_bytes(&old);
                        self.base.generation_holder().hold(old, bytes);
                    }
                }
            }
        }
        self.base.update_status(|s| {
            s.updates += updates;
            s.non_idempotent_updates += non_idempotent;
        });
    }

    fn store_stats(&self) -> StoreStats {
        let docs = self.docs.read();
        let num_values: usize = docs.iter().map(|e| e.len()).sum();
        let element_bytes: usize = docs.iter().map(|e| Self::element_bytes(e)).sum();
        let slot_size = std::mem::size_of::<Elements<T>>();
        let mut memory = MemoryUsage::default();
        memory.add_buffer(docs.capacity() * slot_size, docs.len() * slot_size);
        memory.add_buffer(element_bytes, element_bytes);
        StoreStats {
            num_values: num_values as u64,
            num_unique_values: 0,
            memory,
        }
    }

    fn on_shrink_lid_space(&self, limit: DocId) {
        let mut docs = self.docs.write();
        docs.truncate(limit as usize);
        docs.shrink_to_fit();
    }

    fn on_save(&self, target: &mut dyn SaveTarget, doc_id_limit: DocId) -> Result<()> {
        let docs = self.docs.read();
        let weighted = self.is_weighted_set();
        let mut dat = Vec::new();
        let mut idx = Vec::with_capacity((doc_id_limit as usize + 1) * 4);
        let mut weights = Vec::new();
        let mut offset = 0u32;
        idx.write_u32::<LittleEndian>(offset)?;
        for lid in 0..doc_id_limit {
            if let Some(elements) = docs.get(lid as usize) {
                for e in elements.iter() {
                    e.value.encode(&mut dat);
                    if weighted {
                        weights.write_i32::<LittleEndian>(e.weight)?;
                    }
                }
                offset += elements.len() as u32;
            }
            idx.write_u32::<LittleEndian>(offset)?;
        }
        target.writer(FileKind::Dat).extend_from_slice(&dat);
        target.writer(FileKind::Idx).extend_from_slice(&idx);
        if weighted {
            target.writer(FileKind::Weight).extend_from_slice(&weights);
        }
        Ok(())
    }

    fn on_load(&self, reader: &AttributeReader) -> Result<()> {
        let name = self.base.name();
        let corrupt = |what: String| Error::Corruption(format!("{}: {}", name, what));
        let limit = reader.header().doc_id_limit as usize;

        let mut idx = reader.body(FileKind::Idx);
        check_fixed_width_body(name, ".idx", idx, limit.saturating_add(1), 4)?;
        let mut offsets = Vec::with_capacity(limit + 1);
        for _ in 0..=limit {
            offsets.push(idx.read_u32::<LittleEndian>().map_err(|e| corrupt(format!(".idx: {}", e)))? as usize);
        }
        if offsets.first() != Some(&0) || offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(corrupt("offsets in .idx are not ascending from zero".to_string()));
        }
        let total = offsets[limit];

        let mut dat = reader.body(FileKind::Dat);
        // every element occupies at least one byte of .dat
        let mut values = Vec::with_capacity(total.min(dat.len()));
        for _ in 0..total {
            values.push(T::decode(&mut dat).map_err(|e| corrupt(format!(".dat: {}", e)))?);
        }
        if !dat.is_empty() {
            return Err(corrupt(format!("{} trailing bytes in .dat", dat.len())));
        }

        let mut weights = vec![1i32; total];
        if self.is_weighted_set() {
            let mut body = reader.body(FileKind::Weight);
            for w in weights.iter_mut() {
                *w = body
                    .read_i32::<LittleEndian>()
                    .map_err(|e| corrupt(format!(".weight: {}", e)))?;
            }
        }

        let mut elements = values.into_iter().zip(weights).map(|(v, w)| Weighted::new(v, w));
        let loaded: Vec<Elements<T>> = offsets
            .windows(2)
            .map(|w| elements.by_ref().take(w[1] - w[0]).collect::<Vec<_>>().into())
            .collect();

        self.changes.lock().clear();
        *self.docs.write() = loaded;
        Ok(())
    }

    fn append(&self, lid: DocId, value: &AttrValue, weight: i32) -> bool {
        match T::from_attr(value) {
            Some(v) => self.buffer(Change::Append(lid, v, weight)),
            None => false,
        }
    }

    fn remove(&self, lid: DocId, value: &AttrValue) -> bool {
        match T::from_attr(value) {
            Some(v) => self.buffer(Change::Remove(lid, v)),
            None => false,
        }
    }

    fn apply_weight(&self, lid: DocId, key: &AttrValue, op: ArithmeticOp, operand: f64) -> bool {
        if !self.is_weighted_set() {
            return false;
        }
        match T::from_attr(key) {
            Some(k) => self.buffer(Change::Weight(lid, k, op, operand)),
            None => false,
        }
    }
}
