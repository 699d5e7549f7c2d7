//! Reference attribute: per-document link into another collection
//!
//! Each local lid stores the global id of the document it references and
//! the target lid that global id currently resolves to in the referenced
//! collection. Target lids live in an RCU vector so imported attributes
//! can read them lock-free; the reverse mapping answers which local lids
//! reference a given target lid.
//!
//! Target lids are kept current by the referenced collection's document
//! meta store, which notifies this attribute as documents are put and
//! removed (`GidToLidChangeListener`).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use attrstore_concurrency::{RcuSnapshot, RcuVector};
use attrstore_core::{
    AttrValue, AttributeConfig, BasicType, CollectionType, DocId, Error, GlobalId, QueryTerm,
    Result, Weighted,
};
use attrstore_storage::{AttributeReader, FileKind, SaveTarget};

use crate::attribute::{
    attribute_vector_plumbing, check_fixed_width_body, delegate_base_metadata, sort_blob,
    AttributeBase, AttributeVector, ReadableAttribute, StoreStats,
};
use crate::metastore::{DocumentMetaStore, GidToLidChangeListener};
use crate::search::{AttributeSearchContext, SearchContext, SearchParams, TermMatcher};

pub mod reverse_mapping;

pub use reverse_mapping::{LidSet, ReverseMapping};

#[derive(Debug, Clone, Copy)]
struct Change {
    lid: DocId,
    gid: Option<GlobalId>,
}

#[derive(Default)]
struct RefState {
    gids: Vec<Option<GlobalId>>,
    referrers: FxHashMap<GlobalId, SmallVec<[DocId; 4]>>,
    resolved: FxHashMap<GlobalId, DocId>,
}

/// Single-value attribute referencing documents of another collection
pub struct ReferenceAttribute {
    base: AttributeBase,
    state: Mutex<RefState>,
    target_lids: RcuVector<DocId>,
    reverse: ReverseMapping,
    changes: Mutex<Vec<Change>>,
}

impl ReferenceAttribute {
    /// Create an empty reference attribute
    pub fn new(name: impl Into<String>, base_file_name: impl Into<PathBuf>) -> Self {
        let config = AttributeConfig::new(BasicType::Reference, CollectionType::Single);
        let base = AttributeBase::new(name, config, base_file_name);
        let holder = Arc::clone(base.generation_holder());
        ReferenceAttribute {
            target_lids: RcuVector::new(Arc::clone(&holder)),
            reverse: ReverseMapping::new(holder),
            base,
            state: Mutex::new(RefState::default()),
            changes: Mutex::new(Vec::new()),
        }
    }

    /// Point `lid` at `gid`; visible after commit
    pub fn update(&self, lid: DocId, gid: GlobalId) -> bool {
        self.buffer(Change { lid, gid: Some(gid) })
    }

    /// Referenced global id of `lid`
    pub fn gid(&self, lid: DocId) -> Option<GlobalId> {
        self.state.lock().gids.get(lid as usize).copied().flatten()
    }

    /// Target lid of `lid`; 0 when unset or unresolved
    pub fn target_lid(&self, lid: DocId) -> DocId {
        self.target_lids.get(lid as usize).unwrap_or(0)
    }

    /// Point-in-time view of every local lid's target lid
    pub fn target_lids_snapshot(&self) -> RcuSnapshot<DocId> {
        self.target_lids.snapshot()
    }

    /// Target lid to local lids
    pub fn reverse_mapping(&self) -> &ReverseMapping {
        &self.reverse
    }

    /// The referenced document `gid` now lives at `target_lid`
    pub fn notify_referenced_put(&self, gid: GlobalId, target_lid: DocId) {
        let mut state = self.state.lock();
        state.resolved.insert(gid, target_lid);
        let referrers = state.referrers.get(&gid).cloned().unwrap_or_default();
        for lid in referrers {
            self.set_target_lid(lid, target_lid);
        }
    }

    /// The referenced document `gid` is gone
    pub fn notify_referenced_remove(&self, gid: GlobalId) {
        let mut state = self.state.lock();
        state.resolved.remove(&gid);
        let referrers = state.referrers.get(&gid).cloned().unwrap_or_default();
        for lid in referrers {
            self.set_target_lid(lid, 0);
        }
    }

    /// Resolve every referenced global id against `meta_store`
    ///
    /// Used after load and when the referenced collection is attached.
    pub fn populate_target_lids(&self, meta_store: &DocumentMetaStore) {
        let mut state = self.state.lock();
        let resolved: FxHashMap<GlobalId, DocId> = state
            .referrers
            .keys()
            .filter_map(|&gid| meta_store.lid_of(gid).map(|lid| (gid, lid)))
            .collect();
        state.resolved = resolved;
        self.reverse.clear();
        for (lid, gid) in state.gids.iter().enumerate() {
            let target = gid.and_then(|g| state.resolved.get(&g).copied()).unwrap_or(0);
            self.target_lids.set(lid, target);
            self.reverse.add(target, lid as DocId);
        }
        debug!(
            target: "attr::vector",
            name = self.name(),
            resolved = state.resolved.len(),
            "Populated target lids"
        );
    }

    fn buffer(&self, change: Change) -> bool {
        if (change.lid as usize) >= self.target_lids.len() {
            return false;
        }
        self.changes.lock().push(change);
        true
    }

    fn set_target_lid(&self, lid: DocId, target: DocId) {
        let old = self.target_lid(lid);
        if old == target {
            return;
        }
        self.reverse.remove(old, lid);
        self.target_lids.set(lid as usize, target);
        self.reverse.add(target, lid);
    }

    fn apply(&self, state: &mut RefState, change: Change) {
        let Change { lid, gid } = change;
        let Some(slot) = state.gids.get_mut(lid as usize) else {
            return;
        };
        let old = std::mem::replace(slot, gid);
        if old == gid {
            return;
        }
        if let Some(old) = old {
            if let Some(lids) = state.referrers.get_mut(&old) {
                lids.retain(|l| *l != lid);
                if lids.is_empty() {
                    state.referrers.remove(&old);
                }
            }
        }
        if let Some(gid) = gid {
            state.referrers.entry(gid).or_default().push(lid);
        }
        let target = gid.and_then(|g| state.resolved.get(&g).copied()).unwrap_or(0);
        self.set_target_lid(lid, target);
    }
}

impl GidToLidChangeListener for ReferenceAttribute {
    fn notify_put(&self, gid: GlobalId, lid: DocId) {
        self.notify_referenced_put(gid, lid);
    }

    fn notify_remove(&self, gid: GlobalId) {
        self.notify_referenced_remove(gid);
    }
}

impl ReadableAttribute for ReferenceAttribute {
    delegate_base_metadata!();

    fn value_count(&self, lid: DocId) -> u32 {
        self.gid(lid).is_some() as u32
    }

    fn get_int(&self, lid: DocId) -> i64 {
        self.gid(lid).map_or(0, |g| g.as_u64() as i64)
    }

    fn get_float(&self, lid: DocId) -> f64 {
        self.get_int(lid) as f64
    }

    fn get_string(&self, lid: DocId) -> String {
        self.gid(lid).map(|g| format!("{:016x}", g.as_u64())).unwrap_or_default()
    }

    fn get_values(&self, lid: DocId) -> Vec<Weighted<AttrValue>> {
        self.gid(lid)
            .map(|g| vec![Weighted::new(AttrValue::Int(g.as_u64() as i64), 1)])
            .unwrap_or_default()
    }

    fn match_doc(&self, _lid: DocId, _matcher: &TermMatcher) -> Option<i32> {
        None
    }

    fn create_search_context(&self, term: &QueryTerm, params: &SearchParams) -> Box<dyn SearchContext + '_> {
        Box::new(AttributeSearchContext::new(self, term, params))
    }

    fn serialize_for_sort(&self, lid: DocId, ascending: bool) -> Vec<u8> {
        sort_blob::serialize_int(self.get_int(lid), ascending)
    }
}

impl AttributeVector for ReferenceAttribute {
    attribute_vector_plumbing!();

    fn grow(&self, num_docs: DocId) -> bool {
        let mut state = self.state.lock();
        if state.gids.len() < num_docs as usize {
            state.gids.resize(num_docs as usize, None);
        }
        self.target_lids.ensure_size(num_docs as usize, 0);
        true
    }

    fn clear_doc(&self, lid: DocId) -> u32 {
        let count = self.value_count(lid);
        self.buffer(Change { lid, gid: None });
        count
    }

    fn on_commit(&self) {
        let changes = std::mem::take(&mut *self.changes.lock());
        if changes.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        let updates = changes.len() as u64;
        for change in changes {
            self.apply(&mut state, change);
        }
        drop(state);
        self.base.update_status(|s| s.updates += updates);
    }

    fn store_stats(&self) -> StoreStats {
        let state = self.state.lock();
        let mut memory = self.target_lids.memory_usage();
        let gid_bytes = state.gids.capacity() * std::mem::size_of::<Option<GlobalId>>();
        memory.add_buffer(gid_bytes, state.gids.len() * std::mem::size_of::<Option<GlobalId>>());
        let reverse_bytes = self.reverse.memory_bytes();
        memory.add_buffer(reverse_bytes, reverse_bytes);
        StoreStats {
            num_values: state.gids.iter().filter(|g| g.is_some()).count() as u64,
            num_unique_values: state.referrers.len() as u64,
            memory,
        }
    }

    fn on_shrink_lid_space(&self, limit: DocId) {
        let mut state = self.state.lock();
        state.gids.truncate(limit as usize);
        state.gids.shrink_to_fit();
        self.target_lids.shrink(limit as usize);
    }

    fn enumerated_save(&self) -> bool {
        true
    }

    /// `.udat` holds the sorted unique global ids, `.dat` one index + 1 per lid
    fn on_save(&self, target: &mut dyn SaveTarget, doc_id_limit: DocId) -> Result<()> {
        let state = self.state.lock();
        let gids: Vec<Option<GlobalId>> = (0..doc_id_limit as usize)
            .map(|lid| state.gids.get(lid).copied().flatten())
            .collect();
        drop(state);
        let unique: BTreeMap<GlobalId, u32> = {
            let mut sorted: Vec<GlobalId> = gids.iter().flatten().copied().collect();
            sorted.sort_unstable();
            sorted.dedup();
            sorted.into_iter().zip(1u32..).collect()
        };
        let udat = target.writer(FileKind::Udat);
        for gid in unique.keys() {
            udat.write_u64::<LittleEndian>(gid.as_u64())?;
        }
        let dat = target.writer(FileKind::Dat);
        for gid in &gids {
            dat.write_u32::<LittleEndian>(gid.map_or(0, |g| unique[&g]))?;
        }
        Ok(())
    }

    fn on_load(&self, reader: &AttributeReader) -> Result<()> {
        let name = self.base.name();
        let corrupt = |what: String| Error::Corruption(format!("{}: {}", name, what));
        let limit = reader.header().doc_id_limit as usize;

        let udat = reader.body(FileKind::Udat);
        if udat.len() % 8 != 0 {
            return Err(corrupt(format!(".udat length {} not a multiple of 8", udat.len())));
        }
        let mut body = udat;
        let mut unique = Vec::with_capacity(udat.len() / 8);
        while !body.is_empty() {
            unique.push(GlobalId(body.read_u64::<LittleEndian>()?));
        }

        let mut dat = reader.body(FileKind::Dat);
        check_fixed_width_body(name, ".dat", dat, limit, 4)?;
        let mut gids = Vec::with_capacity(limit);
        for _ in 0..limit {
            let idx = dat
                .read_u32::<LittleEndian>()
                .map_err(|e| corrupt(format!(".dat: {}", e)))? as usize;
            let gid = match idx {
                0 => None,
                i if i <= unique.len() => Some(unique[i - 1]),
                i => return Err(corrupt(format!("gid index {} beyond {}", i, unique.len()))),
            };
            gids.push(gid);
        }

        let mut referrers: FxHashMap<GlobalId, SmallVec<[DocId; 4]>> = FxHashMap::default();
        for (lid, gid) in gids.iter().enumerate() {
            if let Some(gid) = gid {
                referrers.entry(*gid).or_default().push(lid as DocId);
            }
        }

        self.changes.lock().clear();
        let mut state = self.state.lock();
        *state = RefState {
            gids,
            referrers,
            resolved: FxHashMap::default(),
        };
        self.reverse.clear();
        self.target_lids.shrink(0);
        self.target_lids.ensure_size(limit, 0);
        Ok(())
    }

    fn update_int(&self, lid: DocId, value: i64) -> bool {
        self.update(lid, GlobalId(value as u64))
    }
}

impl std::fmt::Debug for ReferenceAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceAttribute")
            .field("base", &self.base)
            .field("reverse", &self.reverse)
            .finish()
    }
}
