//! Reverse mapping: target lid to the sorted local lids referencing it
//!
//! Sets are copy-on-write. A reader that fetched a set keeps a consistent
//! view of it; the replaced set is retired through the owner's hold list.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use attrstore_concurrency::GenerationHolder;
use attrstore_core::DocId;

/// Local lids referencing one target lid, ascending
pub type LidSet = Arc<[DocId]>;

/// Tree from target lid to referencing local lids
pub struct ReverseMapping {
    map: RwLock<BTreeMap<DocId, LidSet>>,
    holder: Arc<GenerationHolder>,
}

impl ReverseMapping {
    /// Empty mapping retiring replaced sets to `holder`
    pub fn new(holder: Arc<GenerationHolder>) -> Self {
        ReverseMapping {
            map: RwLock::new(BTreeMap::new()),
            holder,
        }
    }

    /// Local lids referencing `target_lid`
    pub fn get(&self, target_lid: DocId) -> Option<LidSet> {
        self.map.read().get(&target_lid).cloned()
    }

    /// Number of local lids referencing `target_lid`
    pub fn fan_out(&self, target_lid: DocId) -> usize {
        self.map.read().get(&target_lid).map_or(0, |s| s.len())
    }

    /// Call `f` for each local lid referencing `target_lid`
    pub fn for_each_local<F: FnMut(DocId)>(&self, target_lid: DocId, f: F) {
        if let Some(set) = self.get(target_lid) {
            set.iter().copied().for_each(f);
        }
    }

    /// Record that `local_lid` references `target_lid` (writer only)
    pub fn add(&self, target_lid: DocId, local_lid: DocId) {
        if target_lid == 0 {
            return;
        }
        let mut map = self.map.write();
        let old = map.get(&target_lid).cloned();
        let mut lids: Vec<DocId> = old.as_deref().map(<[DocId]>::to_vec).unwrap_or_default();
        match lids.binary_search(&local_lid) {
            Ok(_) => return,
            Err(pos) => lids.insert(pos, local_lid),
        }
        map.insert(target_lid, Arc::from(lids));
        drop(map);
        if let Some(old) = old {
            self.retire(old);
        }
    }

    /// Drop the reference from `local_lid` to `target_lid` (writer only)
    pub fn remove(&self, target_lid: DocId, local_lid: DocId) {
        if target_lid == 0 {
            return;
        }
        let mut map = self.map.write();
        let Some(old) = map.get(&target_lid).cloned() else {
            return;
        };
        let Ok(pos) = old.binary_search(&local_lid) else {
            return;
        };
        if old.len() == 1 {
            map.remove(&target_lid);
        } else {
            let mut lids = old.to_vec();
            lids.remove(pos);
            map.insert(target_lid, Arc::from(lids));
        }
        drop(map);
        self.retire(old);
    }

    /// Drop every entry (writer only)
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.map.write());
        let bytes = Self::tree_bytes(&old);
        self.holder.hold(old, bytes);
    }

    /// Number of target lids with at least one reference
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Whether nothing is referenced
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes used by the tree and its sets
    pub fn memory_bytes(&self) -> usize {
        Self::tree_bytes(&self.map.read())
    }

    fn retire(&self, set: LidSet) {
        let bytes = set.len() * std::mem::size_of::<DocId>();
        self.holder.hold(set, bytes);
    }

    fn tree_bytes(map: &BTreeMap<DocId, LidSet>) -> usize {
        map.values()
            .map(|s| std::mem::size_of::<(DocId, LidSet)>() + s.len() * std::mem::size_of::<DocId>())
            .sum()
    }
}

impl std::fmt::Debug for ReverseMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseMapping").field("targets", &self.len()).finish()
    }
}
