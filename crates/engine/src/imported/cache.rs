//! Bit vector search cache for imported attributes
//!
//! Keyed by the raw query term. An entry keeps the meta-store read guards
//! that were live when its bit vector was merged, so neither local nor
//! target lids named by the entry can be reused while it is reachable.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use attrstore_core::{BitVector, DocId};

use crate::metastore::DocumentMetaStoreReadGuard;

/// One cached search result
#[derive(Debug)]
pub struct CacheEntry {
    /// Guard on the referring collection's meta store
    pub local_guard: DocumentMetaStoreReadGuard,
    /// Guard on the referenced collection's meta store
    pub target_guard: DocumentMetaStoreReadGuard,
    /// Matching local lids
    pub bit_vector: Arc<BitVector>,
    /// Local lid limit the bit vector was built for
    pub doc_id_limit: DocId,
}

/// Term to bit vector cache; entries are immutable and last write wins
#[derive(Debug, Default)]
pub struct BitVectorSearchCache {
    entries: RwLock<FxHashMap<String, Arc<CacheEntry>>>,
    size: AtomicUsize,
}

impl BitVectorSearchCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` for `term`, replacing any previous entry
    pub fn insert(&self, term: &str, entry: Arc<CacheEntry>) {
        let mut entries = self.entries.write();
        entries.insert(term.to_string(), entry);
        self.size.store(entries.len(), Ordering::Relaxed);
    }

    /// Entry for `term`
    pub fn find(&self, term: &str) -> Option<Arc<CacheEntry>> {
        if self.size.load(Ordering::Relaxed) == 0 {
            return None;
        }
        self.entries.read().get(term).cloned()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let dropped = {
            let mut entries = self.entries.write();
            self.size.store(0, Ordering::Relaxed);
            std::mem::take(&mut *entries)
        };
        if !dropped.is_empty() {
            debug!(target: "attr::imported", entries = dropped.len(), "Cleared search cache");
        }
    }

    /// Number of cached terms
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metastore::DocumentMetaStore;

    fn entry(store: &DocumentMetaStore, lids: &[DocId]) -> Arc<CacheEntry> {
        Arc::new(CacheEntry {
            local_guard: store.read_guard(),
            target_guard: store.read_guard(),
            bit_vector: Arc::new(BitVector::from_lids(16, lids.iter().copied())),
            doc_id_limit: 16,
        })
    }

    #[test]
    fn test_insert_find_clear() {
        let store = DocumentMetaStore::new("m");
        let cache = BitVectorSearchCache::new();
        assert!(cache.find("foo").is_none());
        cache.insert("foo", entry(&store, &[1, 3]));
        let hit = cache.find("foo").unwrap();
        assert_eq!(hit.bit_vector.iter_true().collect::<Vec<_>>(), vec![1, 3]);
        assert!(cache.find("bar").is_none());

        cache.clear();
        assert!(cache.find("foo").is_none());
        assert!(cache.is_empty());
        // an entry handed out before clear stays usable
        assert_eq!(hit.bit_vector.count_true_bits(), 2);
    }

    #[test]
    fn test_last_write_wins() {
        let store = DocumentMetaStore::new("m");
        let cache = BitVectorSearchCache::new();
        cache.insert("t", entry(&store, &[1]));
        cache.insert("t", entry(&store, &[2]));
        assert_eq!(cache.len(), 1);
        assert!(cache.find("t").unwrap().bit_vector.test_bit(2));
    }

    #[test]
    fn test_entry_guard_blocks_lid_reuse() {
        let store = DocumentMetaStore::new("m");
        let gid = attrstore_core::GlobalId(1);
        store.put(gid);
        store.commit();
        let cache = BitVectorSearchCache::new();
        cache.insert("t", entry(&store, &[1]));
        store.remove(gid);
        store.commit();
        assert_ne!(store.put(attrstore_core::GlobalId(2)), 1);
        cache.clear();
        store.commit();
        assert_eq!(store.put(attrstore_core::GlobalId(3)), 1);
    }
}
