//! Document meta store: global id to lid allocation for one collection
//!
//! Lids are handed out from 1 upwards. A removed lid is not reused until
//! every read guard that was taken before the removal has been dropped,
//! so a reader holding a guard can trust that a lid it resolved still
//! names the same document.

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

use attrstore_concurrency::{GenerationGuard, GenerationHandler};
use attrstore_core::{DocId, Generation, GlobalId};

/// Receives gid to lid changes of a referenced collection
pub trait GidToLidChangeListener: Send + Sync {
    /// `gid` now lives at `lid`
    fn notify_put(&self, gid: GlobalId, lid: DocId);

    /// `gid` was removed
    fn notify_remove(&self, gid: GlobalId);
}

#[derive(Default)]
struct MetaState {
    gid_to_lid: FxHashMap<GlobalId, DocId>,
    lid_to_gid: Vec<Option<GlobalId>>,
    free: Vec<DocId>,
    removed: Vec<DocId>,
    on_hold: VecDeque<(Generation, Vec<DocId>)>,
}

impl MetaState {
    fn allocate(&mut self) -> DocId {
        if let Some(lid) = self.free.pop() {
            return lid;
        }
        self.lid_to_gid.push(None);
        (self.lid_to_gid.len() - 1) as DocId
    }
}

/// Per-collection lid allocator with reuse deferred by generation
pub struct DocumentMetaStore {
    name: String,
    generation_handler: GenerationHandler,
    state: Mutex<MetaState>,
    committed_doc_id_limit: AtomicU32,
    listeners: RwLock<Vec<Arc<dyn GidToLidChangeListener>>>,
}

/// Guard that keeps every lid resolved under it from being reused
#[derive(Debug, Clone)]
pub struct DocumentMetaStoreReadGuard {
    _guard: GenerationGuard,
    doc_id_limit: DocId,
}

impl DocumentMetaStoreReadGuard {
    /// Committed lid limit when the guard was taken
    pub fn doc_id_limit(&self) -> DocId {
        self.doc_id_limit
    }
}

impl DocumentMetaStore {
    /// Empty store with the reserved lid 0
    pub fn new(name: impl Into<String>) -> Self {
        let state = MetaState {
            lid_to_gid: vec![None],
            ..MetaState::default()
        };
        DocumentMetaStore {
            name: name.into(),
            generation_handler: GenerationHandler::new(),
            state: Mutex::new(state),
            committed_doc_id_limit: AtomicU32::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a listener for put/remove notifications
    pub fn add_listener(&self, listener: Arc<dyn GidToLidChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// Lid of `gid`, allocating one for a new document
    pub fn put(&self, gid: GlobalId) -> DocId {
        let lid = {
            let mut state = self.state.lock();
            if let Some(&lid) = state.gid_to_lid.get(&gid) {
                return lid;
            }
            let lid = state.allocate();
            state.gid_to_lid.insert(gid, lid);
            state.lid_to_gid[lid as usize] = Some(gid);
            lid
        };
        debug!(target: "attr::metastore", store = %self.name, gid = gid.as_u64(), lid, "Put document");
        for listener in self.listeners.read().iter() {
            listener.notify_put(gid, lid);
        }
        lid
    }

    /// Remove `gid`; its lid becomes reusable once no older guard remains
    pub fn remove(&self, gid: GlobalId) -> Option<DocId> {
        let lid = {
            let mut state = self.state.lock();
            let lid = state.gid_to_lid.remove(&gid)?;
            state.lid_to_gid[lid as usize] = None;
            state.removed.push(lid);
            lid
        };
        debug!(target: "attr::metastore", store = %self.name, gid = gid.as_u64(), lid, "Removed document");
        for listener in self.listeners.read().iter() {
            listener.notify_remove(gid);
        }
        Some(lid)
    }

    /// Publish the lid limit and recycle lids no reader can observe
    pub fn commit(&self) {
        let mut state = self.state.lock();
        let limit = state.lid_to_gid.len() as DocId;
        if limit > self.committed_doc_id_limit() {
            self.committed_doc_id_limit.store(limit, Ordering::Release);
        }
        let current = self.generation_handler.current_generation();
        if !state.removed.is_empty() {
            let removed = std::mem::take(&mut state.removed);
            state.on_hold.push_back((current, removed));
        }
        self.generation_handler.inc_generation();
        let oldest_used = self.generation_handler.update_oldest_used_generation();
        while let Some((generation, _)) = state.on_hold.front() {
            if *generation >= oldest_used {
                break;
            }
            if let Some((_, lids)) = state.on_hold.pop_front() {
                state.free.extend(lids);
            }
        }
    }

    /// Lid of `gid`, if present
    pub fn lid_of(&self, gid: GlobalId) -> Option<DocId> {
        self.state.lock().gid_to_lid.get(&gid).copied()
    }

    /// Global id at `lid`, if occupied
    pub fn gid_of(&self, lid: DocId) -> Option<GlobalId> {
        self.state.lock().lid_to_gid.get(lid as usize).copied().flatten()
    }

    /// Number of live documents
    pub fn num_active_docs(&self) -> usize {
        self.state.lock().gid_to_lid.len()
    }

    /// Lid limit visible to readers
    pub fn committed_doc_id_limit(&self) -> DocId {
        self.committed_doc_id_limit.load(Ordering::Acquire)
    }

    /// Pin the current generation so no lid is reused while held
    pub fn read_guard(&self) -> DocumentMetaStoreReadGuard {
        let guard = self.generation_handler.take_guard();
        DocumentMetaStoreReadGuard {
            _guard: guard,
            doc_id_limit: self.committed_doc_id_limit(),
        }
    }

    /// Generation state
    pub fn generation_handler(&self) -> &GenerationHandler {
        &self.generation_handler
    }
}

impl std::fmt::Debug for DocumentMetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentMetaStore")
            .field("name", &self.name)
            .field("committed_doc_id_limit", &self.committed_doc_id_limit())
            .finish()
    }
}
