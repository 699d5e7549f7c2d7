//! State shared by every attribute vector
//!
//! `AttributeBase` owns the lid-space bookkeeping, the generation handler
//! and hold list, the enum-modify lock, and the status block. Concrete
//! stores embed one and expose it through `AttributeVector::base`.

use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use attrstore_concurrency::{
    EnumModifier, EnumModifyLock, GenerationGuard, GenerationHandler, GenerationHolder, Interlock,
};
use attrstore_core::{AttributeConfig, DocId, Generation, Status, DEFAULT_STATS_INTERVAL_MS};

/// Writer-side lid-space state
#[derive(Debug, Default)]
pub(crate) struct WriterState {
    /// Highest lid + 1 added since the last commit, 0 when nothing is pending
    pub uncommitted_doc_id_limit: DocId,
    /// Documents with allocated storage
    pub num_docs: DocId,
    /// When statistics were last recomputed
    pub last_stats_update: Option<Instant>,
    /// Generation current when the lid space was last compacted
    pub compact_generation: Generation,
}

/// Lifecycle state common to all attribute vectors
pub struct AttributeBase {
    name: String,
    config: AttributeConfig,
    base_file_name: PathBuf,
    committed_doc_id_limit: AtomicU32,
    writer: Mutex<WriterState>,
    generation_handler: GenerationHandler,
    generation_holder: Arc<GenerationHolder>,
    enum_lock: EnumModifyLock,
    interlock: Mutex<Arc<Interlock>>,
    status: Mutex<Status>,
    loaded: AtomicBool,
    stats_interval_ms: AtomicU64,
}

impl AttributeBase {
    /// Base state for an attribute persisted under `base_file_name`
    pub fn new(name: impl Into<String>, config: AttributeConfig, base_file_name: impl Into<PathBuf>) -> Self {
        AttributeBase {
            name: name.into(),
            config,
            base_file_name: base_file_name.into(),
            committed_doc_id_limit: AtomicU32::new(0),
            writer: Mutex::new(WriterState::default()),
            generation_handler: GenerationHandler::new(),
            generation_holder: Arc::new(GenerationHolder::new()),
            enum_lock: EnumModifyLock::new(),
            interlock: Mutex::new(Arc::new(Interlock::new())),
            status: Mutex::new(Status::default()),
            loaded: AtomicBool::new(false),
            stats_interval_ms: AtomicU64::new(DEFAULT_STATS_INTERVAL_MS),
        }
    }

    /// Attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static configuration
    pub fn config(&self) -> &AttributeConfig {
        &self.config
    }

    /// Path prefix of the persisted files (without suffix)
    pub fn base_file_name(&self) -> &Path {
        &self.base_file_name
    }

    /// Last component of the base file name
    pub fn file_stem(&self) -> String {
        self.base_file_name
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Lid limit visible to concurrent readers
    #[inline]
    pub fn committed_doc_id_limit(&self) -> DocId {
        self.committed_doc_id_limit.load(Ordering::Acquire)
    }

    pub(crate) fn set_committed_doc_id_limit(&self, limit: DocId) {
        self.committed_doc_id_limit.store(limit, Ordering::Release);
    }

    /// Move the committed limit up to the pending uncommitted limit
    pub(crate) fn publish_committed_doc_id_limit(&self) {
        let mut writer = self.writer.lock();
        if writer.uncommitted_doc_id_limit != 0 {
            if writer.uncommitted_doc_id_limit > self.committed_doc_id_limit() {
                self.set_committed_doc_id_limit(writer.uncommitted_doc_id_limit);
            }
            writer.uncommitted_doc_id_limit = 0;
        }
    }

    /// Documents with allocated storage
    pub fn num_docs(&self) -> DocId {
        self.writer.lock().num_docs
    }

    pub(crate) fn writer(&self) -> MutexGuard<'_, WriterState> {
        self.writer.lock()
    }

    /// Generation of the last lid-space compaction
    pub fn compact_generation(&self) -> Generation {
        self.writer.lock().compact_generation
    }

    /// Reader epoch handler
    pub fn generation_handler(&self) -> &GenerationHandler {
        &self.generation_handler
    }

    /// Hold list for retired memory
    pub fn generation_holder(&self) -> &Arc<GenerationHolder> {
        &self.generation_holder
    }

    /// Pin the current generation
    pub fn take_generation_guard(&self) -> GenerationGuard {
        self.generation_handler.take_guard()
    }

    /// Lock guarding enum-store mutation
    pub fn enum_lock(&self) -> &EnumModifyLock {
        &self.enum_lock
    }

    /// Take exclusive enum access, ordered through the shared interlock
    pub fn enum_modifier(&self) -> EnumModifier {
        let interlock = Arc::clone(&self.interlock.lock());
        self.enum_lock.modifier(&interlock)
    }

    /// Share an interlock with the other attributes of a manager
    pub fn set_interlock(&self, interlock: Arc<Interlock>) {
        *self.interlock.lock() = interlock;
    }

    /// Currently installed interlock
    pub fn interlock(&self) -> Arc<Interlock> {
        Arc::clone(&self.interlock.lock())
    }

    /// Copy of the status block
    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    /// Mutate the status block
    pub fn update_status<R>(&self, f: impl FnOnce(&mut Status) -> R) -> R {
        f(&mut self.status.lock())
    }

    /// Whether the attribute was populated from persisted files
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }

    /// Minimum interval between non-forced statistics refreshes
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms.load(Ordering::Relaxed))
    }

    /// Change the statistics refresh interval
    pub fn set_stats_interval(&self, interval: Duration) {
        self.stats_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for AttributeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeBase")
            .field("name", &self.name)
            .field("committed_doc_id_limit", &self.committed_doc_id_limit())
            .field("generation", &self.generation_handler.current_generation())
            .finish()
    }
}
