//! Attribute vectors: per-field columnar stores
//!
//! An attribute holds one value (or value collection) per local document
//! id. The read API (`ReadableAttribute`) is shared by owned attributes and
//! by imported-attribute read guards. Owned attributes additionally
//! implement `AttributeVector`, which carries the writer-side lifecycle:
//!
//! ```text
//! add_doc / add_docs      grow the uncommitted lid space, reusing compacted lids
//! update_* / append ...   buffer changes
//! commit                  apply changes, publish limit, advance generation
//! compact_lid_space(w)    clear [w, committed), publish w
//! shrink_lid_space        free storage beyond the committed limit
//! save / load             persist through a save target
//! ```
//!
//! Every lifecycle method is provided by the trait on top of a small set
//! of store hooks, so concrete stores only describe their storage.

use std::any::Any;
use std::sync::Arc;

use attrstore_core::{
    ArithmeticOp, AttrValue, BasicType, CollectionType, DocId, Error, Generation, MemoryUsage,
    QueryTerm, Result, SerialNum, Status, Weighted,
};
use attrstore_storage::{AttributeHeader, AttributeReader, FileSaveTarget, SaveTarget};
use tracing::{debug, info, warn};

use crate::search::{SearchContext, SearchParams, TermMatcher};

/// Implements the `ReadableAttribute` metadata accessors from `self.base`
macro_rules! delegate_base_metadata {
    () => {
        fn name(&self) -> &str {
            self.base.name()
        }

        fn basic_type(&self) -> attrstore_core::BasicType {
            self.base.config().basic_type
        }

        fn collection_type(&self) -> attrstore_core::CollectionType {
            self.base.config().collection_type
        }

        fn num_docs(&self) -> attrstore_core::DocId {
            self.base.num_docs()
        }

        fn committed_doc_id_limit(&self) -> attrstore_core::DocId {
            self.base.committed_doc_id_limit()
        }

        fn fast_search(&self) -> bool {
            self.base.config().fast_search
        }

        fn is_filter(&self) -> bool {
            self.base.config().is_filter
        }
    };
}

/// Implements the `AttributeVector` accessors every store writes the same way
macro_rules! attribute_vector_plumbing {
    () => {
        fn base(&self) -> &$crate::attribute::AttributeBase {
            &self.base
        }

        fn as_readable(&self) -> &dyn $crate::attribute::ReadableAttribute {
            self
        }

        fn into_any(
            self: std::sync::Arc<Self>,
        ) -> std::sync::Arc<dyn std::any::Any + Send + Sync> {
            self
        }
    };
}

pub(crate) use attribute_vector_plumbing;
pub(crate) use delegate_base_metadata;

pub mod base;
pub mod enum_store;
pub mod factory;
pub mod multi_value;
pub mod numeric;
pub mod primitive;
pub mod sort_blob;
pub mod string;
pub mod update;

pub use base::AttributeBase;
pub use enum_store::{EnumHandle, EnumStore};
pub use factory::create_attribute;
pub use multi_value::MultiValueAttribute;
pub use numeric::SingleValueNumericAttribute;
pub use primitive::{ElementValue, NumericValue};
pub use string::SingleValueStringAttribute;
pub use update::{apply_update, ValueUpdate};

/// Read access to an attribute, owned or imported
///
/// Reads of lids outside the document space return the type's undefined
/// value (integer minimum, NaN, empty string) and never fail.
pub trait ReadableAttribute: Send + Sync {
    /// Attribute name
    fn name(&self) -> &str;

    /// Value type
    fn basic_type(&self) -> BasicType;

    /// Collection type
    fn collection_type(&self) -> CollectionType;

    /// Documents in the lid space
    fn num_docs(&self) -> DocId;

    /// Lid limit visible to concurrent readers
    fn committed_doc_id_limit(&self) -> DocId;

    /// Whether search structures allow cheap hit estimation
    fn fast_search(&self) -> bool;

    /// Whether searches only need matching lids
    fn is_filter(&self) -> bool;

    /// Whether reads are forwarded through a reference attribute
    fn is_imported(&self) -> bool {
        false
    }

    /// Number of values stored for `lid`
    fn value_count(&self, lid: DocId) -> u32;

    /// First value as an integer
    fn get_int(&self, lid: DocId) -> i64;

    /// First value as a float
    fn get_float(&self, lid: DocId) -> f64;

    /// First value as a string
    fn get_string(&self, lid: DocId) -> String;

    /// Enum handle of the value, for enumerated stores
    fn get_enum(&self, _lid: DocId) -> Option<EnumHandle> {
        None
    }

    /// Enum handle of `value`, if present in the dictionary
    fn find_enum(&self, _value: &str) -> Option<EnumHandle> {
        None
    }

    /// All values with their weights (arrays use weight 1)
    fn get_values(&self, lid: DocId) -> Vec<Weighted<AttrValue>>;

    /// Weight of the match if `lid` matches, `None` otherwise
    fn match_doc(&self, lid: DocId, matcher: &TermMatcher) -> Option<i32>;

    /// Search context for one query term
    fn create_search_context(&self, term: &QueryTerm, params: &SearchParams) -> Box<dyn SearchContext + '_>;

    /// Byte string whose lexicographic order follows value order
    fn serialize_for_sort(&self, lid: DocId, ascending: bool) -> Vec<u8>;
}

/// Statistics reported by a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total stored values
    pub num_values: u64,
    /// Distinct values, when tracked
    pub num_unique_values: u64,
    /// Memory of live structures
    pub memory: MemoryUsage,
}

/// Serial numbers covered by a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitParam {
    /// First serial number of the committed batch
    pub first_serial_num: SerialNum,
    /// Last serial number of the committed batch
    pub last_serial_num: SerialNum,
    /// Recompute statistics regardless of the refresh interval
    pub force_update_stats: bool,
}

impl CommitParam {
    /// Commit covering `[first, last]`
    pub fn new(first_serial_num: SerialNum, last_serial_num: SerialNum) -> Self {
        CommitParam {
            first_serial_num,
            last_serial_num,
            force_update_stats: false,
        }
    }
}

/// Owned attribute with a writer-side lifecycle
///
/// One writer thread at a time may call the mutating methods; any number
/// of readers may read concurrently under generation guards.
pub trait AttributeVector: ReadableAttribute {
    /// Shared lifecycle state
    fn base(&self) -> &AttributeBase;

    /// This attribute through the read-only interface
    fn as_readable(&self) -> &dyn ReadableAttribute;

    /// For downcasting to a concrete store
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    // ------------------------------------------------------------------
    // Store hooks
    // ------------------------------------------------------------------

    /// Allocate storage so that lids `[0, num_docs)` exist
    fn grow(&self, num_docs: DocId) -> bool;

    /// Reset `lid` to the undefined value; returns values cleared
    fn clear_doc(&self, lid: DocId) -> u32;

    /// Apply buffered changes
    fn on_commit(&self);

    /// Store statistics
    fn store_stats(&self) -> StoreStats;

    /// Release storage for lids `>= limit`
    fn on_shrink_lid_space(&self, limit: DocId);

    /// Whether the save writes a `.udat` file
    fn enumerated_save(&self) -> bool {
        false
    }

    /// Write the bodies for lids `[0, doc_id_limit)`
    fn on_save(&self, target: &mut dyn SaveTarget, doc_id_limit: DocId) -> Result<()>;

    /// Replace contents with the loaded bodies
    ///
    /// Must leave the store untouched when it returns an error.
    fn on_load(&self, reader: &AttributeReader) -> Result<()>;

    /// Freeze structures before the generation advances past `current`
    fn before_inc_generation(&self, _current: Generation) {}

    /// Drop memory retired before `oldest_used`
    fn reclaim_memory(&self, oldest_used: Generation) {
        self.base().generation_holder().reclaim(oldest_used);
    }

    // ------------------------------------------------------------------
    // Value writes (buffered until commit)
    // ------------------------------------------------------------------

    /// Assign an integer to a single-value attribute
    fn update_int(&self, _lid: DocId, _value: i64) -> bool {
        false
    }

    /// Assign a float to a single-value attribute
    fn update_float(&self, _lid: DocId, _value: f64) -> bool {
        false
    }

    /// Assign a string to a single-value attribute
    fn update_string(&self, _lid: DocId, _value: &str) -> bool {
        false
    }

    /// Arithmetic on a single numeric value
    fn apply_arithmetic(&self, _lid: DocId, _op: ArithmeticOp, _operand: f64) -> bool {
        false
    }

    /// Add an element to a multi-value document
    fn append(&self, _lid: DocId, _value: &AttrValue, _weight: i32) -> bool {
        false
    }

    /// Remove every element equal to `value`
    fn remove(&self, _lid: DocId, _value: &AttrValue) -> bool {
        false
    }

    /// Weight arithmetic on a weighted-set key
    fn apply_weight(&self, _lid: DocId, _key: &AttrValue, _op: ArithmeticOp, _operand: f64) -> bool {
        false
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Add one document at the end of the lid space
    fn add_doc(&self) -> Option<DocId> {
        self.add_docs(1).map(|(start, _)| start)
    }

    /// Add `count` documents; returns the first and last new lid
    ///
    /// Lids left allocated but unpublished by a lid-space compaction are
    /// handed out again before the lid space grows. The new lids become
    /// visible to readers on the next commit.
    fn add_docs(&self, count: u32) -> Option<(DocId, DocId)> {
        if count == 0 {
            return None;
        }
        let base = self.base();
        let num_docs = base.num_docs();
        let start = {
            let writer = base.writer();
            base.committed_doc_id_limit()
                .max(writer.uncommitted_doc_id_limit)
                .min(num_docs)
        };
        let end = start.checked_add(count)?;
        if end > num_docs && !self.grow(end) {
            warn!(target: "attr::vector", name = self.name(), start, count, "Failed to grow lid space");
            return None;
        }
        // reused lids may still carry writes made while they were unpublished
        for lid in start..end.min(num_docs) {
            self.clear_doc(lid);
        }
        let mut writer = base.writer();
        writer.num_docs = writer.num_docs.max(end);
        writer.uncommitted_doc_id_limit = writer.uncommitted_doc_id_limit.max(end);
        Some((start, end - 1))
    }

    /// Create the reserved lid 0 on an empty attribute and publish it
    fn add_reserved_doc(&self) {
        if self.base().num_docs() == 0 && self.add_doc().is_some() {
            self.clear_doc(0);
            self.commit(false);
        }
    }

    /// Apply pending changes and publish them to readers
    fn commit(&self, force_update_stats: bool) {
        let base = self.base();
        self.on_commit();
        base.publish_committed_doc_id_limit();
        self.inc_generation();
        self.update_stat(force_update_stats);
        debug!(
            target: "attr::vector",
            name = self.name(),
            committed_doc_id_limit = base.committed_doc_id_limit(),
            generation = base.generation_handler().current_generation(),
            "Committed attribute"
        );
    }

    /// Commit a replayed batch and record its last serial number
    ///
    /// # Panics
    ///
    /// Panics if the batch starts before the last synced serial number,
    /// which means operations are being replayed out of order.
    fn commit_with(&self, param: CommitParam) {
        let last_sync_token = self.base().status().last_sync_token;
        if param.first_serial_num < last_sync_token {
            panic!(
                "attribute '{}': commit of serial {} precedes last sync token {}",
                self.name(),
                param.first_serial_num,
                last_sync_token
            );
        }
        self.commit(param.force_update_stats);
        self.base()
            .update_status(|s| s.last_sync_token = param.last_serial_num);
    }

    /// Recompute statistics if forced or the refresh interval has passed
    fn update_stat(&self, force: bool) {
        let base = self.base();
        let due = force
            || base
                .writer()
                .last_stats_update
                .map_or(true, |t| t.elapsed() >= base.stats_interval());
        if !due {
            return;
        }
        let stats = self.store_stats();
        let mut memory = stats.memory;
        memory.inc_on_hold(base.generation_holder().held_bytes());
        let num_docs = base.num_docs();
        base.update_status(|s| {
            s.num_docs = num_docs as u64;
            s.num_values = stats.num_values;
            s.num_unique_values = stats.num_unique_values;
            s.memory = memory;
        });
        base.writer().last_stats_update = Some(std::time::Instant::now());
    }

    /// Advance the generation, tagging retired memory with the old one
    fn inc_generation(&self) {
        let base = self.base();
        let current = base.generation_handler().current_generation();
        self.before_inc_generation(current);
        base.generation_holder().assign_generation(current);
        base.generation_handler().inc_generation();
        self.reclaim_unused_memory();
    }

    /// Free everything retired before the oldest pinned generation
    fn reclaim_unused_memory(&self) {
        let oldest_used = self.base().generation_handler().update_oldest_used_generation();
        self.reclaim_memory(oldest_used);
    }

    /// Copy of the status block
    fn status(&self) -> Status {
        self.base().status()
    }

    /// Save to the attribute's own base file name
    fn save(&self) -> Result<()> {
        let mut target = FileSaveTarget::new(self.base().base_file_name());
        self.save_to(&mut target)
    }

    /// Save the committed lid space through `target`
    fn save_to(&self, target: &mut dyn SaveTarget) -> Result<()> {
        let base = self.base();
        let doc_id_limit = base.committed_doc_id_limit();
        let stats = self.store_stats();
        let config = base.config();
        let mut header = AttributeHeader::new(
            base.file_stem(),
            self.basic_type(),
            self.collection_type(),
            doc_id_limit,
        );
        header.enumerated = self.enumerated_save();
        header.unique_value_count = stats.num_unique_values;
        header.total_value_count = stats.num_values;
        header.create_serial_num = base.status().create_serial_num;
        header.create_if_nonexistent = config.create_if_nonexistent;
        header.remove_if_zero = config.remove_if_zero;

        target.set_header(header);
        target.setup()?;
        self.on_save(target, doc_id_limit)?;
        target.close()?;
        info!(target: "attr::vector", name = self.name(), doc_id_limit, "Saved attribute");
        Ok(())
    }

    /// Load from the attribute's own base file name
    ///
    /// Returns false and leaves the attribute unloaded on any failure,
    /// including a type mismatch with the persisted header.
    fn load(&self) -> bool {
        match self.try_load() {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "attr::vector", name = self.name(), error = %e, "Failed to load attribute");
                false
            }
        }
    }

    /// Load from the attribute's own base file name, reporting the error
    fn try_load(&self) -> Result<()> {
        let reader = AttributeReader::open(
            self.base().base_file_name(),
            self.basic_type(),
            self.collection_type(),
        )?;
        self.load_from(&reader)
    }

    /// Replace contents with an already opened save
    fn load_from(&self, reader: &AttributeReader) -> Result<()> {
        let base = self.base();
        let header = reader.header();
        self.on_load(reader)?;
        {
            let mut writer = base.writer();
            writer.num_docs = header.doc_id_limit;
            writer.uncommitted_doc_id_limit = 0;
        }
        base.set_committed_doc_id_limit(header.doc_id_limit);
        base.update_status(|s| s.create_serial_num = header.create_serial_num);
        base.set_loaded(true);
        self.inc_generation();
        self.update_stat(true);
        info!(
            target: "attr::vector",
            name = self.name(),
            doc_id_limit = header.doc_id_limit,
            "Loaded attribute"
        );
        Ok(())
    }
}

/// Lid-space maintenance used by index-maintenance schedulers
pub trait CompactableLidSpace {
    /// Clear lids `[wanted_limit, committed)` and publish `wanted_limit`
    fn compact_lid_space(&self, wanted_limit: DocId);

    /// Whether storage beyond the committed limit may be freed now
    fn can_shrink_lid_space(&self) -> bool;

    /// Free storage beyond the committed limit if no reader can reach it
    fn shrink_lid_space(&self);
}

impl<T: AttributeVector + ?Sized> CompactableLidSpace for T {
    /// # Panics
    ///
    /// Panics if `wanted_limit` exceeds the committed limit.
    fn compact_lid_space(&self, wanted_limit: DocId) {
        let base = self.base();
        self.commit(false);
        let committed = base.committed_doc_id_limit();
        assert!(
            wanted_limit <= committed,
            "attribute '{}': compact to {} beyond committed limit {}",
            self.name(),
            wanted_limit,
            committed
        );
        for lid in wanted_limit..committed {
            self.clear_doc(lid);
        }
        self.commit(false);
        base.set_committed_doc_id_limit(wanted_limit);
        base.writer().compact_generation = base.generation_handler().current_generation();
        self.inc_generation();
        info!(
            target: "attr::vector",
            name = self.name(),
            from = committed,
            to = wanted_limit,
            "Compacted lid space"
        );
    }

    fn can_shrink_lid_space(&self) -> bool {
        let base = self.base();
        base.committed_doc_id_limit() < base.num_docs()
            && base.compact_generation() < base.generation_handler().oldest_used_generation()
    }

    fn shrink_lid_space(&self) {
        let base = self.base();
        self.commit(false);
        self.reclaim_unused_memory();
        if !self.can_shrink_lid_space() {
            return;
        }
        let committed = base.committed_doc_id_limit();
        let num_docs = base.num_docs();
        for lid in committed..num_docs {
            self.clear_doc(lid);
        }
        self.commit(false);
        base.set_committed_doc_id_limit(committed);
        self.on_shrink_lid_space(committed);
        {
            let mut writer = base.writer();
            writer.num_docs = committed;
            writer.uncommitted_doc_id_limit = 0;
        }
        self.inc_generation();
        self.update_stat(true);
        info!(
            target: "attr::vector",
            name = self.name(),
            from = num_docs,
            to = committed,
            "Shrunk lid space"
        );
    }
}

/// Reject a fixed-width body too short to hold `count` entries
///
/// Loaders call this before sizing buffers from a header's doc id limit.
pub(crate) fn check_fixed_width_body(name: &str, file: &str, body: &[u8], count: usize, width: usize) -> Result<()> {
    match count.checked_mul(width) {
        Some(needed) if body.len() >= needed => Ok(()),
        _ => Err(Error::Corruption(format!(
            "{}: {} holds {} bytes, too short for {} entries of {} bytes",
            name,
            file,
            body.len(),
            count,
            width
        ))),
    }
}
