//! Search over an imported attribute
//!
//! The term is evaluated on the target attribute. Target hits are mapped
//! back to local lids through the reference attribute's reverse mapping,
//! either eagerly into a merged posting list (array or bit vector) or
//! lazily per local lid through a probe iterator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use attrstore_core::{BitVector, DocId, QueryTerm};

use super::cache::CacheEntry;
use super::merger::PostingListMerger;
use super::read_guard::ImportedAttributeReadGuard;
use crate::metastore::DocumentMetaStoreReadGuard;
use crate::search::{
    for_each_hit, ArrayPostingIterator, BitVectorIterator, EmptyIterator, ExecuteInfo,
    ProbeIterator, SearchContext, SearchIterator, SearchParams,
};

/// Target hit rate above which a non-strict fast-search query still merges
const MERGE_HIT_RATE_THRESHOLD: f64 = 0.01;

/// Search context translating target hits to local lids
pub struct ImportedSearchContext<'a> {
    guard: &'a ImportedAttributeReadGuard,
    term: QueryTerm,
    target_context: Box<dyn SearchContext + 'a>,
    use_bit_vector: bool,
    cached: Option<Arc<CacheEntry>>,
    cache_guards: Option<(DocumentMetaStoreReadGuard, DocumentMetaStoreReadGuard)>,
    merger: PostingListMerger,
    bit_vector: Option<Arc<BitVector>>,
    zero_hits: AtomicBool,
    fetched: bool,
}

impl<'a> ImportedSearchContext<'a> {
    /// Bind `term` to the imported attribute read through `guard`
    pub fn new(guard: &'a ImportedAttributeReadGuard, term: &QueryTerm, params: &SearchParams) -> Self {
        let imported = guard.imported();
        let target = guard.target();
        let cache = imported.search_cache();
        let cached = cache.and_then(|c| c.find(term.as_str()));
        let cache_guards = match (cache, &cached) {
            (Some(_), None) => Some((
                imported.local_meta_store().read_guard(),
                imported.target_meta_store().read_guard(),
            )),
            _ => None,
        };
        if cached.is_some() {
            debug!(target: "attr::imported", name = imported.name(), term = term.as_str(), "Search cache hit");
        }
        ImportedSearchContext {
            guard,
            term: term.clone(),
            target_context: target.create_search_context(term, params),
            use_bit_vector: params.use_bit_vector || target.is_filter(),
            cached,
            cache_guards,
            merger: PostingListMerger::new(guard.local_doc_id_limit()),
            bit_vector: None,
            zero_hits: AtomicBool::new(false),
            fetched: false,
        }
    }

    /// Whether the result came from the search cache
    pub fn is_cache_hit(&self) -> bool {
        self.cached.is_some()
    }

    /// Merged bit vector, when the search produced one
    pub fn merged_bit_vector(&self) -> Option<&Arc<BitVector>> {
        self.cached
            .as_ref()
            .map(|entry| &entry.bit_vector)
            .or(self.bit_vector.as_ref())
    }

    fn target_doc_id_limit(&self) -> DocId {
        self.guard.target_doc_id_limit()
    }

    /// Target hits scaled by the local to target lid space ratio
    fn scaled_hits(&self, target_hits: u32) -> u32 {
        let local = self.guard.local_doc_id_limit();
        let ratio = (local as f64 / self.target_doc_id_limit().max(1) as f64).max(1.0);
        let scaled = (target_hits as f64 * ratio).min(local as f64);
        scaled as u32
    }

    /// Sum of reverse mapping fan-out over every target hit
    fn exact_hits(&self) -> u32 {
        let reverse = self.guard.imported().reference().reverse_mapping();
        let mut hits = 0usize;
        let mut iterator = self.target_context.create_iterator(true);
        for_each_hit(iterator.as_mut(), 1, self.target_doc_id_limit(), |target_lid, _| {
            hits += reverse.fan_out(target_lid);
        });
        hits.min(u32::MAX as usize) as u32
    }

    fn merge_postings(&mut self) {
        let reverse = self.guard.imported().reference().reverse_mapping();
        let target_limit = self.target_doc_id_limit();
        let merger = &mut self.merger;
        let mut iterator = self.target_context.create_iterator(true);
        if self.use_bit_vector {
            merger.alloc_bit_vector();
            for_each_hit(iterator.as_mut(), 1, target_limit, |target_lid, _| {
                reverse.for_each_local(target_lid, |lid| merger.set_bit(lid));
            });
        } else {
            merger.reserve_array(0, 0);
            for_each_hit(iterator.as_mut(), 1, target_limit, |target_lid, weight| {
                if let Some(lids) = reverse.get(target_lid) {
                    merger.add_run(lids.iter().copied(), weight);
                }
            });
            merger.merge();
        }
        drop(iterator);

        if let Some(bv) = self.merger.take_bit_vector() {
            let bv = Arc::new(bv);
            self.insert_into_cache(&bv);
            self.bit_vector = Some(bv);
        }
    }

    fn insert_into_cache(&mut self, bit_vector: &Arc<BitVector>) {
        let (Some(cache), Some((local_guard, target_guard))) =
            (self.guard.imported().search_cache(), self.cache_guards.take())
        else {
            return;
        };
        let entry = CacheEntry {
            local_guard,
            target_guard,
            bit_vector: Arc::clone(bit_vector),
            doc_id_limit: self.guard.local_doc_id_limit(),
        };
        cache.insert(self.term.as_str(), Arc::new(entry));
        debug!(
            target: "attr::imported",
            name = self.guard.imported().name(),
            term = self.term.as_str(),
            hits = bit_vector.count_true_bits(),
            "Cached merged search result"
        );
    }
}

impl SearchContext for ImportedSearchContext<'_> {
    fn approximate_hits(&self) -> u32 {
        if let Some(entry) = &self.cached {
            return entry.bit_vector.count_true_bits();
        }
        let target_hits = self.target_context.approximate_hits();
        if target_hits == 0 {
            self.zero_hits.store(true, Ordering::Relaxed);
            return 0;
        }
        if !self.guard.target().fast_search() {
            return self.guard.local_doc_id_limit();
        }
        let min_hits = self.guard.imported().min_target_hits_for_approximation();
        if target_hits >= min_hits {
            self.scaled_hits(target_hits)
        } else {
            self.exact_hits()
        }
    }

    fn fetch_postings(&mut self, exec_info: &ExecuteInfo) {
        if self.cached.is_some() || self.fetched {
            return;
        }
        self.fetched = true;
        self.target_context.fetch_postings(exec_info);
        if self.zero_hits.load(Ordering::Relaxed) {
            return;
        }
        let fast_and_dense =
            self.guard.target().fast_search() && exec_info.hit_rate > MERGE_HIT_RATE_THRESHOLD;
        if exec_info.strict || fast_and_dense {
            self.merge_postings();
        }
    }

    fn create_iterator(&self, strict: bool) -> Box<dyn SearchIterator + '_> {
        if let Some(entry) = &self.cached {
            return Box::new(BitVectorIterator::new(
                Arc::clone(&entry.bit_vector),
                entry.doc_id_limit,
                strict,
            ));
        }
        if self.zero_hits.load(Ordering::Relaxed) {
            return Box::new(EmptyIterator::new());
        }
        if self.merger.is_array_valid() {
            return Box::new(ArrayPostingIterator::new(self.merger.array()));
        }
        if let Some(bv) = &self.bit_vector {
            return Box::new(BitVectorIterator::new(
                Arc::clone(bv),
                self.guard.local_doc_id_limit(),
                strict,
            ));
        }
        Box::new(ProbeIterator::new(self, strict))
    }

    fn matches(&self, lid: DocId) -> Option<i32> {
        if let Some(entry) = &self.cached {
            return (lid < entry.doc_id_limit && entry.bit_vector.test_bit(lid)).then_some(1);
        }
        if lid == 0 || lid >= self.guard.local_doc_id_limit() {
            return None;
        }
        match self.guard.target_lid(lid) {
            0 => None,
            target_lid => self.target_context.matches(target_lid),
        }
    }

    fn doc_id_limit(&self) -> DocId {
        match &self.cached {
            Some(entry) => entry.doc_id_limit,
            None => self.guard.local_doc_id_limit(),
        }
    }

    fn term(&self) -> &QueryTerm {
        &self.term
    }
}
