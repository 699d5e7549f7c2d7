//! Integration tests for imported attributes
//!
//! Two collections are wired the way a deployment wires them: a parent
//! collection with a meta store and an int32 attribute whose value equals
//! its lid, and a child collection whose reference attribute listens to the
//! parent meta store. Tests cover:
//! - Read translation through the reference, including stale target lids
//! - Posting-list merging for strict, filter and probing searches
//! - Hit estimation paths
//! - The bit vector search cache and its lid-reuse protection

use proptest::prelude::*;
use std::sync::Arc;

use attrstore_core::{AttributeConfig, BasicType, CollectionType, DocId, GlobalId, QueryTerm};
use attrstore_engine::search::collect_hits;
use attrstore_engine::{
    create_attribute, AttributeVector, DocumentMetaStore, ExecuteInfo, GidToLidChangeListener,
    ImportedAttributeVector, ImportedSearchContext, ReadableAttribute, ReferenceAttribute, SearchContext,
    SearchIterator, SearchParams,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn parent_gid(n: u32) -> GlobalId {
    GlobalId(10_000 + n as u64)
}

struct Collections {
    target_meta: Arc<DocumentMetaStore>,
    target: Arc<dyn AttributeVector>,
    local_meta: Arc<DocumentMetaStore>,
    reference: Arc<ReferenceAttribute>,
}

impl Collections {
    /// Parent collection with lids `1..=parents`, value of lid `n` is `n % modulo`
    fn new(parents: u32, modulo: u32, fast_search: bool) -> Self {
        let target_meta = Arc::new(DocumentMetaStore::new("parent"));
        let reference = Arc::new(ReferenceAttribute::new("parent_ref", "/nonexistent/parent_ref"));
        reference.add_reserved_doc();
        target_meta.add_listener(Arc::clone(&reference) as Arc<dyn GidToLidChangeListener>);

        let config = AttributeConfig::new(BasicType::Int32, CollectionType::Single).with_fast_search(fast_search);
        let target = create_attribute("price", &config, "/nonexistent/price").unwrap();
        target.add_reserved_doc();
        for n in 1..=parents {
            assert_eq!(target_meta.put(parent_gid(n)), n);
        }
        target_meta.commit();
        target.add_docs(parents).unwrap();
        for lid in 1..=parents {
            target.update_int(lid, (lid % modulo) as i64);
        }
        target.commit(false);

        Collections {
            target_meta,
            target,
            local_meta: Arc::new(DocumentMetaStore::new("child")),
            reference,
        }
    }

    /// Child lid `i + 1` references parent lid `targets[i]`; 0 leaves it unset
    fn add_children(&self, targets: &[u32]) {
        let first = self.reference.committed_doc_id_limit();
        self.reference.add_docs(targets.len() as u32).unwrap();
        for (i, &target) in targets.iter().enumerate() {
            let lid = self.local_meta.put(GlobalId(first as u64 + i as u64));
            assert_eq!(lid, first + i as DocId);
            if target != 0 {
                assert!(self.reference.update(lid, parent_gid(target)));
            }
        }
        self.local_meta.commit();
        self.reference.commit(false);
    }

    fn imported(&self, search_cache: bool) -> Arc<ImportedAttributeVector> {
        Arc::new(ImportedAttributeVector::new(
            "parent_price",
            Arc::clone(&self.reference),
            Arc::clone(&self.local_meta),
            Arc::clone(&self.target),
            Arc::clone(&self.target_meta),
            search_cache,
        ))
    }
}

fn strict_hits(ctx: &mut dyn SearchContext, info: &ExecuteInfo) -> Vec<DocId> {
    ctx.fetch_postings(info);
    let limit = ctx.doc_id_limit();
    let mut iterator = ctx.create_iterator(true);
    collect_hits(iterator.as_mut(), 1, limit)
}

// ============================================================================
// Read translation
// ============================================================================

mod reads {
    use super::*;

    #[test]
    fn test_reads_forward_through_reference() {
        let c = Collections::new(30, 1000, false);
        c.add_children(&[10, 10, 20, 0, 30]);
        let imported = c.imported(false);
        let guard = imported.make_read_guard(false);

        assert!(guard.is_imported());
        assert_eq!(guard.basic_type(), BasicType::Int32);
        for lid in 1..=5 {
            let target_lid = c.reference.target_lid(lid);
            assert_eq!(guard.get_int(lid), c.target.get_int(target_lid), "lid {}", lid);
        }
        assert_eq!(guard.get_int(1), 10);
        assert_eq!(guard.get_int(3), 20);
        assert_eq!(guard.get_int(4), c.target.get_int(0));
        assert_eq!(guard.get_int(99), c.target.get_int(0));
        assert_eq!(
            guard.serialize_for_sort(2, true),
            c.target.serialize_for_sort(10, true)
        );
    }

    #[test]
    fn test_stale_target_lid_reads_as_lid_zero() {
        let c = Collections::new(20, 1000, false);
        // parent 21 exists in the meta store but not yet in the attribute
        assert_eq!(c.target_meta.put(parent_gid(21)), 21);
        c.target_meta.commit();
        c.add_children(&[5, 21]);
        assert_eq!(c.reference.target_lid(2), 21);

        let imported = c.imported(false);
        let guard = imported.make_read_guard(false);
        assert_eq!(guard.target_doc_id_limit(), 21);
        assert_eq!(guard.target_lid(2), 0);
        assert_eq!(guard.get_int(2), c.target.get_int(0));
        assert_eq!(guard.get_int(1), 5);
    }

    #[test]
    fn test_guard_snapshot_ignores_later_children() {
        let c = Collections::new(10, 1000, false);
        c.add_children(&[1]);
        let imported = c.imported(false);
        let guard = imported.make_read_guard(false);
        c.add_children(&[2]);
        assert_eq!(guard.local_doc_id_limit(), 2);
        assert_eq!(guard.get_int(2), c.target.get_int(0));
        assert_eq!(imported.make_read_guard(false).get_int(2), 2);
    }

    #[test]
    fn test_reference_follows_parent_removal() {
        let c = Collections::new(10, 1000, false);
        c.add_children(&[7]);
        c.target_meta.remove(parent_gid(7));
        c.target_meta.commit();
        let imported = c.imported(false);
        assert_eq!(imported.make_read_guard(false).target_lid(1), 0);
    }
}

// ============================================================================
// Search
// ============================================================================

mod search {
    use super::*;

    #[test]
    fn test_merged_iterator_follows_reverse_mapping() {
        let c = Collections::new(20, 1000, true);
        c.add_children(&[10, 10, 20]);
        let imported = c.imported(false);
        let guard = imported.make_read_guard(false);
        let term = QueryTerm::new("10");

        let mut ranked = guard.create_search_context(&term, &SearchParams::default());
        assert_eq!(ranked.approximate_hits(), 2);
        assert_eq!(strict_hits(ranked.as_mut(), &ExecuteInfo::FULL), vec![1, 2]);

        let filter = SearchParams { use_bit_vector: true };
        let mut bits = guard.create_search_context(&term, &filter);
        assert_eq!(strict_hits(bits.as_mut(), &ExecuteInfo::FULL), vec![1, 2]);

        let mut lazy_ctx = guard.create_search_context(&term, &SearchParams::default());
        assert_eq!(strict_hits(lazy_ctx.as_mut(), &ExecuteInfo::new(false, 0.0)), vec![1, 2]);
        assert_eq!(lazy_ctx.matches(3), None);
        assert_eq!(lazy_ctx.matches(1), Some(1));
    }

    #[test]
    fn test_zero_target_hits_short_circuit() {
        let c = Collections::new(20, 1000, true);
        c.add_children(&[1, 2, 3]);
        let imported = c.imported(false);
        let guard = imported.make_read_guard(false);
        let mut ctx = guard.create_search_context(&QueryTerm::new("999"), &SearchParams::default());
        assert_eq!(ctx.approximate_hits(), 0);
        assert!(strict_hits(ctx.as_mut(), &ExecuteInfo::FULL).is_empty());
    }

    #[test]
    fn test_estimate_without_fast_search_is_local_limit() {
        let c = Collections::new(20, 1000, false);
        c.add_children(&[10, 10, 20]);
        let imported = c.imported(false);
        let guard = imported.make_read_guard(false);
        let mut ctx = guard.create_search_context(&QueryTerm::new("10"), &SearchParams::default());
        assert_eq!(ctx.approximate_hits(), guard.local_doc_id_limit());
        assert_eq!(strict_hits(ctx.as_mut(), &ExecuteInfo::FULL), vec![1, 2]);
    }

    #[test]
    fn test_scaled_estimate_above_threshold() {
        let c = Collections::new(20, 1000, true);
        c.add_children(&[10, 10, 20]);
        let imported = Arc::new(
            ImportedAttributeVector::new(
                "parent_price",
                Arc::clone(&c.reference),
                Arc::clone(&c.local_meta),
                Arc::clone(&c.target),
                Arc::clone(&c.target_meta),
                false,
            )
            .with_min_target_hits_for_approximation(1),
        );
        let guard = imported.make_read_guard(false);
        let ctx = guard.create_search_context(&QueryTerm::new("10"), &SearchParams::default());
        // one target hit, local space smaller than target space: ratio clamps to 1
        assert_eq!(ctx.approximate_hits(), 1);
    }

    #[test]
    fn test_weights_come_from_target_hits() {
        let config = AttributeConfig::new(BasicType::String, CollectionType::WeightedSet).with_fast_search(true);
        let target = create_attribute("tags", &config, "/nonexistent/tags").unwrap();
        target.add_reserved_doc();
        let c = Collections::new(3, 1000, true);
        target.add_docs(3).unwrap();
        target.append(2, &attrstore_core::AttrValue::String("red".into()), 42);
        target.commit(false);
        c.add_children(&[2, 1, 2]);

        let imported = Arc::new(ImportedAttributeVector::new(
            "parent_tags",
            Arc::clone(&c.reference),
            Arc::clone(&c.local_meta),
            target,
            Arc::clone(&c.target_meta),
            false,
        ));
        let guard = imported.make_read_guard(false);
        let mut ctx = guard.create_search_context(&QueryTerm::new("red"), &SearchParams::default());
        ctx.fetch_postings(&ExecuteInfo::FULL);
        let mut it = ctx.create_iterator(true);
        it.init_range(1, guard.local_doc_id_limit());
        assert!(it.seek(1));
        assert_eq!(it.unpack(1), 42);
        assert!(!it.seek(2));
        assert_eq!(it.doc_id(), 3);
        assert_eq!(it.unpack(3), 42);
    }
}

// ============================================================================
// Search cache
// ============================================================================

mod cache {
    use super::*;

    #[test]
    fn test_filter_result_is_cached_and_reused() {
        let c = Collections::new(20, 1000, true);
        c.add_children(&[10, 10, 20]);
        let imported = c.imported(true);
        let term = QueryTerm::new("10");
        let filter = SearchParams { use_bit_vector: true };
        {
            let guard = imported.make_read_guard(false);
            let mut ctx = ImportedSearchContext::new(&guard, &term, &filter);
            assert!(!ctx.is_cache_hit());
            assert_eq!(strict_hits(&mut ctx, &ExecuteInfo::FULL), vec![1, 2]);
        }
        let cache = imported.search_cache().unwrap();
        assert_eq!(cache.len(), 1);
        let entry = cache.find("10").unwrap();
        assert_eq!(entry.bit_vector.iter_true().collect::<Vec<_>>(), vec![1, 2]);

        let guard = imported.make_read_guard(false);
        let mut ctx = ImportedSearchContext::new(&guard, &term, &filter);
        assert!(ctx.is_cache_hit());
        assert_eq!(ctx.approximate_hits(), 2);
        assert_eq!(strict_hits(&mut ctx, &ExecuteInfo::FULL), vec![1, 2]);

        imported.clear_search_cache();
        assert!(cache.find("10").is_none());
        let ctx = ImportedSearchContext::new(&guard, &term, &filter);
        assert!(!ctx.is_cache_hit());
    }

    #[test]
    fn test_ranked_result_is_not_cached() {
        let c = Collections::new(20, 1000, true);
        c.add_children(&[10]);
        let imported = c.imported(true);
        let guard = imported.make_read_guard(false);
        let mut ctx = guard.create_search_context(&QueryTerm::new("10"), &SearchParams::default());
        assert_eq!(strict_hits(ctx.as_mut(), &ExecuteInfo::FULL), vec![1]);
        assert!(imported.search_cache().unwrap().is_empty());
    }

    #[test]
    fn test_cache_entry_blocks_target_lid_reuse() {
        let c = Collections::new(20, 1000, true);
        c.add_children(&[10, 10, 20]);
        let imported = c.imported(true);
        {
            let guard = imported.make_read_guard(false);
            let filter = SearchParams { use_bit_vector: true };
            let mut ctx = guard.create_search_context(&QueryTerm::new("10"), &filter);
            strict_hits(ctx.as_mut(), &ExecuteInfo::FULL);
        }
        assert_eq!(imported.search_cache().unwrap().len(), 1);

        c.target_meta.remove(parent_gid(10));
        c.target_meta.commit();
        assert_eq!(c.target_meta.put(GlobalId(1)), 21);

        imported.clear_search_cache();
        c.target_meta.commit();
        assert_eq!(c.target_meta.put(GlobalId(2)), 10);
    }
}

// ============================================================================
// Merge correctness
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn merged_hits_are_exactly_referrers_of_target_hits(
        targets in proptest::collection::vec(0u32..=40, 1..60),
        wanted in 0u32..5,
        filter in any::<bool>(),
        strict in any::<bool>(),
    ) {
        let c = Collections::new(40, 5, true);
        c.add_children(&targets);
        let imported = c.imported(false);
        let guard = imported.make_read_guard(false);
        let params = SearchParams { use_bit_vector: filter };
        let mut ctx = guard.create_search_context(&QueryTerm::new(wanted.to_string()), &params);
        let info = if strict { ExecuteInfo::FULL } else { ExecuteInfo::new(false, 0.0) };

        let expected: Vec<DocId> = targets
            .iter()
            .enumerate()
            .filter(|(_, &t)| t != 0 && t % 5 == wanted)
            .map(|(i, _)| i as DocId + 1)
            .collect();
        if ctx.approximate_hits() == 0 {
            prop_assert!(expected.is_empty());
        }
        prop_assert_eq!(strict_hits(ctx.as_mut(), &info), expected);
    }
}
