//! Lid-space lifecycle across every store layout
//!
//! Random sequences of add, assign, commit, compact and shrink must keep
//! the committed limit within the allocated lid space and leave compacted
//! lids reading exactly like the reserved lid 0. Saved attributes load back
//! with identical contents.

use proptest::prelude::*;
use std::path::Path;

use attrstore_core::{AttrValue, AttributeConfig, BasicType, CollectionType, DocId};
use attrstore_engine::{
    apply_update, create_attribute, AttributeVector, CompactableLidSpace, ReadableAttribute, ValueUpdate,
};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

const LAYOUTS: [(BasicType, CollectionType); 6] = [
    (BasicType::Int32, CollectionType::Single),
    (BasicType::Double, CollectionType::Single),
    (BasicType::String, CollectionType::Single),
    (BasicType::Int64, CollectionType::Array),
    (BasicType::String, CollectionType::WeightedSet),
    (BasicType::Bool, CollectionType::Array),
];

fn attribute(dir: &Path, name: &str, layout: (BasicType, CollectionType)) -> std::sync::Arc<dyn AttributeVector> {
    let config = AttributeConfig::new(layout.0, layout.1);
    let attr = create_attribute(name, &config, dir.join(name)).unwrap();
    attr.add_reserved_doc();
    attr
}

fn value_for(basic_type: BasicType, n: u8) -> AttrValue {
    match basic_type {
        BasicType::String => AttrValue::String(format!("v{}", n)),
        BasicType::Bool => AttrValue::Int((n % 2) as i64),
        _ => AttrValue::Int(n as i64),
    }
}

/// Everything a reader can observe about one lid
fn observed(attr: &dyn ReadableAttribute, lid: DocId) -> (u32, Vec<u8>, String) {
    (
        attr.value_count(lid),
        attr.serialize_for_sort(lid, true),
        format!("{:?}", attr.get_values(lid)),
    )
}

#[derive(Debug, Clone)]
enum Op {
    AddDocs(u32),
    Assign { lid: u16, value: u8 },
    Commit,
    /// Compact to this share (in percent) of the committed limit
    Compact(u8),
    Shrink,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u32..6).prop_map(Op::AddDocs),
        6 => (any::<u16>(), any::<u8>()).prop_map(|(lid, value)| Op::Assign { lid, value }),
        2 => Just(Op::Commit),
        1 => (0u8..=100).prop_map(Op::Compact),
        1 => Just(Op::Shrink),
    ]
}

// ============================================================================
// Lid space invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lid_space_stays_consistent(layout in 0..LAYOUTS.len(), ops in prop::collection::vec(op_strategy(), 1..60)) {
        let dir = TempDir::new().unwrap();
        let layout = LAYOUTS[layout];
        let attr = attribute(dir.path(), "a", layout);
        let reserved = observed(attr.as_readable(), 0);

        for op in ops {
            match op {
                Op::AddDocs(count) => {
                    let before = attr.committed_doc_id_limit().min(attr.num_docs());
                    let allocated = attr.num_docs();
                    let (first, last) = attr.add_docs(count).unwrap();
                    prop_assert!(first >= before && first <= allocated);
                    prop_assert_eq!(last, first + count - 1);
                    prop_assert!(attr.num_docs() >= allocated.max(last + 1));
                }
                Op::Assign { lid, value } => {
                    let num_docs = attr.num_docs();
                    let lid = 1 + lid as DocId % num_docs.max(1);
                    let accepted = apply_update(attr.as_ref(), lid, &ValueUpdate::Assign(value_for(layout.0, value)));
                    prop_assert_eq!(accepted, lid < num_docs);
                }
                Op::Commit => attr.commit(false),
                Op::Compact(percent) => {
                    attr.commit(false);
                    let committed = attr.committed_doc_id_limit();
                    let wanted = (committed as u64 * percent as u64 / 100).max(1) as DocId;
                    attr.compact_lid_space(wanted);
                    prop_assert_eq!(attr.committed_doc_id_limit(), wanted);
                    for lid in wanted..committed {
                        prop_assert_eq!(&observed(attr.as_readable(), lid), &reserved, "lid {}", lid);
                    }
                }
                Op::Shrink => {
                    attr.shrink_lid_space();
                    prop_assert!(!attr.can_shrink_lid_space());
                    prop_assert_eq!(attr.num_docs(), attr.committed_doc_id_limit());
                }
            }
            prop_assert!(attr.committed_doc_id_limit() <= attr.num_docs());
            prop_assert!(attr.committed_doc_id_limit() >= 1);
        }
        prop_assert_eq!(&observed(attr.as_readable(), 0), &reserved);
    }
}

#[test]
fn test_shrink_is_idempotent() {
    let dir = TempDir::new().unwrap();
    for layout in LAYOUTS {
        let attr = attribute(dir.path(), "s", layout);
        attr.add_docs(9).unwrap();
        attr.commit(false);
        attr.compact_lid_space(4);
        attr.shrink_lid_space();
        assert_eq!(attr.num_docs(), 4);
        attr.shrink_lid_space();
        assert_eq!(attr.num_docs(), 4);
        assert_eq!(attr.committed_doc_id_limit(), 4);
        assert_eq!(attr.add_doc(), Some(4));
    }
}

#[test]
fn test_add_after_compact_reuses_unpublished_lids() {
    let dir = TempDir::new().unwrap();
    for layout in LAYOUTS {
        let attr = attribute(dir.path(), "r", layout);
        let reserved = observed(attr.as_readable(), 0);
        attr.add_docs(9).unwrap();
        attr.commit(false);
        attr.compact_lid_space(5);
        assert_eq!(attr.num_docs(), 10);

        // a write to a compacted lid does not survive its reuse
        assert!(apply_update(attr.as_ref(), 7, &ValueUpdate::Assign(value_for(layout.0, 1))));
        assert_eq!(attr.add_doc(), Some(5));
        assert!(apply_update(attr.as_ref(), 5, &ValueUpdate::Assign(value_for(layout.0, 3))));
        attr.commit(false);
        assert_eq!(attr.committed_doc_id_limit(), 6);
        assert_ne!(observed(attr.as_readable(), 5), reserved);

        assert_eq!(attr.add_docs(3), Some((6, 8)));
        attr.commit(false);
        assert_eq!(attr.committed_doc_id_limit(), 9);
        assert_eq!(observed(attr.as_readable(), 7), reserved);

        assert_eq!(attr.add_docs(3), Some((9, 11)));
        attr.commit(false);
        assert_eq!(attr.committed_doc_id_limit(), 12);
        assert_eq!(attr.num_docs(), 12);
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_save_load_every_layout() {
    let dir = TempDir::new().unwrap();
    for (i, layout) in LAYOUTS.into_iter().enumerate() {
        let name = format!("attr{}", i);
        let attr = attribute(dir.path(), &name, layout);
        attr.add_docs(12).unwrap();
        for lid in 1..12u32 {
            if lid % 4 != 0 {
                assert!(apply_update(attr.as_ref(), lid, &ValueUpdate::Assign(value_for(layout.0, lid as u8))));
            }
        }
        if layout.1.is_multi_value() {
            assert!(apply_update(attr.as_ref(), 5, &ValueUpdate::Add {
                value: value_for(layout.0, 200),
                weight: 3,
            }));
        }
        attr.commit(false);
        attr.save().unwrap();

        let config = AttributeConfig::new(layout.0, layout.1);
        let loaded = create_attribute(&name, &config, dir.path().join(&name)).unwrap();
        assert!(loaded.load(), "{:?} failed to load", layout);
        assert_eq!(loaded.committed_doc_id_limit(), 13);
        assert_eq!(loaded.num_docs(), 13);
        for lid in 0..13 {
            assert_eq!(
                observed(loaded.as_readable(), lid),
                observed(attr.as_readable(), lid),
                "{:?} lid {}",
                layout,
                lid
            );
        }
    }
}

#[test]
fn test_load_rejects_other_layout() {
    let dir = TempDir::new().unwrap();
    let attr = attribute(dir.path(), "x", (BasicType::Int32, CollectionType::Single));
    attr.add_docs(2).unwrap();
    attr.commit(false);
    attr.save().unwrap();

    let other = AttributeConfig::new(BasicType::Int32, CollectionType::Array);
    let loaded = create_attribute("x", &other, dir.path().join("x")).unwrap();
    assert!(!loaded.load());
    assert_eq!(loaded.num_docs(), 0);
    assert!(!loaded.base().is_loaded());
}
