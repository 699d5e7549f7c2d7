//! End-to-end flow through the public facade
//!
//! attributes.toml -> manager -> writes -> search and sort -> save ->
//! a fresh manager serving the same values.

use std::fs;

use attrstore::{
    apply_update, collect_hits, AttrValue, AttributeManager, AttributesConfig, ExecuteInfo, QueryTerm,
    SearchParams, ValueUpdate,
};
use tempfile::TempDir;

const CONFIG: &str = r#"
[[attribute]]
name = "price"
datatype = "int32"
fast_search = true

[[attribute]]
name = "title"
datatype = "string"

[[attribute]]
name = "tags"
datatype = "string"
collectiontype = "weightedset"
"#;

fn manager(dir: &TempDir) -> AttributeManager {
    let path = dir.path().join("attributes.toml");
    fs::write(&path, CONFIG).unwrap();
    let mut config = AttributesConfig::from_file(&path).unwrap();
    config.manager.base_dir = dir.path().to_path_buf();
    AttributeManager::from_config(&config)
}

fn populate(manager: &AttributeManager) {
    let price = manager.get_attribute("price").unwrap();
    let title = manager.get_attribute("title").unwrap();
    let tags = manager.get_attribute("tags").unwrap();
    for attr in [&price, &title, &tags] {
        attr.add_docs(5).unwrap();
    }
    for (lid, (p, t)) in [(30, "delta"), (10, "alpha"), (20, "charlie"), (15, "bravo"), (99, "echo")]
        .into_iter()
        .enumerate()
    {
        let lid = lid as u32 + 1;
        assert!(apply_update(price.as_ref(), lid, &ValueUpdate::Assign(AttrValue::Int(p))));
        assert!(apply_update(title.as_ref(), lid, &ValueUpdate::Assign(AttrValue::String(t.into()))));
        assert!(apply_update(tags.as_ref(), lid, &ValueUpdate::Add {
            value: AttrValue::String("all".into()),
            weight: lid as i32,
        }));
    }
    for attr in [&price, &title, &tags] {
        attr.commit(false);
    }
}

fn range_hits(manager: &AttributeManager, name: &str, term: &str) -> Vec<u32> {
    let guard = manager.get_attribute_read_guard(name, false).unwrap();
    let attr = guard.attribute();
    let mut ctx = attr.create_search_context(&QueryTerm::new(term), &SearchParams::default());
    ctx.fetch_postings(&ExecuteInfo::FULL);
    let mut it = ctx.create_iterator(true);
    collect_hits(it.as_mut(), 1, attr.committed_doc_id_limit())
}

#[test]
fn test_configure_write_search_save_reload() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = TempDir::new().unwrap();
    let first = manager(&dir);
    populate(&first);

    assert_eq!(range_hits(&first, "price", "[10;20]"), vec![2, 3, 4]);
    assert_eq!(range_hits(&first, "title", "ch*"), vec![3]);
    assert_eq!(range_hits(&first, "tags", "all"), vec![1, 2, 3, 4, 5]);

    let ctx = first.create_context();
    let title = ctx.get_attribute("title").unwrap();
    let mut by_title: Vec<u32> = (1..6).collect();
    by_title.sort_by_key(|&lid| title.attribute().serialize_for_sort(lid, true));
    assert_eq!(by_title, vec![2, 4, 3, 1, 5]);
    drop(title);
    drop(ctx);

    first.save_all().unwrap();
    drop(first);

    let second = manager(&dir);
    let price = second.get_attribute_read_guard("price", false).unwrap();
    assert_eq!(price.attribute().committed_doc_id_limit(), 6);
    assert_eq!(price.attribute().get_int(5), 99);
    assert_eq!(range_hits(&second, "price", "<16"), vec![2, 4]);
    let tags = second.get_attribute_read_guard("tags", false).unwrap();
    assert_eq!(tags.attribute().get_values(4)[0].weight, 4);
}
