//! Single-value numeric attribute
//!
//! Values live in an RCU vector indexed by lid, so readers load them
//! without locking. Writes are buffered and applied on commit in the
//! order they were made.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use attrstore_concurrency::RcuVector;
use attrstore_core::{
    ArithmeticOp, AttrValue, AttributeConfig, DocId, Error, QueryTerm, Result, Weighted,
};
use attrstore_storage::{AttributeReader, FileKind, SaveTarget};

use super::{
    attribute_vector_plumbing, check_fixed_width_body, delegate_base_metadata, AttributeBase,
    AttributeVector, NumericValue, ReadableAttribute, StoreStats,
};
use crate::search::{AttributeSearchContext, SearchContext, SearchParams, TermMatcher};

#[derive(Debug, Clone, Copy)]
enum Change<T> {
    Assign(DocId, T),
    Arithmetic(DocId, ArithmeticOp, f64),
    Clear(DocId),
}

/// One numeric value per document
pub struct SingleValueNumericAttribute<T: NumericValue> {
    base: AttributeBase,
    data: RcuVector<T>,
    changes: Mutex<Vec<Change<T>>>,
}

impl<T: NumericValue> SingleValueNumericAttribute<T> {
    /// Create an empty attribute
    pub fn new(name: impl Into<String>, config: AttributeConfig, base_file_name: impl Into<PathBuf>) -> Self {
        let base = AttributeBase::new(name, config, base_file_name);
        let data = RcuVector::new(Arc::clone(base.generation_holder()));
        SingleValueNumericAttribute {
            base,
            data,
            changes: Mutex::new(Vec::new()),
        }
    }

    /// Committed value of `lid`
    #[inline]
    pub fn get(&self, lid: DocId) -> T {
        self.data.get(lid as usize).unwrap_or_else(T::undefined)
    }

    fn in_range(&self, lid: DocId) -> bool {
        (lid as usize) < self.data.len()
    }

    fn apply_arithmetic_to(current: T, op: ArithmeticOp, operand: f64) -> T {
        if T::is_floating() {
            T::from_f64(op.apply_f64(current.to_f64(), operand))
        } else {
            T::from_i64(op.apply_i64(current.to_i64(), operand))
        }
    }

    fn buffer(&self, lid: DocId, change: Change<T>) -> bool {
        if !self.in_range(lid) {
            return false;
        }
        self.changes.lock().push(change);
        true
    }
}

impl<T: NumericValue> ReadableAttribute for SingleValueNumericAttribute<T> {
    delegate_base_metadata!();

    fn value_count(&self, lid: DocId) -> u32 {
        self.in_range(lid) as u32
    }

    fn get_int(&self, lid: DocId) -> i64 {
        self.get(lid).to_i64()
    }

    fn get_float(&self, lid: DocId) -> f64 {
        self.get(lid).to_f64()
    }

    fn get_string(&self, lid: DocId) -> String {
        let v = self.get(lid);
        if T::is_floating() {
            v.to_f64().to_string()
        } else {
            v.to_i64().to_string()
        }
    }

    fn get_values(&self, lid: DocId) -> Vec<Weighted<AttrValue>> {
        if !self.in_range(lid) {
            return Vec::new();
        }
        let v = self.get(lid);
        let value = if T::is_floating() {
            AttrValue::Float(v.to_f64())
        } else {
            AttrValue::Int(v.to_i64())
        };
        vec![Weighted::new(value, 1)]
    }

    fn match_doc(&self, lid: DocId, matcher: &TermMatcher) -> Option<i32> {
        self.get(lid).matches(matcher).then_some(1)
    }

    fn create_search_context(&self, term: &QueryTerm, params: &SearchParams) -> Box<dyn SearchContext + '_> {
        Box::new(AttributeSearchContext::new(self, term, params))
    }

    fn serialize_for_sort(&self, lid: DocId, ascending: bool) -> Vec<u8> {
        self.get(lid).sort_blob(ascending)
    }
}

impl<T: NumericValue> AttributeVector for SingleValueNumericAttribute<T> {
    attribute_vector_plumbing!();

    fn grow(&self, num_docs: DocId) -> bool {
        self.data.ensure_size(num_docs as usize, T::undefined());
        true
    }

    fn clear_doc(&self, lid: DocId) -> u32 {
        self.buffer(lid, Change::Clear(lid)) as u32
    }

    fn on_commit(&self) {
        let changes = std::mem::take(&mut *self.changes.lock());
        if changes.is_empty() {
            return;
        }
        let mut updates = 0u64;
        let mut non_idempotent = 0u64;
        for change in changes {
            match change {
                Change::Assign(lid, v) => {
                    if self.in_range(lid) {
                        self.data.set(lid as usize, v);
                        updates += 1;
                    }
                }
                Change::Arithmetic(lid, op, operand) => {
                    let current = self.get(lid);
                    if self.in_range(lid) && !current.is_undefined() {
                        self.data
                            .set(lid as usize, Self::apply_arithmetic_to(current, op, operand));
                        updates += 1;
                        non_idempotent += 1;
                    }
                }
                Change::Clear(lid) => {
                    if self.in_range(lid) {
                        self.data.set(lid as usize, T::undefined());
                    }
                }
            }
        }
        self.base.update_status(|s| {
            s.updates += updates;
            s.non_idempotent_updates += non_idempotent;
        });
    }

    fn store_stats(&self) -> StoreStats {
        StoreStats {
            num_values: self.data.len() as u64,
            num_unique_values: 0,
            memory: self.data.memory_usage(),
        }
    }

    fn on_shrink_lid_space(&self, limit: DocId) {
        self.data.shrink(limit as usize);
    }

    fn on_save(&self, target: &mut dyn SaveTarget, doc_id_limit: DocId) -> Result<()> {
        let dat = target.writer(FileKind::Dat);
        for lid in 0..doc_id_limit {
            self.get(lid).write_le(dat);
        }
        Ok(())
    }

    fn on_load(&self, reader: &AttributeReader) -> Result<()> {
        let limit = reader.header().doc_id_limit as usize;
        let mut body = reader.body(FileKind::Dat);
        check_fixed_width_body(self.base.name(), ".dat", body, limit, std::mem::size_of::<T>())?;
        let mut values = Vec::with_capacity(limit);
        for _ in 0..limit {
            let v = T::read_le(&mut body)
                .map_err(|e| Error::Corruption(format!("{}: {}", self.base.name(), e)))?;
            values.push(v);
        }
        if !body.is_empty() {
            return Err(Error::Corruption(format!(
                "{}: {} trailing bytes in .dat",
                self.base.name(),
                body.len()
            )));
        }
        self.changes.lock().clear();
        self.data.shrink(0);
        self.data.reserve(values.len());
        for v in values {
            self.data.push(v);
        }
        Ok(())
    }

    fn update_int(&self, lid: DocId, value: i64) -> bool {
        self.buffer(lid, Change::Assign(lid, T::from_i64(value)))
    }

    fn update_float(&self, lid: DocId, value: f64) -> bool {
        self.buffer(lid, Change::Assign(lid, T::from_f64(value)))
    }

    fn apply_arithmetic(&self, lid: DocId, op: ArithmeticOp, operand: f64) -> bool {
        self.buffer(lid, Change::Arithmetic(lid, op, operand))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{CommitParam, CompactableLidSpace};
    use attrstore_core::{BasicType, CollectionType};
    use attrstore_storage::MemorySaveTarget;
    use std::time::Duration;

    fn int_attr(name: &str) -> SingleValueNumericAttribute<i32> {
        SingleValueNumericAttribute::new(
            name,
            AttributeConfig::new(BasicType::Int32, CollectionType::Single),
            format!("/nonexistent/{}", name),
        )
    }

    fn filled(n: u32) -> SingleValueNumericAttribute<i32> {
        let a = int_attr("a");
        a.add_reserved_doc();
        a.add_docs(n - 1).unwrap();
        for lid in 1..n {
            assert!(a.update_int(lid, lid as i64 * 10));
        }
        a.commit(false);
        a
    }

    #[test]
    fn test_writes_visible_after_commit() {
        let a = int_attr("a");
        a.add_reserved_doc();
        let lid = a.add_doc().unwrap();
        assert_eq!(lid, 1);
        assert_eq!(a.committed_doc_id_limit(), 1);
        a.update_int(lid, 42);
        assert_eq!(a.get_int(lid), i32::MIN as i64);
        a.commit(false);
        assert_eq!(a.committed_doc_id_limit(), 2);
        assert_eq!(a.get_int(lid), 42);
        assert_eq!(a.get_int(0), i32::MIN as i64);
    }

    #[test]
    fn test_update_out_of_range_is_rejected() {
        let a = int_attr("a");
        a.add_reserved_doc();
        assert!(!a.update_int(5, 1));
    }

    #[test]
    fn test_arithmetic_applies_in_order() {
        let a = filled(3);
        a.apply_arithmetic(1, ArithmeticOp::Add, 5.0);
        a.apply_arithmetic(1, ArithmeticOp::Mul, 2.0);
        a.apply_arithmetic(2, ArithmeticOp::Div, 0.0);
        a.commit(true);
        assert_eq!(a.get_int(1), 30);
        assert_eq!(a.get_int(2), 20);
        assert_eq!(a.status().non_idempotent_updates, 3);
    }

    #[test]
    fn test_compact_lid_space_clears_tail() {
        let a = filled(10);
        assert_eq!(a.committed_doc_id_limit(), 10);
        a.compact_lid_space(5);
        assert_eq!(a.committed_doc_id_limit(), 5);
        assert_eq!(a.num_docs(), 10);
        for lid in 5..10 {
            assert_eq!(a.get(lid), i32::MIN);
        }
        assert_eq!(a.get_int(4), 40);
    }

    #[test]
    fn test_add_doc_after_compact_publishes_reused_lid() {
        let a = filled(10);
        a.compact_lid_space(5);
        assert_eq!(a.add_doc(), Some(5));
        assert!(a.update_int(5, 555));
        a.commit(false);
        assert_eq!(a.committed_doc_id_limit(), 6);
        assert_eq!(a.get_int(5), 555);
        assert_eq!(a.num_docs(), 10);
    }

    #[test]
    fn test_shrink_waits_for_old_readers() {
        let a = filled(10);
        let guard = a.base().take_generation_guard();
        a.compact_lid_space(5);
        assert!(!a.can_shrink_lid_space());
        a.shrink_lid_space();
        assert_eq!(a.num_docs(), 10);

        drop(guard);
        a.shrink_lid_space();
        assert_eq!(a.num_docs(), 5);
        assert_eq!(a.committed_doc_id_limit(), 5);
        assert!(!a.can_shrink_lid_space());
        a.shrink_lid_space();
        assert_eq!(a.num_docs(), 5);
    }

    #[test]
    #[should_panic(expected = "precedes last sync token")]
    fn test_out_of_order_commit_panics() {
        let a = filled(2);
        a.commit_with(CommitParam::new(10, 20));
        a.commit_with(CommitParam::new(15, 25));
    }

    #[test]
    fn test_stats_throttled_unless_forced() {
        let a = filled(4);
        a.base().set_stats_interval(Duration::from_secs(3600));
        a.update_stat(true);
        assert_eq!(a.status().num_docs, 4);
        a.add_docs(2).unwrap();
        a.commit(false);
        assert_eq!(a.status().num_docs, 4);
        a.commit(true);
        assert_eq!(a.status().num_docs, 6);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let a = filled(6);
        let mut target = MemorySaveTarget::new();
        a.save_to(&mut target).unwrap();

        let b = int_attr("b");
        let reader = AttributeReader::from_memory(&target, BasicType::Int32, CollectionType::Single).unwrap();
        b.load_from(&reader).unwrap();
        assert_eq!(b.committed_doc_id_limit(), 6);
        assert!(b.base().is_loaded());
        for lid in 0..6 {
            assert_eq!(b.get(lid), a.get(lid));
        }
    }

    #[test]
    fn test_float_search_and_sort() {
        let f: SingleValueNumericAttribute<f64> = SingleValueNumericAttribute::new(
            "f",
            AttributeConfig::new(BasicType::Double, CollectionType::Single).with_fast_search(true),
            "/nonexistent/f",
        );
        f.add_reserved_doc();
        f.add_docs(3).unwrap();
        f.update_float(1, 1.5);
        f.update_float(2, -3.0);
        f.update_float(3, 7.25);
        f.commit(false);

        let ctx = f.create_search_context(&QueryTerm::new("[0;10]"), &SearchParams::default());
        assert_eq!(ctx.approximate_hits(), 2);
        let mut it = ctx.create_iterator(true);
        assert_eq!(crate::search::collect_hits(it.as_mut(), 1, 4), vec![1, 3]);
        assert!(f.serialize_for_sort(2, true) < f.serialize_for_sort(1, true));
    }

    #[test]
    fn test_load_rejects_limit_beyond_body() {
        let a = filled(6);
        let mut target = MemorySaveTarget::new();
        a.save_to(&mut target).unwrap();
        let mut header = target.header().clone();
        header.doc_id_limit = u32::MAX;
        target.set_header(header);

        let b = int_attr("b");
        let reader = AttributeReader::from_memory(&target, BasicType::Int32, CollectionType::Single).unwrap();
        assert!(matches!(b.load_from(&reader), Err(Error::Corruption(_))));
        assert!(!b.base().is_loaded());
    }
}
