//! Posting list merger for imported searches
//!
//! Each target hit contributes one sorted run of local lids (the reverse
//! mapping of the target lid) carrying the target hit's weight. Runs are
//! appended to one array and merged pairwise until a single ascending run
//! remains. Filter searches skip weights entirely and set bits instead.

use attrstore_core::{BitVector, DocId};

/// Accumulates per-target-hit runs into one posting list over local lids
#[derive(Debug)]
pub struct PostingListMerger {
    doc_id_limit: DocId,
    array: Vec<(DocId, i32)>,
    run_starts: Vec<usize>,
    array_valid: bool,
    bit_vector: Option<BitVector>,
}

impl PostingListMerger {
    /// Merger over local lids `[0, doc_id_limit)`
    pub fn new(doc_id_limit: DocId) -> Self {
        PostingListMerger {
            doc_id_limit,
            array: Vec::new(),
            run_starts: Vec::new(),
            array_valid: false,
            bit_vector: None,
        }
    }

    /// Local lid limit
    pub fn doc_id_limit(&self) -> DocId {
        self.doc_id_limit
    }

    /// Start array merging with room for `entries` postings
    pub fn reserve_array(&mut self, runs: usize, entries: usize) {
        self.array_valid = true;
        self.run_starts.reserve(runs);
        self.array.reserve(entries);
    }

    /// Append one ascending run; lids at or beyond the limit are dropped
    pub fn add_run<I: IntoIterator<Item = DocId>>(&mut self, lids: I, weight: i32) {
        self.array_valid = true;
        let start = self.array.len();
        let limit = self.doc_id_limit;
        self.array
            .extend(lids.into_iter().filter(|&lid| lid < limit).map(|lid| (lid, weight)));
        if self.array.len() > start {
            self.run_starts.push(start);
        }
    }

    /// Merge all runs into one ascending run
    pub fn merge(&mut self) {
        if self.run_starts.len() <= 1 {
            self.run_starts.clear();
            return;
        }
        let mut starts = std::mem::take(&mut self.run_starts);
        let mut scratch = Vec::with_capacity(self.array.len());
        while starts.len() > 1 {
            let len = self.array.len();
            let end_of = |i: usize| starts.get(i).copied().unwrap_or(len);
            let mut merged_starts = Vec::with_capacity(starts.len() / 2 + 1);
            scratch.clear();
            let mut i = 0;
            while i < starts.len() {
                merged_starts.push(scratch.len());
                let a = &self.array[starts[i]..end_of(i + 1)];
                if i + 1 < starts.len() {
                    let b = &self.array[starts[i + 1]..end_of(i + 2)];
                    merge_runs(a, b, &mut scratch);
                } else {
                    scratch.extend_from_slice(a);
                }
                i += 2;
            }
            std::mem::swap(&mut self.array, &mut scratch);
            starts = merged_starts;
        }
    }

    /// Switch to bit vector merging
    pub fn alloc_bit_vector(&mut self) {
        self.bit_vector = Some(BitVector::new(self.doc_id_limit));
    }

    /// Set `lid` in the bit vector; ignored beyond the limit
    pub fn set_bit(&mut self, lid: DocId) {
        if let Some(bv) = self.bit_vector.as_mut() {
            if lid < bv.size() {
                bv.set_bit(lid);
            }
        }
    }

    /// Whether the merged array is the result
    pub fn is_array_valid(&self) -> bool {
        self.array_valid
    }

    /// Whether the bit vector is the result
    pub fn is_bit_vector_valid(&self) -> bool {
        self.bit_vector.is_some()
    }

    /// Merged `(lid, weight)` postings
    pub fn array(&self) -> &[(DocId, i32)] {
        &self.array
    }

    /// Take the merged bit vector
    pub fn take_bit_vector(&mut self) -> Option<BitVector> {
        self.bit_vector.take()
    }
}

fn merge_runs(a: &[(DocId, i32)], b: &[(DocId, i32)], out: &mut Vec<(DocId, i32)>) {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].0 <= b[j].0 {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_merge_three_runs() {
        let mut m = PostingListMerger::new(100);
        m.add_run([5, 9], 1);
        m.add_run([1, 2, 50], 2);
        m.add_run([3], 3);
        m.merge();
        assert_eq!(m.array(), &[(1, 2), (2, 2), (3, 3), (5, 1), (9, 1), (50, 2)]);
    }

    #[test]
    fn test_runs_clipped_to_limit() {
        let mut m = PostingListMerger::new(4);
        m.add_run([1, 4, 7], 1);
        m.add_run([9], 1);
        m.merge();
        assert_eq!(m.array(), &[(1, 1)]);
        assert!(m.is_array_valid());
    }

    #[test]
    fn test_bit_vector_mode() {
        let mut m = PostingListMerger::new(8);
        m.alloc_bit_vector();
        m.set_bit(3);
        m.set_bit(12);
        let bv = m.take_bit_vector().unwrap();
        assert_eq!(bv.iter_true().collect::<Vec<_>>(), vec![3]);
    }

    proptest! {
        #[test]
        fn merged_array_is_sorted_union(
            lids in proptest::collection::btree_set(1u32..500, 0..120),
            splits in proptest::collection::vec(0usize..8, 120),
        ) {
            // Deal the lids into disjoint ascending runs, like reverse mapping sets
            let mut runs: Vec<Vec<DocId>> = vec![Vec::new(); 8];
            for (lid, run) in lids.iter().zip(splits.iter()) {
                runs[*run].push(*lid);
            }
            let mut m = PostingListMerger::new(500);
            for (i, run) in runs.iter().enumerate() {
                m.add_run(run.iter().copied(), i as i32);
            }
            m.merge();
            let merged: Vec<DocId> = m.array().iter().map(|&(lid, _)| lid).collect();
            let expected: Vec<DocId> = lids.into_iter().collect();
            prop_assert_eq!(merged, expected);
        }
    }
}
