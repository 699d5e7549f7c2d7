//! Search iterators over local document ids
//!
//! An iterator is initialized with a lid range and then driven by `seek`.
//! A strict iterator moves `doc_id()` to the first hit at or after the
//! sought lid; a non-strict one only answers whether the sought lid is a
//! hit. Exhausted iterators report `doc_id() == end`. Hits always come in
//! ascending lid order.

use std::sync::Arc;

use attrstore_core::{BitVector, DocId};

use super::SearchContext;

/// Iterator over matching lids
pub trait SearchIterator: Send {
    /// Restrict iteration to `[begin, end)` and reset position
    fn init_range(&mut self, begin: DocId, end: DocId);

    /// Position at or after `lid`; returns whether `lid` is a hit
    fn seek(&mut self, lid: DocId) -> bool;

    /// Weight of the hit at `lid`; call only after a successful seek
    fn unpack(&mut self, lid: DocId) -> i32;

    /// Current position
    fn doc_id(&self) -> DocId;

    /// End of the range
    fn end_id(&self) -> DocId;

    /// Whether the iterator is exhausted
    fn is_at_end(&self) -> bool {
        self.doc_id() >= self.end_id()
    }
}

/// Drive `iterator` over `[begin, end)`, calling `f(lid, weight)` per hit
pub fn for_each_hit<I, F>(iterator: &mut I, begin: DocId, end: DocId, mut f: F)
where
    I: SearchIterator + ?Sized,
    F: FnMut(DocId, i32),
{
    iterator.init_range(begin, end);
    let mut lid = begin;
    while lid < end {
        if iterator.seek(lid) {
            let weight = iterator.unpack(lid);
            f(lid, weight);
            lid += 1;
        } else {
            let next = iterator.doc_id();
            lid = if next > lid { next } else { lid + 1 };
        }
    }
}

/// Collect every hit in `[begin, end)`
pub fn collect_hits<I: SearchIterator + ?Sized>(iterator: &mut I, begin: DocId, end: DocId) -> Vec<DocId> {
    let mut hits = Vec::new();
    for_each_hit(iterator, begin, end, |lid, _| hits.push(lid));
    hits
}

// ============================================================================
// EmptyIterator
// ============================================================================

/// Iterator with no hits
#[derive(Debug, Default)]
pub struct EmptyIterator {
    end: DocId,
}

impl EmptyIterator {
    /// Create an empty iterator
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchIterator for EmptyIterator {
    fn init_range(&mut self, _begin: DocId, end: DocId) {
        self.end = end;
    }

    fn seek(&mut self, _lid: DocId) -> bool {
        false
    }

    fn unpack(&mut self, _lid: DocId) -> i32 {
        0
    }

    fn doc_id(&self) -> DocId {
        self.end
    }

    fn end_id(&self) -> DocId {
        self.end
    }
}

// ============================================================================
// BitVectorIterator
// ============================================================================

/// Iterator over the set bits of a shared bit vector
///
/// Bits at or beyond `doc_id_limit` are ignored.
#[derive(Debug)]
pub struct BitVectorIterator {
    bits: Arc<BitVector>,
    doc_id_limit: DocId,
    strict: bool,
    doc_id: DocId,
    end: DocId,
}

impl BitVectorIterator {
    /// Iterate `bits` below `doc_id_limit`
    pub fn new(bits: Arc<BitVector>, doc_id_limit: DocId, strict: bool) -> Self {
        let doc_id_limit = doc_id_limit.min(bits.size());
        BitVectorIterator {
            bits,
            doc_id_limit,
            strict,
            doc_id: 0,
            end: doc_id_limit,
        }
    }

    fn limit(&self) -> DocId {
        self.end.min(self.doc_id_limit)
    }
}

impl SearchIterator for BitVectorIterator {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.end = end;
        self.doc_id = begin.saturating_sub(1);
    }

    fn seek(&mut self, lid: DocId) -> bool {
        let limit = self.limit();
        if lid >= limit {
            self.doc_id = self.end;
            return false;
        }
        if self.strict {
            let next = self.bits.next_true_bit(lid);
            self.doc_id = if next < limit { next } else { self.end };
            self.doc_id == lid
        } else if self.bits.test_bit(lid) {
            self.doc_id = lid;
            true
        } else {
            false
        }
    }

    fn unpack(&mut self, _lid: DocId) -> i32 {
        1
    }

    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn end_id(&self) -> DocId {
        self.end
    }
}

// ============================================================================
// ArrayPostingIterator
// ============================================================================

/// Iterator over a sorted `(lid, weight)` posting array
///
/// Also serves as the posting snapshot iterator of fast-search attributes.
#[derive(Debug)]
pub struct ArrayPostingIterator<'a> {
    postings: &'a [(DocId, i32)],
    pos: usize,
    doc_id: DocId,
    end: DocId,
}

impl<'a> ArrayPostingIterator<'a> {
    /// Iterate `postings`, which must be sorted by lid without duplicates
    pub fn new(postings: &'a [(DocId, i32)]) -> Self {
        ArrayPostingIterator {
            postings,
            pos: 0,
            doc_id: 0,
            end: DocId::MAX,
        }
    }
}

impl SearchIterator for ArrayPostingIterator<'_> {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.end = end;
        self.pos = self.postings.partition_point(|&(lid, _)| lid < begin);
        self.doc_id = begin.saturating_sub(1);
    }

    fn seek(&mut self, lid: DocId) -> bool {
        while self.pos < self.postings.len() && self.postings[self.pos].0 < lid {
            self.pos += 1;
        }
        match self.postings.get(self.pos) {
            Some(&(next, _)) if next < self.end => {
                self.doc_id = next;
                next == lid
            }
            _ => {
                self.doc_id = self.end;
                false
            }
        }
    }

    fn unpack(&mut self, lid: DocId) -> i32 {
        match self.postings.get(self.pos) {
            Some(&(at, weight)) if at == lid => weight,
            _ => 0,
        }
    }

    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn end_id(&self) -> DocId {
        self.end
    }
}

// ============================================================================
// ProbeIterator
// ============================================================================

/// Iterator that asks its search context about each lid
pub struct ProbeIterator<'a> {
    context: &'a dyn SearchContext,
    strict: bool,
    doc_id: DocId,
    end: DocId,
    weight: i32,
}

impl<'a> ProbeIterator<'a> {
    /// Probe `context`; a strict iterator scans forward to the next hit
    pub fn new(context: &'a dyn SearchContext, strict: bool) -> Self {
        ProbeIterator {
            context,
            strict,
            doc_id: 0,
            end: context.doc_id_limit(),
            weight: 0,
        }
    }
}

impl SearchIterator for ProbeIterator<'_> {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.end = end.min(self.context.doc_id_limit());
        self.doc_id = begin.saturating_sub(1);
    }

    fn seek(&mut self, lid: DocId) -> bool {
        if !self.strict {
            if lid < self.end {
                if let Some(weight) = self.context.matches(lid) {
                    self.doc_id = lid;
                    self.weight = weight;
                    return true;
                }
            }
            return false;
        }
        let mut candidate = lid;
        while candidate < self.end {
            if let Some(weight) = self.context.matches(candidate) {
                self.doc_id = candidate;
                self.weight = weight;
                return candidate == lid;
            }
            candidate += 1;
        }
        self.doc_id = self.end;
        false
    }

    fn unpack(&mut self, _lid: DocId) -> i32 {
        self.weight
    }

    fn doc_id(&self) -> DocId {
        self.doc_id
    }

    fn end_id(&self) -> DocId {
        self.end
    }
}

impl std::fmt::Debug for ProbeIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeIterator")
            .field("strict", &self.strict)
            .field("doc_id", &self.doc_id)
            .field("end", &self.end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let mut it = EmptyIterator::new();
        assert!(collect_hits(&mut it, 1, 100).is_empty());
        assert!(it.is_at_end());
    }

    #[test]
    fn test_bitvector_respects_limit() {
        let bits = Arc::new(BitVector::from_lids(64, [1, 5, 9, 40]));
        let mut strict = BitVectorIterator::new(Arc::clone(&bits), 10, true);
        assert_eq!(collect_hits(&mut strict, 1, 64), vec![1, 5, 9]);
        let mut lazy = BitVectorIterator::new(bits, 10, false);
        assert_eq!(collect_hits(&mut lazy, 1, 64), vec![1, 5, 9]);
    }

    #[test]
    fn test_strict_bitvector_skips_ahead() {
        let bits = Arc::new(BitVector::from_lids(64, [3, 30]));
        let mut it = BitVectorIterator::new(bits, 64, true);
        it.init_range(1, 64);
        assert!(!it.seek(4));
        assert_eq!(it.doc_id(), 30);
        assert!(it.seek(30));
        assert!(!it.seek(31));
        assert!(it.is_at_end());
    }

    #[test]
    fn test_array_posting_weights() {
        let postings = [(2, 7), (4, -1), (9, 3)];
        let mut it = ArrayPostingIterator::new(&postings);
        let mut seen = Vec::new();
        for_each_hit(&mut it, 3, 10, |lid, w| seen.push((lid, w)));
        assert_eq!(seen, vec![(4, -1), (9, 3)]);
    }
}
