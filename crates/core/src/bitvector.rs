//! Bit set over a document-id space
//!
//! One bit per lid in `[0, size)`, stored as a compressed roaring bitmap.
//! Used as the merged posting representation for filter-style imported
//! searches and as the payload of search cache entries, where it is shared
//! read-only behind an `Arc`.

use roaring::RoaringBitmap;

use crate::types::DocId;

/// Fixed-size bit set over lids
#[derive(Debug, Clone, PartialEq)]
pub struct BitVector {
    bits: RoaringBitmap,
    size: DocId,
}

impl BitVector {
    /// Create an all-zero bit vector covering `[0, size)`
    pub fn new(size: DocId) -> Self {
        BitVector {
            bits: RoaringBitmap::new(),
            size,
        }
    }

    /// Build from an iterator of lids; lids `>= size` are ignored
    pub fn from_lids<I: IntoIterator<Item = DocId>>(size: DocId, lids: I) -> Self {
        BitVector {
            bits: lids.into_iter().filter(|&lid| lid < size).collect(),
            size,
        }
    }

    /// Number of addressable bits
    #[inline]
    pub fn size(&self) -> DocId {
        self.size
    }

    /// Set bit `lid`
    ///
    /// # Panics
    ///
    /// Panics if `lid >= size()`.
    #[inline]
    pub fn set_bit(&mut self, lid: DocId) {
        assert!(lid < self.size, "bit {} out of range {}", lid, self.size);
        self.bits.insert(lid);
    }

    /// Clear bit `lid`
    #[inline]
    pub fn clear_bit(&mut self, lid: DocId) {
        assert!(lid < self.size, "bit {} out of range {}", lid, self.size);
        self.bits.remove(lid);
    }

    /// Test bit `lid`; out-of-range lids read as unset
    #[inline]
    pub fn test_bit(&self, lid: DocId) -> bool {
        lid < self.size && self.bits.contains(lid)
    }

    /// Population count
    pub fn count_true_bits(&self) -> u32 {
        self.bits.len() as u32
    }

    /// First set bit at or after `from`, or `size()` if there is none
    pub fn next_true_bit(&self, from: DocId) -> DocId {
        if from >= self.size {
            return self.size;
        }
        let below = match from {
            0 => 0,
            _ => self.bits.rank(from - 1),
        };
        match u32::try_from(below).ok().and_then(|n| self.bits.select(n)) {
            Some(lid) if lid < self.size => lid,
            _ => self.size,
        }
    }

    /// Iterate over set bits in ascending order
    pub fn iter_true(&self) -> impl Iterator<Item = DocId> + '_ {
        self.bits.iter()
    }

    /// Serialized size of the bitmap in bytes
    pub fn memory_usage(&self) -> usize {
        self.bits.serialized_size()
    }
}
