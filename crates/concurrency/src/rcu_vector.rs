//! RCU vector: growable array with lock-free element reads
//!
//! Elements live in a buffer of `AtomicU64` slots holding the value's bit
//! pattern. The single writer stores elements with release ordering and
//! readers load them with acquire ordering, so an element is never torn.
//!
//! Growing or shrinking allocates a new buffer, copies the live prefix,
//! publishes it with an atomic pointer swap, and places the old buffer on
//! the generation hold list. Readers never take a lock.
//! Readers that captured the old buffer in a snapshot keep a consistent,
//! if stale, view of it.

use arc_swap::ArcSwap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use attrstore_core::MemoryUsage;

use crate::holder::GenerationHolder;

const MIN_CAPACITY: usize = 16;

/// Value storable in an RCU vector slot
pub trait RcuValue: Copy + Send + Sync + 'static {
    /// Bit pattern stored in the slot
    fn to_bits(self) -> u64;
    /// Inverse of `to_bits`
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_rcu_value_int {
    ($($t:ty => $u:ty),*) => {$(
        impl RcuValue for $t {
            #[inline]
            fn to_bits(self) -> u64 {
                self as $u as u64
            }
            #[inline]
            fn from_bits(bits: u64) -> Self {
                bits as $u as $t
            }
        }
    )*};
}

impl_rcu_value_int!(i8 => u8, i16 => u16, i32 => u32, i64 => u64, u8 => u8, u16 => u16, u32 => u32, u64 => u64);

impl RcuValue for f32 {
    #[inline]
    fn to_bits(self) -> u64 {
        f32::to_bits(self) as u64
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
}

impl RcuValue for f64 {
    #[inline]
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

impl RcuValue for bool {
    #[inline]
    fn to_bits(self) -> u64 {
        self as u64
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits != 0
    }
}

type Slots = Box<[AtomicU64]>;

fn alloc_slots(capacity: usize) -> Slots {
    (0..capacity).map(|_| AtomicU64::new(0)).collect()
}

/// Growable vector with lock-free element reads and deferred buffer reclamation
pub struct RcuVector<T: RcuValue> {
    buffer: ArcSwap<Slots>,
    len: AtomicUsize,
    holder: Arc<GenerationHolder>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RcuValue> RcuVector<T> {
    /// Create an empty vector retiring buffers to `holder`
    pub fn new(holder: Arc<GenerationHolder>) -> Self {
        RcuVector {
            buffer: ArcSwap::from_pointee(alloc_slots(0)),
            len: AtomicUsize::new(0),
            holder,
            _marker: PhantomData,
        }
    }

    /// Number of published elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether no elements are published
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots in the current buffer
    pub fn capacity(&self) -> usize {
        self.buffer.load().len()
    }

    /// Read element `idx`, or `None` if out of range
    #[inline]
    pub fn get(&self, idx: usize) -> Option<T> {
        if idx >= self.len() {
            return None;
        }
        self.buffer
            .load()
            .get(idx)
            .map(|slot| T::from_bits(slot.load(Ordering::Acquire)))
    }

    /// Capture the current buffer and length
    pub fn snapshot(&self) -> RcuSnapshot<T> {
        let len = self.len();
        let slots = self.buffer.load_full();
        let len = len.min(slots.len());
        RcuSnapshot {
            slots,
            len,
            _marker: PhantomData,
        }
    }

    /// Overwrite element `idx` (writer only)
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len()`.
    pub fn set(&self, idx: usize, value: T) {
        assert!(idx < self.len(), "rcu vector index {} out of range {}", idx, self.len());
        self.buffer.load()[idx].store(value.to_bits(), Ordering::Release);
    }

    /// Append an element (writer only)
    pub fn push(&self, value: T) {
        let len = self.len();
        self.reserve(len + 1);
        self.buffer.load()[len].store(value.to_bits(), Ordering::Release);
        self.len.store(len + 1, Ordering::Release);
    }

    /// Grow to at least `new_len` elements, filling new slots with `fill`
    pub fn ensure_size(&self, new_len: usize, fill: T) {
        let len = self.len();
        if new_len <= len {
            return;
        }
        self.reserve(new_len);
        {
            let buffer = self.buffer.load();
            for slot in &buffer[len..new_len] {
                slot.store(fill.to_bits(), Ordering::Release);
            }
        }
        self.len.store(new_len, Ordering::Release);
    }

    /// Ensure capacity for `wanted` elements, doubling as needed
    pub fn reserve(&self, wanted: usize) {
        let capacity = self.capacity();
        if wanted <= capacity {
            return;
        }
        let new_capacity = wanted.max(capacity * 2).max(MIN_CAPACITY);
        self.replace_buffer(new_capacity);
    }

    /// Truncate to `new_len` elements and release surplus capacity (writer only)
    ///
    /// The length is lowered before the smaller buffer is published, so a
    /// concurrent reader either sees the old buffer or a bound that fits
    /// the new one.
    pub fn shrink(&self, new_len: usize) {
        let len = self.len();
        if new_len >= len {
            return;
        }
        self.len.store(new_len, Ordering::Release);
        self.replace_buffer(new_len.max(MIN_CAPACITY).min(self.capacity()));
    }

    fn replace_buffer(&self, new_capacity: usize) {
        let len = self.len();
        let fresh = alloc_slots(new_capacity);
        let current = self.buffer.load_full();
        for (dst, src) in fresh.iter().zip(current.iter()).take(len) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        let old = self.buffer.swap(Arc::new(fresh));
        let old_bytes = old.len() * std::mem::size_of::<AtomicU64>();
        self.holder.hold(old, old_bytes);
    }

    /// Memory accounting; on-hold bytes are reported by the holder's owner
    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = MemoryUsage::default();
        usage.add_buffer(
            self.capacity() * std::mem::size_of::<AtomicU64>(),
            self.len() * std::mem::size_of::<AtomicU64>(),
        );
        usage
    }
}

impl<T: RcuValue + std::fmt::Debug> std::fmt::Debug for RcuVector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuVector")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Point-in-time view of an RCU vector
///
/// Keeps its buffer alive for as long as it is held. Element values may
/// still change if the writer stores into the same buffer, but the length
/// and the buffer never do.
#[derive(Clone)]
pub struct RcuSnapshot<T: RcuValue> {
    slots: Arc<Slots>,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RcuValue> RcuSnapshot<T> {
    /// An empty snapshot
    pub fn empty() -> Self {
        RcuSnapshot {
            slots: Arc::new(alloc_slots(0)),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Number of elements visible in this snapshot
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the snapshot is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read element `idx`, or `None` if out of range
    #[inline]
    pub fn get(&self, idx: usize) -> Option<T> {
        if idx >= self.len {
            return None;
        }
        Some(T::from_bits(self.slots[idx].load(Ordering::Acquire)))
    }
}

impl<T: RcuValue> std::fmt::Debug for RcuSnapshot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuSnapshot").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerationHandler;

    fn vector<T: RcuValue>() -> (RcuVector<T>, Arc<GenerationHolder>) {
        let holder = Arc::new(GenerationHolder::new());
        (RcuVector::new(Arc::clone(&holder)), holder)
    }

    #[test]
    fn test_push_get_set() {
        let (v, _holder) = vector::<i32>();
        for i in 0..100 {
            v.push(i * 2);
        }
        assert_eq!(v.len(), 100);
        assert_eq!(v.get(10), Some(20));
        v.set(10, -5);
        assert_eq!(v.get(10), Some(-5));
        assert_eq!(v.get(100), None);
    }

    #[test]
    fn test_value_bit_patterns() {
        let (v, _holder) = vector::<f64>();
        v.push(f64::NAN);
        v.push(-1.25);
        assert!(v.get(0).unwrap().is_nan());
        assert_eq!(v.get(1), Some(-1.25));

        let (w, _holder) = vector::<i8>();
        w.push(i8::MIN);
        assert_eq!(w.get(0), Some(i8::MIN));
    }

    #[test]
    fn test_growth_retires_old_buffer_to_holder() {
        let (v, holder) = vector::<u32>();
        v.ensure_size(MIN_CAPACITY, 7);
        let retired_before = holder.len();
        let snap = v.snapshot();
        v.push(99);
        assert!(holder.len() > retired_before);
        assert!(holder.held_bytes() > 0);
        assert_eq!(snap.len(), MIN_CAPACITY);
        assert_eq!(snap.get(0), Some(7));
        assert_eq!(v.get(MIN_CAPACITY), Some(99));
    }

    #[test]
    fn test_snapshot_survives_reclaim() {
        let handler = GenerationHandler::new();
        let (v, holder) = vector::<u32>();
        v.ensure_size(20, 1);
        let snap = v.snapshot();
        v.shrink(5);
        holder.assign_generation(handler.current_generation());
        handler.inc_generation();
        holder.reclaim(handler.update_oldest_used_generation());
        // snapshot still owns the old buffer
        assert_eq!(snap.len(), 20);
        assert_eq!(snap.get(19), Some(1));
        assert_eq!(v.len(), 5);
        assert_eq!(v.get(19), None);
    }

    #[test]
    fn test_ensure_size_fills() {
        let (v, _holder) = vector::<i64>();
        v.ensure_size(3, i64::MIN);
        assert_eq!(v.get(2), Some(i64::MIN));
        v.ensure_size(2, 0);
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn test_concurrent_reader_never_sees_torn_values() {
        let (v, _holder) = vector::<u64>();
        let v = Arc::new(v);
        v.ensure_size(64, 0);
        let reader = {
            let v = Arc::clone(&v);
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    let snap = v.snapshot();
                    for i in 0..snap.len() {
                        let x = snap.get(i).unwrap();
                        assert!(x == 0 || x == u64::MAX);
                    }
                }
            })
        };
        for round in 0..200 {
            for i in 0..64 {
                v.set(i, if round % 2 == 0 { u64::MAX } else { 0 });
            }
            v.push(0);
        }
        reader.join().unwrap();
    }

    #[test]
    fn test_reads_proceed_while_buffer_is_replaced() {
        let (v, holder) = vector::<u32>();
        let v = Arc::new(v);
        v.ensure_size(MIN_CAPACITY, 3);
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let v = Arc::clone(&v);
                std::thread::spawn(move || {
                    for _ in 0..5_000 {
                        assert_eq!(v.get(0), Some(3));
                        let snap = v.snapshot();
                        assert!(snap.len() >= MIN_CAPACITY);
                        assert_eq!(snap.get(snap.len() - 1), Some(3));
                    }
                })
            })
            .collect();
        for _ in 0..2_000 {
            v.push(3);
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(holder.len() > 0);
        assert_eq!(v.len(), MIN_CAPACITY + 2_000);
    }
}
