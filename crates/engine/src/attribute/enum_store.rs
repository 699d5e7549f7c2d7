//! Enum store: reference-counted dictionary of unique string values
//!
//! Documents hold small integer handles instead of strings. Handle 0 is
//! the empty string and is never freed. A handle whose reference count
//! drops to zero is retired, tagged with the generation current when it
//! was retired, and only returned to the free list once no reader can
//! still hold a document snapshot referring to it.
//!
//! Mutation requires the owning attribute's `EnumModifier`; readers that
//! need handles to stay comparable hold the shared side of the same lock.

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use attrstore_core::{Generation, MemoryUsage};

/// Index into the enum dictionary
pub type EnumHandle = u32;

/// Handle of the empty string
pub const EMPTY_HANDLE: EnumHandle = 0;

#[derive(Default)]
struct Dictionary {
    values: Vec<Arc<str>>,
    lookup: FxHashMap<Arc<str>, EnumHandle>,
}

#[derive(Default)]
struct RefCounts {
    counts: Vec<u32>,
    free: Vec<EnumHandle>,
    retired: Vec<EnumHandle>,
    on_hold: VecDeque<(Generation, Vec<EnumHandle>)>,
}

/// Unique-value dictionary with generation-deferred handle reuse
pub struct EnumStore {
    dict: RwLock<Dictionary>,
    refs: Mutex<RefCounts>,
}

impl EnumStore {
    /// Store holding only the empty string
    pub fn new() -> Self {
        let store = EnumStore {
            dict: RwLock::new(Dictionary::default()),
            refs: Mutex::new(RefCounts::default()),
        };
        store.reset();
        store
    }

    /// Drop every value except the empty string
    ///
    /// Only valid while no reader can hold handles, i.e. before the owning
    /// attribute is published.
    pub fn reset(&self) {
        let empty: Arc<str> = Arc::from("");
        let mut dict = self.dict.write();
        dict.values = vec![Arc::clone(&empty)];
        dict.lookup = FxHashMap::default();
        dict.lookup.insert(empty, EMPTY_HANDLE);
        *self.refs.lock() = RefCounts {
            counts: vec![0],
            ..RefCounts::default()
        };
    }

    /// Value of `handle`
    pub fn get(&self, handle: EnumHandle) -> Option<Arc<str>> {
        self.dict.read().values.get(handle as usize).cloned()
    }

    /// Handle of `value`, if present
    pub fn find(&self, value: &str) -> Option<EnumHandle> {
        self.dict.read().lookup.get(value).copied()
    }

    /// Handle for `value`, adding it if absent (writer only)
    ///
    /// The returned handle has no reference of its own; call `inc_ref`.
    pub fn insert(&self, value: &str) -> EnumHandle {
        if let Some(handle) = self.find(value) {
            return handle;
        }
        let value: Arc<str> = Arc::from(value);
        let mut dict = self.dict.write();
        let reused = self.refs.lock().free.pop();
        let handle = match reused {
            Some(handle) => {
                dict.values[handle as usize] = Arc::clone(&value);
                handle
            }
            None => {
                dict.values.push(Arc::clone(&value));
                let handle = (dict.values.len() - 1) as EnumHandle;
                self.refs.lock().counts.push(0);
                handle
            }
        };
        dict.lookup.insert(value, handle);
        handle
    }

    /// Add a document reference to `handle`
    pub fn inc_ref(&self, handle: EnumHandle) {
        if let Some(count) = self.refs.lock().counts.get_mut(handle as usize) {
            *count += 1;
        }
    }

    /// Drop a document reference; retires the handle at zero
    pub fn dec_ref(&self, handle: EnumHandle) {
        let mut refs = self.refs.lock();
        let retire = match refs.counts.get_mut(handle as usize) {
            Some(count) if *count > 0 => {
                *count -= 1;
                *count == 0 && handle != EMPTY_HANDLE
            }
            _ => false,
        };
        if retire {
            refs.retired.push(handle);
        }
    }

    /// Tag handles retired since the last call with `generation`
    pub fn assign_generation(&self, generation: Generation) {
        let mut refs = self.refs.lock();
        if !refs.retired.is_empty() {
            let retired = std::mem::take(&mut refs.retired);
            refs.on_hold.push_back((generation, retired));
        }
    }

    /// Free handles retired before `oldest_used` that are still unreferenced
    ///
    /// A retired handle may have been revived by `insert` of the same value
    /// in the meantime; such handles stay.
    pub fn reclaim(&self, oldest_used: Generation) -> usize {
        let mut dict = self.dict.write();
        let mut refs = self.refs.lock();
        let mut freed = 0;
        while let Some((generation, _)) = refs.on_hold.front() {
            if *generation >= oldest_used {
                break;
            }
            let Some((_, handles)) = refs.on_hold.pop_front() else {
                break;
            };
            for handle in handles {
                if refs.counts[handle as usize] != 0 {
                    continue;
                }
                let value = Arc::clone(&dict.values[handle as usize]);
                if dict.lookup.get(&value) == Some(&handle) {
                    dict.lookup.remove(&value);
                    refs.free.push(handle);
                    freed += 1;
                }
            }
        }
        freed
    }

    /// Reference count of `handle`
    pub fn ref_count(&self, handle: EnumHandle) -> u32 {
        self.refs.lock().counts.get(handle as usize).copied().unwrap_or(0)
    }

    /// Distinct live values, including the empty string
    pub fn num_unique(&self) -> usize {
        self.dict.read().lookup.len()
    }

    /// Memory accounting of the dictionary
    pub fn memory_usage(&self) -> MemoryUsage {
        let dict = self.dict.read();
        let handle_bytes = std::mem::size_of::<Arc<str>>();
        let string_bytes: usize = dict.values.iter().map(|v| v.len()).sum();
        let mut usage = MemoryUsage::default();
        usage.add_buffer(
            dict.values.capacity() * handle_bytes + string_bytes,
            dict.lookup.len() * handle_bytes + string_bytes,
        );
        usage
    }
}

impl Default for EnumStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnumStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnumStore")
            .field("unique", &self.num_unique())
            .finish()
    }
}
