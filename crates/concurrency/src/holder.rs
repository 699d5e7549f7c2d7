//! Generation hold list: deferred reclamation of retired memory
//!
//! Retired objects are first held untagged. The writer tags everything held
//! so far with the generation current at the time it is retired, then
//! advances the generation. `reclaim(oldest_used)` drops every item tagged
//! with a generation strictly below `oldest_used`, so an item is never
//! dropped while a guard that could have observed it is alive.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use attrstore_core::Generation;

struct HeldItem {
    bytes: usize,
    _item: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct HoldLists {
    /// Held since the last `assign_generation`
    pending: Vec<HeldItem>,
    /// Tagged items in non-decreasing generation order
    assigned: VecDeque<(Generation, HeldItem)>,
}

/// Hold list for memory retired by a single writer
#[derive(Default)]
pub struct GenerationHolder {
    lists: Mutex<HoldLists>,
    held_bytes: AtomicUsize,
}

impl GenerationHolder {
    /// Create an empty hold list
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire `item`, accounting `bytes` as on-hold memory until reclaimed
    pub fn hold<T: Send + Sync + 'static>(&self, item: T, bytes: usize) {
        self.held_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.lists.lock().pending.push(HeldItem {
            bytes,
            _item: Box::new(item),
        });
    }

    /// Tag all pending items with `generation`
    pub fn assign_generation(&self, generation: Generation) {
        let mut lists = self.lists.lock();
        let pending = std::mem::take(&mut lists.pending);
        lists
            .assigned
            .extend(pending.into_iter().map(|item| (generation, item)));
    }

    /// Drop every item tagged with a generation `< oldest_used`
    ///
    /// Returns the number of items dropped. Items are dropped after the
    /// internal lock is released.
    pub fn reclaim(&self, oldest_used: Generation) -> usize {
        let freed: Vec<HeldItem> = {
            let mut lists = self.lists.lock();
            let mut freed = Vec::new();
            while let Some((generation, _)) = lists.assigned.front() {
                if *generation >= oldest_used {
                    break;
                }
                if let Some((_, item)) = lists.assigned.pop_front() {
                    freed.push(item);
                }
            }
            freed
        };
        let bytes: usize = freed.iter().map(|i| i.bytes).sum();
        self.held_bytes.fetch_sub(bytes, Ordering::Relaxed);
        freed.len()
    }

    /// Drop everything regardless of generation (owner teardown only)
    pub fn reclaim_all(&self) {
        let lists = std::mem::take(&mut *self.lists.lock());
        drop(lists);
        self.held_bytes.store(0, Ordering::Relaxed);
    }

    /// Bytes currently held
    pub fn held_bytes(&self) -> usize {
        self.held_bytes.load(Ordering::Relaxed)
    }

    /// Number of held items, tagged or not
    pub fn len(&self) -> usize {
        let lists = self.lists.lock();
        lists.pending.len() + lists.assigned.len()
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for GenerationHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationHolder")
            .field("items", &self.len())
            .field("held_bytes", &self.held_bytes())
            .finish()
    }
}
