//! Generation handler: the reader epoch protocol
//!
//! A single writer advances the generation; readers pin the current one by
//! holding a `GenerationGuard`. Memory retired at generation `g` may be freed
//! only once the oldest generation pinned by a live guard is strictly greater
//! than `g` (see `GenerationHolder::reclaim`).
//!
//! # Protocol
//!
//! ```text
//! reader:  guard = handler.take_guard()   // pins current generation
//!          ... read shared structures ...
//!          drop(guard)                    // unpins
//!
//! writer:  freeze structures, hold retired memory
//!          holder.assign_generation(handler.current_generation())
//!          handler.inc_generation()
//!          holder.reclaim(handler.update_oldest_used_generation())
//! ```
//!
//! Taking a guard never fails. A guard held forever stalls reclamation
//! (visible as on-hold memory) but never breaks correctness.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use attrstore_core::Generation;

struct HandlerInner {
    /// Generation new guards pin
    current: AtomicU64,
    /// Cached result of the last oldest-used computation
    oldest_used: AtomicU64,
    /// Live guard count per pinned generation
    live: Mutex<BTreeMap<Generation, usize>>,
}

impl HandlerInner {
    fn pin(&self, generation: Generation) {
        *self.live.lock().entry(generation).or_insert(0) += 1;
    }

    fn unpin(&self, generation: Generation) {
        let mut live = self.live.lock();
        if let Some(count) = live.get_mut(&generation) {
            *count -= 1;
            if *count == 0 {
                live.remove(&generation);
            }
        }
    }
}

/// Epoch counter with reference-counted reader guards
///
/// Cloning the handler shares the same epoch state.
#[derive(Clone)]
pub struct GenerationHandler {
    inner: Arc<HandlerInner>,
}

impl GenerationHandler {
    /// Create a handler at generation 0
    pub fn new() -> Self {
        GenerationHandler {
            inner: Arc::new(HandlerInner {
                current: AtomicU64::new(0),
                oldest_used: AtomicU64::new(0),
                live: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Pin the current generation
    ///
    /// The current value is read under the live-guard lock so that a
    /// concurrent `update_oldest_used_generation` either sees this guard or
    /// computes a bound no newer than the generation it pins.
    pub fn take_guard(&self) -> GenerationGuard {
        let mut live = self.inner.live.lock();
        let generation = self.inner.current.load(Ordering::Acquire);
        *live.entry(generation).or_insert(0) += 1;
        GenerationGuard {
            inner: Some(Arc::clone(&self.inner)),
            generation,
        }
    }

    /// Generation new guards would pin
    #[inline]
    pub fn current_generation(&self) -> Generation {
        self.inner.current.load(Ordering::Acquire)
    }

    /// Generation after the next `inc_generation`
    #[inline]
    pub fn next_generation(&self) -> Generation {
        self.current_generation() + 1
    }

    /// Advance the generation (writer only)
    ///
    /// Release ordering publishes every store made before the call to
    /// readers that pin the new generation.
    pub fn inc_generation(&self) {
        self.inner.current.fetch_add(1, Ordering::Release);
    }

    /// Recompute and cache the oldest generation pinned by any live guard
    ///
    /// With no live guards this is the current generation.
    pub fn update_oldest_used_generation(&self) -> Generation {
        let live = self.inner.live.lock();
        let current = self.inner.current.load(Ordering::Acquire);
        let oldest = live.keys().next().copied().unwrap_or(current).min(current);
        self.inner.oldest_used.store(oldest, Ordering::Release);
        oldest
    }

    /// Oldest used generation as of the last update
    #[inline]
    pub fn oldest_used_generation(&self) -> Generation {
        self.inner.oldest_used.load(Ordering::Acquire)
    }

    /// Number of live guards pinning `generation`
    pub fn generation_ref_count(&self, generation: Generation) -> usize {
        self.inner.live.lock().get(&generation).copied().unwrap_or(0)
    }

    /// Number of live guards over all generations
    pub fn total_guard_count(&self) -> usize {
        self.inner.live.lock().values().sum()
    }
}

impl Default for GenerationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GenerationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationHandler")
            .field("current", &self.current_generation())
            .field("oldest_used", &self.oldest_used_generation())
            .field("guards", &self.total_guard_count())
            .finish()
    }
}

/// RAII pin on one generation
///
/// Dropping the guard releases the pin. Cloning pins the same generation
/// again. The default guard is invalid and pins nothing.
#[derive(Default)]
pub struct GenerationGuard {
    inner: Option<Arc<HandlerInner>>,
    generation: Generation,
}

impl GenerationGuard {
    /// Pinned generation
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether this guard pins anything
    #[inline]
    pub fn valid(&self) -> bool {
        self.inner.is_some()
    }
}

impl Clone for GenerationGuard {
    fn clone(&self) -> Self {
        if let Some(inner) = &self.inner {
            inner.pin(self.generation);
        }
        GenerationGuard {
            inner: self.inner.clone(),
            generation: self.generation,
        }
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.unpin(self.generation);
        }
    }
}

impl fmt::Debug for GenerationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationGuard")
            .field("generation", &self.generation)
            .field("valid", &self.valid())
            .finish()
    }
}
