//! Enum-store modification lock and the cross-attribute interlock
//!
//! Readers that need enum handles to stay stable (grouping, sorting on
//! enum values) hold a shared `EnumReadGuard` for the lifetime of their
//! read guard. A writer that changes an enum store takes the lock
//! exclusively through an `EnumModifier`, acquiring the `Interlock` first.
//!
//! The interlock is shared by every attribute of a manager and serializes
//! the *order* in which writers start waiting for exclusive access, so two
//! writers can never each hold one exclusive lock while waiting for the
//! other's.

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use std::sync::Arc;

/// Shared lock held by stable-enum readers
pub type EnumReadGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// Serializes exclusive enum-lock acquisition across attributes
#[derive(Debug, Default)]
pub struct Interlock {
    mutex: Mutex<()>,
}

impl Interlock {
    /// Create an interlock
    pub fn new() -> Self {
        Self::default()
    }
}

/// Reader/writer lock guarding enum-store mutation
#[derive(Debug, Clone, Default)]
pub struct EnumModifyLock {
    lock: Arc<RwLock<()>>,
}

impl EnumModifyLock {
    /// Create an unlocked enum lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the shared side; blocks while a modifier is active
    pub fn read(&self) -> EnumReadGuard {
        self.lock.read_arc()
    }

    /// Take the exclusive side, ordered through `interlock`
    ///
    /// The interlock is released once exclusive access is obtained.
    pub fn modifier(&self, interlock: &Interlock) -> EnumModifier {
        let _order = interlock.mutex.lock();
        EnumModifier {
            _guard: self.lock.write_arc(),
        }
    }

    /// Whether some reader or writer currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

/// Exclusive access to an enum store; released on drop
pub struct EnumModifier {
    _guard: ArcRwLockWriteGuard<RawRwLock, ()>,
}

impl std::fmt::Debug for EnumModifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EnumModifier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_readers_share() {
        let lock = EnumModifyLock::new();
        let r1 = lock.read();
        let r2 = lock.read();
        assert!(lock.is_locked());
        drop(r1);
        drop(r2);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_modifier_waits_for_stable_readers() {
        let lock = EnumModifyLock::new();
        let interlock = Arc::new(Interlock::new());
        let reader = lock.read();
        let acquired = Arc::new(AtomicBool::new(false));

        let writer = {
            let lock = lock.clone();
            let interlock = Arc::clone(&interlock);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let _m = lock.modifier(&interlock);
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(reader);
        writer.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
