//! Memory usage accounting and the per-attribute status block

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use crate::types::SerialNum;

/// Memory accounting for one structure or a sum of structures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Bytes reserved from the allocator
    pub allocated_bytes: usize,
    /// Bytes holding live data
    pub used_bytes: usize,
    /// Bytes of unreachable data not yet compacted away
    pub dead_bytes: usize,
    /// Bytes retired but still pinned by a reader generation
    pub allocated_bytes_on_hold: usize,
}

impl MemoryUsage {
    /// Create a usage record
    pub fn new(allocated_bytes: usize, used_bytes: usize, dead_bytes: usize, on_hold: usize) -> Self {
        MemoryUsage {
            allocated_bytes,
            used_bytes,
            dead_bytes,
            allocated_bytes_on_hold: on_hold,
        }
    }

    /// Account for a vector-like buffer
    pub fn add_buffer(&mut self, capacity_bytes: usize, used_bytes: usize) {
        self.allocated_bytes += capacity_bytes;
        self.used_bytes += used_bytes;
    }

    /// Account for retired memory waiting on the hold list
    pub fn inc_on_hold(&mut self, bytes: usize) {
        self.allocated_bytes_on_hold += bytes;
    }
}

impl AddAssign for MemoryUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.allocated_bytes += rhs.allocated_bytes;
        self.used_bytes += rhs.used_bytes;
        self.dead_bytes += rhs.dead_bytes;
        self.allocated_bytes_on_hold += rhs.allocated_bytes_on_hold;
    }
}

/// Statistics block of an attribute vector
///
/// Refreshed on commit (throttled) and on explicit request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Number of documents in the lid space (including lid 0)
    pub num_docs: u64,
    /// Total number of stored values
    pub num_values: u64,
    /// Number of distinct values, when the store tracks them
    pub num_unique_values: u64,
    /// Memory accounting at last refresh
    pub memory: MemoryUsage,
    /// Serial number of the last committed feed operation
    pub last_sync_token: SerialNum,
    /// Serial number at which the attribute was created
    pub create_serial_num: SerialNum,
    /// Total buffered updates applied
    pub updates: u64,
    /// Updates whose result depends on the previous value
    pub non_idempotent_updates: u64,
}

impl Status {
    /// Record an applied update
    pub fn inc_updates(&mut self, non_idempotent: bool) {
        self.updates += 1;
        if non_idempotent {
            self.non_idempotent_updates += 1;
        }
    }
}
