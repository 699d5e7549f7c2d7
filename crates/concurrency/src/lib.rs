//! Concurrency primitives for the attribute store
//!
//! This crate implements the reader/writer protocol every attribute uses:
//! - GenerationHandler / GenerationGuard: reader epochs
//! - GenerationHolder: deferred reclamation of retired memory
//! - RcuVector / RcuSnapshot: growable arrays with lock-free element reads
//! - EnumModifyLock / Interlock: stable-enum reader locking
//!
//! # Model
//!
//! One writer thread per attribute, any number of readers. Readers never
//! block the writer except through the stable-enum shared lock; the writer
//! never frees memory a pinned reader could still observe.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod generation;
pub mod holder;
pub mod interlock;
pub mod rcu_vector;

pub use generation::{GenerationGuard, GenerationHandler};
pub use holder::GenerationHolder;
pub use interlock::{EnumModifier, EnumModifyLock, EnumReadGuard, Interlock};
pub use rcu_vector::{RcuSnapshot, RcuValue, RcuVector};
