//! Core types for the attribute store
//!
//! This crate defines the foundational types used throughout the system:
//! - DocId / Generation / SerialNum: identifier aliases
//! - BasicType / CollectionType: the attribute value-type matrix
//! - GlobalId: cross-collection document identity
//! - AttributeConfig / AttributesConfig: per-attribute and file configuration
//! - QueryTerm: raw search term and its numeric/string interpretations
//! - BitVector: per-lid bit set over a roaring bitmap
//! - Status / MemoryUsage: statistics blocks
//! - AttrValue / Weighted / ArithmeticOp: value-level types
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitvector;
pub mod config;
pub mod error;
pub mod query;
pub mod status;
pub mod types;
pub mod value;

pub use bitvector::BitVector;
pub use config::{
    AttributeConfig, AttributeSpec, AttributesConfig, ImportedSpec, ManagerSettings,
    CONFIG_FILE_NAME, DEFAULT_MIN_TARGET_HITS_FOR_APPROXIMATION, DEFAULT_STATS_INTERVAL_MS,
};
pub use error::{Error, Result};
pub use query::{FloatRange, QueryTerm};
pub use status::{MemoryUsage, Status};
pub use types::{
    BasicType, CollectionType, DocId, Generation, GlobalId, SerialNum, UNDEFINED_LID,
};
pub use value::{ArithmeticOp, AttrValue, Weighted};
