//! Attrstore - columnar per-field attribute store
//!
//! Every document in a collection has a local document id (lid). An
//! attribute keeps one field's values indexed by lid, so queries can
//! filter, rank and sort without touching the documents themselves.
//!
//! # Quick Start
//!
//! ```ignore
//! use attrstore::{AttributeManager, AttributesConfig};
//!
//! let config = AttributesConfig::from_file(Path::new("attributes.toml"))?;
//! let manager = AttributeManager::from_config(&config);
//!
//! // Loaded on first use, at most once
//! let guard = manager.get_attribute_read_guard("price", false).unwrap();
//! let price = guard.attribute().get_int(lid);
//! ```
//!
//! # Architecture
//!
//! - `attrstore-core`: value types, query terms, config and errors
//! - `attrstore-concurrency`: generation tracking and RCU vectors
//! - `attrstore-storage`: the on-disk save format
//! - `attrstore-engine`: attribute vectors, search, the manager and
//!   imported attributes
//!
//! Readers pin a generation through a read guard and never block on the
//! single writer; memory the writer retires is freed only once no guard
//! can still reach it.

pub use attrstore_concurrency::{GenerationGuard, GenerationHandler, GenerationHolder, RcuSnapshot, RcuVector};
pub use attrstore_core::{
    ArithmeticOp, AttrValue, AttributeConfig, AttributeSpec, AttributesConfig, BasicType, BitVector,
    CollectionType, DocId, Error, GlobalId, ImportedSpec, ManagerSettings, MemoryUsage, QueryTerm,
    Result, Status, Weighted,
};
pub use attrstore_engine::search::collect_hits;
pub use attrstore_engine::{
    apply_update, create_attribute, AttributeContext, AttributeManager, AttributeReadGuard,
    AttributeVector, CompactableLidSpace, DocumentMetaStore, ExecuteInfo, ImportedAttributeVector,
    ReadableAttribute, ReferenceAttribute, SearchContext, SearchIterator, SearchParams, ValueUpdate,
};
pub use attrstore_storage::{AttributeReader, FileSaveTarget, MemorySaveTarget, SaveTarget};
