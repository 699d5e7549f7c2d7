//! Attribute engine
//!
//! This crate builds the attribute store on top of the lower layers:
//! - Attribute vectors: lifecycle, concrete value stores, value updates
//! - Read guards pinning an attribute's generation
//! - Search contexts and iterators
//! - AttributeManager: lazy at-most-once loading and per-reader contexts
//! - DocumentMetaStore: per-collection lid allocation
//! - ReferenceAttribute: lid to target lid mapping with its reverse
//! - Imported attributes: value-less views through a reference, with
//!   posting-list merging and a bit vector search cache
//!
//! Readers never block on the writer (stable-enum guards aside). Missing
//! or stale data reads back as the undefined value at lid 0.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribute;
pub mod guard;
pub mod imported;
pub mod manager;
pub mod metastore;
pub mod reference;
pub mod search;

pub use attribute::{
    apply_update, create_attribute, AttributeVector, CommitParam, CompactableLidSpace,
    ReadableAttribute, ValueUpdate,
};
pub use guard::{AttributeGuard, AttributeReadGuard};
pub use imported::{
    BitVectorSearchCache, ImportedAttributeReadGuard, ImportedAttributeVector, ImportedAttributesRepo,
    ImportedSearchContext,
};
pub use manager::{AttributeContext, AttributeFactory, AttributeManager};
pub use metastore::{DocumentMetaStore, DocumentMetaStoreReadGuard, GidToLidChangeListener};
pub use reference::ReferenceAttribute;
pub use search::{ExecuteInfo, SearchContext, SearchIterator, SearchParams};
