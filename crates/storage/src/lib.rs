//! Persistence layer for attribute vectors
//!
//! This crate provides:
//! - FileHeader: tagged, checksummed file header with a freeze protocol
//! - AttributeHeader: the semantic header of a saved attribute
//! - SaveTarget: file and in-memory destinations for a save
//! - AttributeReader: validated loading of a saved attribute

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribute_header;
pub mod header;
pub mod reader;
pub mod save_target;

pub use attribute_header::{header_type_ok, AttributeHeader, ATTRIBUTE_FORMAT_VERSION};
pub use header::{FileHeader, HeaderError, Tag, TAG_FROZEN, TAG_FROZEN_TIME};
pub use reader::{read_attribute_file, AttributeReader, LoadedFile};
pub use save_target::{write_frozen_file, FileKind, FileSaveTarget, MemorySaveTarget, SaveTarget};
