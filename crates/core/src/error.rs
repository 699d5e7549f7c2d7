//! Error types for the attribute store
//!
//! This module defines the error type used at explicit entry points
//! (save, load, configuration parsing). The hot read path never returns
//! errors: missing data resolves to defaults and lid 0.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

use crate::types::{BasicType, CollectionType};

/// Result type alias for attribute store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the attribute store
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted header is malformed or fails its checksum
    #[error("Invalid header in {file}: {reason}")]
    InvalidHeader {
        /// File whose header was rejected
        file: String,
        /// What was wrong with it
        reason: String,
    },

    /// Persisted types do not match the attribute's configured types
    #[error("Type mismatch: expected {expected_basic}/{expected_collection}, found {found}")]
    TypeMismatch {
        /// Configured basic type
        expected_basic: BasicType,
        /// Configured collection type
        expected_collection: CollectionType,
        /// Description of what the file carried
        found: String,
    },

    /// Data corruption detected in a persisted body
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}
