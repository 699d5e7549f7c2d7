//! Identifier and type-tag definitions shared by every layer
//!
//! - `DocId`: local document id (lid), a dense index into a document-id space
//! - `Generation`: writer-advanced epoch pinned by readers
//! - `SerialNum`: replay position of the feed that produced a change
//! - `BasicType` / `CollectionType`: the value-type matrix of an attribute
//! - `GlobalId`: collection-independent document identity used by references

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Local document id (lid)
///
/// Lid 0 is reserved as the "undefined document" and always carries
/// cleared/default values.
pub type DocId = u32;

/// Writer-advanced epoch counter value
pub type Generation = u64;

/// Serial number of a replayed feed operation
pub type SerialNum = u64;

/// The reserved undefined document id
pub const UNDEFINED_LID: DocId = 0;

// ============================================================================
// BasicType
// ============================================================================

/// Value type held by an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasicType {
    /// Boolean stored as a single byte
    Bool,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 string
    String,
    /// Reference to a document in another collection
    Reference,
}

impl BasicType {
    /// Name used in persisted headers and configuration
    pub const fn as_str(&self) -> &'static str {
        match self {
            BasicType::Bool => "bool",
            BasicType::Int8 => "int8",
            BasicType::Int16 => "int16",
            BasicType::Int32 => "int32",
            BasicType::Int64 => "int64",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::String => "string",
            BasicType::Reference => "reference",
        }
    }

    /// Whether values are integral
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            BasicType::Bool | BasicType::Int8 | BasicType::Int16 | BasicType::Int32 | BasicType::Int64
        )
    }

    /// Whether values are floating point
    pub const fn is_floating_point(&self) -> bool {
        matches!(self, BasicType::Float | BasicType::Double)
    }

    /// Whether values are strings
    pub const fn is_string(&self) -> bool {
        matches!(self, BasicType::String)
    }

    /// Width in bytes of one fixed-size value, or `None` for variable-size types
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            BasicType::Bool | BasicType::Int8 => Some(1),
            BasicType::Int16 => Some(2),
            BasicType::Int32 | BasicType::Float => Some(4),
            BasicType::Int64 | BasicType::Double => Some(8),
            BasicType::String | BasicType::Reference => None,
        }
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BasicType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(BasicType::Bool),
            "int8" => Ok(BasicType::Int8),
            "int16" => Ok(BasicType::Int16),
            "int32" => Ok(BasicType::Int32),
            "int64" => Ok(BasicType::Int64),
            "float" => Ok(BasicType::Float),
            "double" => Ok(BasicType::Double),
            "string" => Ok(BasicType::String),
            "reference" => Ok(BasicType::Reference),
            other => Err(format!("unknown basic type '{}'", other)),
        }
    }
}

// ============================================================================
// CollectionType
// ============================================================================

/// How many values a document holds for an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    /// Exactly one value per document
    Single,
    /// Ordered list of values, duplicates allowed
    Array,
    /// Set of values, each carrying an `i32` weight
    WeightedSet,
}

impl CollectionType {
    /// Name used in persisted headers and configuration
    pub const fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Single => "single",
            CollectionType::Array => "array",
            CollectionType::WeightedSet => "weightedset",
        }
    }

    /// Whether documents may hold more than one value
    pub const fn is_multi_value(&self) -> bool {
        !matches!(self, CollectionType::Single)
    }

    /// Whether values carry weights
    pub const fn is_weighted_set(&self) -> bool {
        matches!(self, CollectionType::WeightedSet)
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(CollectionType::Single),
            "array" => Ok(CollectionType::Array),
            "weightedset" => Ok(CollectionType::WeightedSet),
            other => Err(format!("unknown collection type '{}'", other)),
        }
    }
}

// ============================================================================
// GlobalId
// ============================================================================

/// Collection-independent identity of a document
///
/// Reference attributes store global ids; the document meta store of the
/// referenced collection resolves them to target lids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub u64);

impl GlobalId {
    /// Create a global id from its raw value
    pub const fn new(raw: u64) -> Self {
        GlobalId(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for GlobalId {
    fn from(raw: u64) -> Self {
        GlobalId(raw)
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gid:{:016x}", self.0)
    }
}
