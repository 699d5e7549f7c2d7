//! Attribute configuration and the `attributes.toml` file model
//!
//! An `AttributeConfig` is fixed at construction time; the value-store
//! implementation is selected once from its `(BasicType, CollectionType)`.
//!
//! # Example
//!
//! ```toml
//! [manager]
//! base_dir = "/var/db/attributes"
//!
//! [[attribute]]
//! name = "price"
//! datatype = "int64"
//! collectiontype = "single"
//! fast_search = true
//!
//! [[imported]]
//! name = "parent_price"
//! reference = "parent_ref"
//! target = "price"
//! search_cache = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{BasicType, CollectionType};

/// Config file name placed in the manager's base directory.
pub const CONFIG_FILE_NAME: &str = "attributes.toml";

/// Target hit count at or above which imported hit estimation scales instead
/// of counting exactly.
pub const DEFAULT_MIN_TARGET_HITS_FOR_APPROXIMATION: u32 = 50;

/// Minimum interval between non-forced statistics refreshes on commit.
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 5000;

// ============================================================================
// AttributeConfig
// ============================================================================

/// Static configuration of one attribute vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeConfig {
    /// Value type
    #[serde(rename = "datatype")]
    pub basic_type: BasicType,
    /// Single / array / weighted set
    #[serde(rename = "collectiontype", default = "default_collection_type")]
    pub collection_type: CollectionType,
    /// Maintain search structures for cheap hit estimation
    #[serde(default)]
    pub fast_search: bool,
    /// Searches only need matching lids, never weights
    #[serde(default)]
    pub is_filter: bool,
    /// Attribute accepts updates
    #[serde(default = "default_true")]
    pub mutable: bool,
    /// Weighted set: arithmetic on a missing key creates it
    #[serde(default)]
    pub create_if_nonexistent: bool,
    /// Weighted set: keys reaching weight 0 are removed
    #[serde(default)]
    pub remove_if_zero: bool,
}

fn default_collection_type() -> CollectionType {
    CollectionType::Single
}

fn default_true() -> bool {
    true
}

impl AttributeConfig {
    /// Create a config with default flags
    pub fn new(basic_type: BasicType, collection_type: CollectionType) -> Self {
        AttributeConfig {
            basic_type,
            collection_type,
            fast_search: false,
            is_filter: false,
            mutable: true,
            create_if_nonexistent: false,
            remove_if_zero: false,
        }
    }

    /// Builder: enable fast search
    pub fn with_fast_search(mut self, fast_search: bool) -> Self {
        self.fast_search = fast_search;
        self
    }

    /// Builder: mark as filter attribute
    pub fn with_filter(mut self, is_filter: bool) -> Self {
        self.is_filter = is_filter;
        self
    }

    /// Builder: weighted-set behaviour flags
    pub fn with_weighted_set_flags(mut self, create_if_nonexistent: bool, remove_if_zero: bool) -> Self {
        self.create_if_nonexistent = create_if_nonexistent;
        self.remove_if_zero = remove_if_zero;
        self
    }

    /// Whether another config describes the same value layout
    ///
    /// Only basic type and collection type must agree; flags may differ.
    pub fn is_type_compatible(&self, other: &AttributeConfig) -> bool {
        self.basic_type == other.basic_type && self.collection_type == other.collection_type
    }
}

// ============================================================================
// AttributesConfig (attributes.toml)
// ============================================================================

/// Manager-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Directory holding persisted attribute files
    #[serde(default)]
    pub base_dir: PathBuf,
    /// Minimum milliseconds between non-forced statistics refreshes
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    /// Imported hit estimation threshold
    #[serde(default = "default_min_target_hits")]
    pub min_target_hits_for_approximation: u32,
}

fn default_stats_interval_ms() -> u64 {
    DEFAULT_STATS_INTERVAL_MS
}

fn default_min_target_hits() -> u32 {
    DEFAULT_MIN_TARGET_HITS_FOR_APPROXIMATION
}

impl Default for ManagerSettings {
    fn default() -> Self {
        ManagerSettings {
            base_dir: PathBuf::new(),
            stats_interval_ms: default_stats_interval_ms(),
            min_target_hits_for_approximation: default_min_target_hits(),
        }
    }
}

/// One `[[attribute]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Attribute name
    pub name: String,
    /// Value layout and flags
    #[serde(flatten)]
    pub config: AttributeConfig,
}

/// One `[[imported]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedSpec {
    /// Name of the imported attribute
    pub name: String,
    /// Reference attribute in this collection
    pub reference: String,
    /// Attribute in the referenced collection
    pub target: String,
    /// Cache merged bitvectors per query term
    #[serde(default)]
    pub search_cache: bool,
}

/// Parsed `attributes.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributesConfig {
    /// Manager-level settings
    #[serde(default)]
    pub manager: ManagerSettings,
    /// Owned attributes
    #[serde(default, rename = "attribute")]
    pub attributes: Vec<AttributeSpec>,
    /// Imported attributes
    #[serde(default, rename = "imported")]
    pub imported: Vec<ImportedSpec>,
}

impl AttributesConfig {
    /// Parse from TOML text
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text is not valid TOML for this model.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Look up an owned attribute entry by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
