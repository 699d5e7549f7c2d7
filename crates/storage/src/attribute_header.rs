//! Attribute-specific header contents
//!
//! Maps the semantic description of a saved attribute onto the generic
//! tagged header and validates it on load.

use attrstore_core::{BasicType, CollectionType, DocId, SerialNum};

use crate::header::{FileHeader, HeaderError, TAG_FROZEN, TAG_FROZEN_TIME};

/// Tag: basic type name
pub const TAG_DATA_TYPE: &str = "datatype";
/// Tag: collection type name
pub const TAG_COLLECTION_TYPE: &str = "collectiontype";
/// Tag: document id limit at save time
pub const TAG_DOC_ID_LIMIT: &str = "docIdLimit";
/// Tag: whether values are stored as enum indexes into `.udat`
pub const TAG_ENUMERATED: &str = "enumerated";
/// Tag: distinct value count
pub const TAG_UNIQUE_VALUE_COUNT: &str = "uniqueValueCount";
/// Tag: total value count
pub const TAG_TOTAL_VALUE_COUNT: &str = "totalValueCount";
/// Tag: serial number at creation
pub const TAG_CREATE_SERIAL_NUM: &str = "createSerialNum";
/// Tag: attribute body format version
pub const TAG_VERSION: &str = "version";
/// Tag: original file base name
pub const TAG_FILE_NAME: &str = "fileName";
/// Tag: weighted set create-if-nonexistent flag
pub const TAG_WSET_CREATE_IF_NONEXISTENT: &str = "wsetCreateIfNonexistent";
/// Tag: weighted set remove-if-zero flag
pub const TAG_WSET_REMOVE_IF_ZERO: &str = "wsetRemoveIfZero";

/// Current attribute body format version
pub const ATTRIBUTE_FORMAT_VERSION: i64 = 1;

/// Semantic header of a saved attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeHeader {
    /// Base file name the attribute was saved under
    pub file_name: String,
    /// Value type
    pub basic_type: BasicType,
    /// Collection type
    pub collection_type: CollectionType,
    /// Number of documents saved
    pub doc_id_limit: DocId,
    /// Values stored as indexes into a unique-value file
    pub enumerated: bool,
    /// Distinct values
    pub unique_value_count: u64,
    /// Total values
    pub total_value_count: u64,
    /// Serial number at creation
    pub create_serial_num: SerialNum,
    /// Body format version
    pub version: i64,
    /// Weighted set flag
    pub create_if_nonexistent: bool,
    /// Weighted set flag
    pub remove_if_zero: bool,
}

impl AttributeHeader {
    /// Header for a fresh save
    pub fn new(
        file_name: impl Into<String>,
        basic_type: BasicType,
        collection_type: CollectionType,
        doc_id_limit: DocId,
    ) -> Self {
        AttributeHeader {
            file_name: file_name.into(),
            basic_type,
            collection_type,
            doc_id_limit,
            enumerated: false,
            unique_value_count: 0,
            total_value_count: 0,
            create_serial_num: 0,
            version: ATTRIBUTE_FORMAT_VERSION,
            create_if_nonexistent: false,
            remove_if_zero: false,
        }
    }

    /// Encode as generic tags, unfrozen
    pub fn to_file_header(&self) -> FileHeader {
        let mut h = FileHeader::new();
        h.put_string(TAG_FILE_NAME, self.file_name.clone());
        h.put_string(TAG_DATA_TYPE, self.basic_type.as_str());
        h.put_string(TAG_COLLECTION_TYPE, self.collection_type.as_str());
        h.put_integer(TAG_DOC_ID_LIMIT, self.doc_id_limit as i64);
        h.put_integer(TAG_ENUMERATED, self.enumerated as i64);
        h.put_integer(TAG_UNIQUE_VALUE_COUNT, self.unique_value_count as i64);
        h.put_integer(TAG_TOTAL_VALUE_COUNT, self.total_value_count as i64);
        h.put_integer(TAG_CREATE_SERIAL_NUM, self.create_serial_num as i64);
        h.put_integer(TAG_VERSION, self.version);
        if self.collection_type.is_weighted_set() {
            h.put_integer(TAG_WSET_CREATE_IF_NONEXISTENT, self.create_if_nonexistent as i64);
            h.put_integer(TAG_WSET_REMOVE_IF_ZERO, self.remove_if_zero as i64);
        }
        h.put_integer(TAG_FROZEN, 0);
        h.put_integer(TAG_FROZEN_TIME, 0);
        h
    }

    /// Decode from generic tags
    pub fn from_file_header(h: &FileHeader) -> Result<Self, HeaderError> {
        let basic_type = h
            .get_string(TAG_DATA_TYPE)
            .and_then(|s| s.parse::<BasicType>().ok())
            .ok_or_else(|| HeaderError::MissingTag(TAG_DATA_TYPE.to_string()))?;
        let collection_type = h
            .get_string(TAG_COLLECTION_TYPE)
            .and_then(|s| s.parse::<CollectionType>().ok())
            .ok_or_else(|| HeaderError::MissingTag(TAG_COLLECTION_TYPE.to_string()))?;
        let doc_id_limit = h
            .get_integer(TAG_DOC_ID_LIMIT)
            .and_then(|v| DocId::try_from(v).ok())
            .ok_or_else(|| HeaderError::MissingTag(TAG_DOC_ID_LIMIT.to_string()))?;
        Ok(AttributeHeader {
            file_name: h.get_string(TAG_FILE_NAME).unwrap_or_default().to_string(),
            basic_type,
            collection_type,
            doc_id_limit,
            enumerated: h.get_integer(TAG_ENUMERATED).unwrap_or(0) != 0,
            unique_value_count: h.get_integer(TAG_UNIQUE_VALUE_COUNT).unwrap_or(0) as u64,
            total_value_count: h.get_integer(TAG_TOTAL_VALUE_COUNT).unwrap_or(0) as u64,
            create_serial_num: h.get_integer(TAG_CREATE_SERIAL_NUM).unwrap_or(0) as u64,
            version: h.get_integer(TAG_VERSION).unwrap_or(0),
            create_if_nonexistent: h.get_integer(TAG_WSET_CREATE_IF_NONEXISTENT).unwrap_or(0) != 0,
            remove_if_zero: h.get_integer(TAG_WSET_REMOVE_IF_ZERO).unwrap_or(0) != 0,
        })
    }

    /// Whether the header's types match the expected ones
    pub fn type_ok(&self, basic_type: BasicType, collection_type: CollectionType) -> bool {
        self.basic_type == basic_type && self.collection_type == collection_type
    }
}

/// Check a raw header against the expected types
///
/// Requires the datatype, collectiontype, and docIdLimit tags to be present
/// and the two type names to match.
pub fn header_type_ok(h: &FileHeader, basic_type: BasicType, collection_type: CollectionType) -> bool {
    h.has_tag(TAG_DATA_TYPE)
        && h.has_tag(TAG_COLLECTION_TYPE)
        && h.has_tag(TAG_DOC_ID_LIMIT)
        && h.get_string(TAG_DATA_TYPE) == Some(basic_type.as_str())
        && h.get_string(TAG_COLLECTION_TYPE) == Some(collection_type.as_str())
}
