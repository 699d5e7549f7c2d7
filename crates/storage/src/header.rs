//! Generic tagged file header
//!
//! Every persisted attribute file begins with a self-describing header: an
//! ordered list of named, typed tags. The header is written twice: once
//! with `frozen = 0` before the body, and once more in place with
//! `frozen = 1` and a `frozenTime` after the body is durable. Only integer
//! tags change between the two writes, so the encoded length is stable.
//!
//! # Format
//!
//! ```text
//! +------------------+
//! | Magic: "ATRH"    | 4 bytes
//! | Format Version   | 4 bytes (u32 LE)
//! | Header Length    | 4 bytes (u32 LE, includes CRC)
//! | Tag Count        | 4 bytes (u32 LE)
//! | Tags             | variable
//! | CRC32            | 4 bytes
//! +------------------+
//!
//! Tag: name_len u16 LE | name | type u8 | value
//!      type 0: i64 LE   type 1: f64 LE   type 2: u32 LE len | UTF-8 bytes
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};
use thiserror::Error;

/// Header magic bytes: "ATRH"
pub const HEADER_MAGIC: [u8; 4] = *b"ATRH";

/// Current header format version
pub const HEADER_FORMAT_VERSION: u32 = 1;

/// Fixed prefix: magic + version + length + tag count
const PREFIX_LEN: usize = 16;

/// Name of the freeze flag tag
pub const TAG_FROZEN: &str = "frozen";
/// Name of the freeze timestamp tag (microseconds since the Unix epoch)
pub const TAG_FROZEN_TIME: &str = "frozenTime";

/// Errors decoding a header
#[derive(Debug, Error)]
pub enum HeaderError {
    /// Fewer bytes than the header claims
    #[error("header truncated")]
    TooShort,

    /// Magic bytes do not match
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Written by a newer format
    #[error("unsupported header format version {0}")]
    UnsupportedVersion(u32),

    /// CRC mismatch
    #[error("header checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// CRC stored in the header
        expected: u32,
        /// CRC of the bytes read
        computed: u32,
    },

    /// Unknown tag type byte
    #[error("unknown tag type {0}")]
    UnknownTagType(u8),

    /// Tag name or string value not UTF-8
    #[error("tag is not valid UTF-8")]
    InvalidUtf8,

    /// A required tag is absent or has the wrong type
    #[error("missing or mistyped tag '{0}'")]
    MissingTag(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Typed tag value
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// Signed integer
    Integer(i64),
    /// Floating point
    Float(f64),
    /// UTF-8 string
    String(String),
}

impl Tag {
    fn type_byte(&self) -> u8 {
        match self {
            Tag::Integer(_) => 0,
            Tag::Float(_) => 1,
            Tag::String(_) => 2,
        }
    }
}

/// Ordered set of named tags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileHeader {
    tags: Vec<(String, Tag)>,
}

impl FileHeader {
    /// Create an empty header
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag, keeping first-insertion order
    pub fn put(&mut self, name: &str, tag: Tag) {
        if let Some(slot) = self.tags.iter_mut().find(|(n, _)| n == name) {
            slot.1 = tag;
        } else {
            self.tags.push((name.to_string(), tag));
        }
    }

    /// Insert an integer tag
    pub fn put_integer(&mut self, name: &str, value: i64) {
        self.put(name, Tag::Integer(value));
    }

    /// Insert a string tag
    pub fn put_string(&mut self, name: &str, value: impl Into<String>) {
        self.put(name, Tag::String(value.into()));
    }

    /// Insert a float tag
    pub fn put_float(&mut self, name: &str, value: f64) {
        self.put(name, Tag::Float(value));
    }

    /// Look up a tag
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Whether a tag is present
    pub fn has_tag(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Integer tag value
    pub fn get_integer(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Tag::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    /// String tag value
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Tag::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Float tag value
    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(Tag::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Whether the freeze step completed
    pub fn is_frozen(&self) -> bool {
        self.get_integer(TAG_FROZEN) == Some(1)
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether there are no tags
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128);
        bytes.extend_from_slice(&HEADER_MAGIC);
        bytes.extend_from_slice(&HEADER_FORMAT_VERSION.to_le_bytes());
        // Length placeholder, patched below
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(self.tags.len() as u32).to_le_bytes());

        for (name, tag) in &self.tags {
            // Writes into a Vec cannot fail
            let _ = bytes.write_u16::<LittleEndian>(name.len() as u16);
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(tag.type_byte());
            match tag {
                Tag::Integer(v) => {
                    let _ = bytes.write_i64::<LittleEndian>(*v);
                }
                Tag::Float(v) => {
                    let _ = bytes.write_f64::<LittleEndian>(*v);
                }
                Tag::String(s) => {
                    let _ = bytes.write_u32::<LittleEndian>(s.len() as u32);
                    bytes.extend_from_slice(s.as_bytes());
                }
            }
        }

        let total_len = (bytes.len() + 4) as u32;
        bytes[8..12].copy_from_slice(&total_len.to_le_bytes());

        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    /// Deserialize from the start of `bytes`
    ///
    /// Returns the header and the number of bytes it occupies.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), HeaderError> {
        if bytes.len() < PREFIX_LEN + 4 {
            return Err(HeaderError::TooShort);
        }
        if bytes[0..4] != HEADER_MAGIC {
            return Err(HeaderError::InvalidMagic);
        }

        let mut cursor = &bytes[4..PREFIX_LEN];
        let version = cursor.read_u32::<LittleEndian>()?;
        if version > HEADER_FORMAT_VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        let total_len = cursor.read_u32::<LittleEndian>()? as usize;
        let tag_count = cursor.read_u32::<LittleEndian>()?;
        if total_len < PREFIX_LEN + 4 || bytes.len() < total_len {
            return Err(HeaderError::TooShort);
        }

        let stored_crc = u32::from_le_bytes([
            bytes[total_len - 4],
            bytes[total_len - 3],
            bytes[total_len - 2],
            bytes[total_len - 1],
        ]);
        let computed_crc = crc32fast::hash(&bytes[..total_len - 4]);
        if stored_crc != computed_crc {
            return Err(HeaderError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let mut cursor = &bytes[PREFIX_LEN..total_len - 4];
        let mut header = FileHeader::new();
        for _ in 0..tag_count {
            let name_len = cursor
                .read_u16::<LittleEndian>()
                .map_err(|_| HeaderError::TooShort)? as usize;
            let name = read_utf8(&mut cursor, name_len)?;
            let type_byte = cursor.read_u8().map_err(|_| HeaderError::TooShort)?;
            let tag = match type_byte {
                0 => Tag::Integer(
                    cursor
                        .read_i64::<LittleEndian>()
                        .map_err(|_| HeaderError::TooShort)?,
                ),
                1 => Tag::Float(
                    cursor
                        .read_f64::<LittleEndian>()
                        .map_err(|_| HeaderError::TooShort)?,
                ),
                2 => {
                    let len = cursor
                        .read_u32::<LittleEndian>()
                        .map_err(|_| HeaderError::TooShort)? as usize;
                    Tag::String(read_utf8(&mut cursor, len)?)
                }
                other => return Err(HeaderError::UnknownTagType(other)),
            };
            header.tags.push((name, tag));
        }
        Ok((header, total_len))
    }

    /// Read a header from a stream, leaving it positioned at the body
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, usize), HeaderError> {
        let mut prefix = [0u8; PREFIX_LEN];
        reader.read_exact(&mut prefix)?;
        if prefix[0..4] != HEADER_MAGIC {
            return Err(HeaderError::InvalidMagic);
        }
        let total_len = u32::from_le_bytes([prefix[8], prefix[9], prefix[10], prefix[11]]) as usize;
        if total_len < PREFIX_LEN + 4 {
            return Err(HeaderError::TooShort);
        }
        let mut bytes = vec![0u8; total_len];
        bytes[..PREFIX_LEN].copy_from_slice(&prefix);
        reader.read_exact(&mut bytes[PREFIX_LEN..])?;
        Self::from_bytes(&bytes)
    }
}

fn read_utf8(cursor: &mut &[u8], len: usize) -> Result<String, HeaderError> {
    if cursor.len() < len {
        return Err(HeaderError::TooShort);
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    String::from_utf8(head.to_vec()).map_err(|_| HeaderError::InvalidUtf8)
}
