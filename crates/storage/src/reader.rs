//! Attribute file reader
//!
//! Loads the files of one saved attribute, validating each header before
//! the body is handed to the attribute. A file whose header is not frozen
//! was never completely written and is rejected.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use attrstore_core::{BasicType, CollectionType, Error, Result};
use tracing::{debug, warn};

use crate::attribute_header::{header_type_ok, AttributeHeader};
use crate::header::{FileHeader, HeaderError};
use crate::save_target::{FileKind, MemorySaveTarget};

/// One loaded file: its header and body
#[derive(Debug, Clone)]
pub struct LoadedFile {
    /// Parsed header
    pub header: FileHeader,
    /// Bytes after the header
    pub body: Vec<u8>,
}

fn header_error(path: &Path, e: HeaderError) -> Error {
    match e {
        HeaderError::Io(io) => Error::Io(io),
        other => Error::InvalidHeader {
            file: path.display().to_string(),
            reason: other.to_string(),
        },
    }
}

/// Read a single attribute file
pub fn read_attribute_file(path: &Path) -> Result<LoadedFile> {
    let mut file = File::open(path)?;
    let (header, _) = FileHeader::read_from(&mut file).map_err(|e| header_error(path, e))?;
    let mut body = Vec::new();
    file.read_to_end(&mut body)?;
    Ok(LoadedFile { header, body })
}

/// All files of one saved attribute, validated
#[derive(Debug)]
pub struct AttributeReader {
    header: AttributeHeader,
    dat: Vec<u8>,
    idx: Vec<u8>,
    weight: Vec<u8>,
    udat: Vec<u8>,
}

impl AttributeReader {
    /// Whether a saved attribute exists under `base`
    pub fn exists(base: &Path) -> bool {
        FileKind::Dat.path(base).is_file()
    }

    /// Open and validate the files under `base`
    ///
    /// Fails with `TypeMismatch` if the saved types differ from the expected
    /// ones and with `InvalidHeader` if any required file is unfrozen or
    /// disagrees with the `.dat` header on the document id limit.
    pub fn open(base: &Path, basic_type: BasicType, collection_type: CollectionType) -> Result<Self> {
        let dat_path = FileKind::Dat.path(base);
        let dat = read_attribute_file(&dat_path)?;
        let header = validate(&dat_path, &dat.header, basic_type, collection_type)?;

        let mut reader = AttributeReader {
            header,
            dat: dat.body,
            idx: Vec::new(),
            weight: Vec::new(),
            udat: Vec::new(),
        };
        for kind in [FileKind::Idx, FileKind::Weight, FileKind::Udat] {
            if !kind.is_required(&reader.header) {
                continue;
            }
            let path = kind.path(base);
            let file = read_attribute_file(&path)?;
            let other = validate(&path, &file.header, basic_type, collection_type)?;
            if other.doc_id_limit != reader.header.doc_id_limit {
                return Err(Error::InvalidHeader {
                    file: path.display().to_string(),
                    reason: format!(
                        "docIdLimit {} disagrees with {}",
                        other.doc_id_limit, reader.header.doc_id_limit
                    ),
                });
            }
            *reader.body_mut(kind) = file.body;
        }
        debug!(
            target: "attr::storage",
            base = %base.display(),
            doc_id_limit = reader.header.doc_id_limit,
            "Opened attribute files"
        );
        Ok(reader)
    }

    /// Reader over a save captured in memory
    pub fn from_memory(
        target: &MemorySaveTarget,
        basic_type: BasicType,
        collection_type: CollectionType,
    ) -> Result<Self> {
        use crate::save_target::SaveTarget;

        if !target.is_closed() {
            return Err(Error::InvalidOperation("memory save target not closed".to_string()));
        }
        let header = target.header().clone();
        if !header.type_ok(basic_type, collection_type) {
            return Err(Error::TypeMismatch {
                expected_basic: basic_type,
                expected_collection: collection_type,
                found: format!("{}/{}", header.basic_type, header.collection_type),
            });
        }
        let body = |kind| target.body(kind).map(<[u8]>::to_vec).unwrap_or_default();
        Ok(AttributeReader {
            dat: body(FileKind::Dat),
            idx: body(FileKind::Idx),
            weight: body(FileKind::Weight),
            udat: body(FileKind::Udat),
            header,
        })
    }

    /// Semantic header of the `.dat` file
    pub fn header(&self) -> &AttributeHeader {
        &self.header
    }

    /// Body of one file kind; empty when the kind does not apply
    pub fn body(&self, kind: FileKind) -> &[u8] {
        match kind {
            FileKind::Dat => &self.dat,
            FileKind::Idx => &self.idx,
            FileKind::Weight => &self.weight,
            FileKind::Udat => &self.udat,
        }
    }

    fn body_mut(&mut self, kind: FileKind) -> &mut Vec<u8> {
        match kind {
            FileKind::Dat => &mut self.dat,
            FileKind::Idx => &mut self.idx,
            FileKind::Weight => &mut self.weight,
            FileKind::Udat => &mut self.udat,
        }
    }
}

fn validate(
    path: &Path,
    raw: &FileHeader,
    basic_type: BasicType,
    collection_type: CollectionType,
) -> Result<AttributeHeader> {
    if !raw.is_frozen() {
        warn!(target: "attr::storage", path = %path.display(), "Attribute file header not frozen");
        return Err(Error::InvalidHeader {
            file: path.display().to_string(),
            reason: "header not frozen".to_string(),
        });
    }
    if !header_type_ok(raw, basic_type, collection_type) {
        let found = format!(
            "{}/{}",
            raw.get_string(crate::attribute_header::TAG_DATA_TYPE).unwrap_or("?"),
            raw.get_string(crate::attribute_header::TAG_COLLECTION_TYPE).unwrap_or("?")
        );
        return Err(Error::TypeMismatch {
            expected_basic: basic_type,
            expected_collection: collection_type,
            found,
        });
    }
    AttributeHeader::from_file_header(raw).map_err(|e| header_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save_target::{FileSaveTarget, SaveTarget};
    use std::io::Write;
    use tempfile::TempDir;

    fn save(base: &Path, collection: CollectionType) {
        let mut target = FileSaveTarget::new(base);
        target.set_header(AttributeHeader::new("x", BasicType::Int16, collection, 4));
        target.setup().unwrap();
        target.writer(FileKind::Dat).extend_from_slice(&[9; 8]);
        target.writer(FileKind::Idx).extend_from_slice(&[1; 20]);
        target.close().unwrap();
    }

    #[test]
    fn test_open_roundtrip() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("x");
        save(&base, CollectionType::Array);
        assert!(AttributeReader::exists(&base));

        let r = AttributeReader::open(&base, BasicType::Int16, CollectionType::Array).unwrap();
        assert_eq!(r.header().doc_id_limit, 4);
        assert_eq!(r.body(FileKind::Dat), &[9; 8]);
        assert_eq!(r.body(FileKind::Idx), &[1; 20]);
        assert!(r.body(FileKind::Weight).is_empty());
    }

    #[test]
    fn test_type_mismatch() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("x");
        save(&base, CollectionType::Single);
        let err = AttributeReader::open(&base, BasicType::Int32, CollectionType::Single).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_unfrozen_file_rejected() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("x");
        let fh = AttributeHeader::new("x", BasicType::Int8, CollectionType::Single, 1).to_file_header();
        let mut f = File::create(FileKind::Dat.path(&base)).unwrap();
        f.write_all(&fh.to_bytes()).unwrap();
        f.write_all(&[0]).unwrap();
        drop(f);

        let err = AttributeReader::open(&base, BasicType::Int8, CollectionType::Single).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }

    #[test]
    fn test_missing_companion_file() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("x");
        save(&base, CollectionType::Array);
        std::fs::remove_file(FileKind::Idx.path(&base)).unwrap();
        let err = AttributeReader::open(&base, BasicType::Int16, CollectionType::Array).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_corrupt_header() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("x");
        save(&base, CollectionType::Single);
        let path = FileKind::Dat.path(&base);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[20] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();
        let err = AttributeReader::open(&base, BasicType::Int16, CollectionType::Single).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }

    #[test]
    fn test_from_memory() {
        let mut target = MemorySaveTarget::new();
        target.set_header(AttributeHeader::new("m", BasicType::Double, CollectionType::Single, 2));
        target.setup().unwrap();
        target.writer(FileKind::Dat).extend_from_slice(&[3; 16]);
        assert!(AttributeReader::from_memory(&target, BasicType::Double, CollectionType::Single).is_err());
        target.close().unwrap();
        let r = AttributeReader::from_memory(&target, BasicType::Double, CollectionType::Single).unwrap();
        assert_eq!(r.body(FileKind::Dat).len(), 16);
        assert!(AttributeReader::from_memory(&target, BasicType::Float, CollectionType::Single).is_err());
    }
}
