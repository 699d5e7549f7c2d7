//! Save targets: where an attribute writes its persisted form
//!
//! An attribute fills one body buffer per file kind; the target decides
//! what happens on `close()`. `FileSaveTarget` writes `<base><suffix>` files
//! and freezes their headers; `MemorySaveTarget` keeps the bytes so a save
//! can be captured quickly and written out later.
//!
//! | suffix    | contents                    | present when            |
//! |-----------|-----------------------------|-------------------------|
//! | `.dat`    | values or enum indexes      | always                  |
//! | `.idx`    | multi-value offsets         | collection is multi     |
//! | `.weight` | `i32` weights               | collection is wset      |
//! | `.udat`   | unique values               | header is enumerated    |

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use attrstore_core::{Error, Result};
use tracing::debug;

use crate::attribute_header::AttributeHeader;
use crate::header::{FileHeader, TAG_FROZEN, TAG_FROZEN_TIME};

/// One persisted file of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Values
    Dat,
    /// Multi-value offsets
    Idx,
    /// Weighted set weights
    Weight,
    /// Unique (enumerated) values
    Udat,
}

impl FileKind {
    /// All kinds, in save order
    pub const ALL: [FileKind; 4] = [FileKind::Dat, FileKind::Idx, FileKind::Weight, FileKind::Udat];

    /// File name suffix
    pub const fn suffix(&self) -> &'static str {
        match self {
            FileKind::Dat => ".dat",
            FileKind::Idx => ".idx",
            FileKind::Weight => ".weight",
            FileKind::Udat => ".udat",
        }
    }

    /// Whether this kind is part of an attribute saved with `header`
    pub fn is_required(&self, header: &AttributeHeader) -> bool {
        match self {
            FileKind::Dat => true,
            FileKind::Idx => header.collection_type.is_multi_value(),
            FileKind::Weight => header.collection_type.is_weighted_set(),
            FileKind::Udat => header.enumerated,
        }
    }

    /// Full path for this kind under `base`
    pub fn path(&self, base: &Path) -> PathBuf {
        let mut s = base.as_os_str().to_os_string();
        s.push(self.suffix());
        PathBuf::from(s)
    }
}

/// Body buffers, one per file kind
#[derive(Debug, Default, Clone)]
pub struct Bodies {
    dat: Vec<u8>,
    idx: Vec<u8>,
    weight: Vec<u8>,
    udat: Vec<u8>,
}

impl Bodies {
    fn get_mut(&mut self, kind: FileKind) -> &mut Vec<u8> {
        match kind {
            FileKind::Dat => &mut self.dat,
            FileKind::Idx => &mut self.idx,
            FileKind::Weight => &mut self.weight,
            FileKind::Udat => &mut self.udat,
        }
    }

    fn get(&self, kind: FileKind) -> &[u8] {
        match kind {
            FileKind::Dat => &self.dat,
            FileKind::Idx => &self.idx,
            FileKind::Weight => &self.weight,
            FileKind::Udat => &self.udat,
        }
    }
}

/// Destination of an attribute save
pub trait SaveTarget: Send {
    /// Header describing what is being saved; set before `setup`
    fn set_header(&mut self, header: AttributeHeader);

    /// Current header
    fn header(&self) -> &AttributeHeader;

    /// Prepare for writing; discards any previous bodies
    fn setup(&mut self) -> Result<()>;

    /// Body buffer for one file kind
    fn writer(&mut self, kind: FileKind) -> &mut Vec<u8>;

    /// Finish the save
    fn close(&mut self) -> Result<()>;
}

/// Write `header` + `body` to `path`, then freeze the header in place
///
/// The file is synced before the freeze so a frozen header implies a
/// complete body.
pub fn write_frozen_file(path: &Path, header: &FileHeader, body: &[u8]) -> Result<()> {
    let mut header = header.clone();
    header.put_integer(TAG_FROZEN, 0);
    header.put_integer(TAG_FROZEN_TIME, 0);

    let mut file: File = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let unfrozen = header.to_bytes();
    file.write_all(&unfrozen)?;
    file.write_all(body)?;
    file.sync_all()?;

    header.put_integer(TAG_FROZEN, 1);
    header.put_integer(TAG_FROZEN_TIME, chrono::Utc::now().timestamp_micros());
    let frozen = header.to_bytes();
    if frozen.len() != unfrozen.len() {
        return Err(Error::InvalidOperation(format!(
            "header length changed while freezing {}",
            path.display()
        )));
    }
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&frozen)?;
    file.sync_all()?;
    Ok(())
}

// ============================================================================
// FileSaveTarget
// ============================================================================

/// Writes `<base><suffix>` files on close
pub struct FileSaveTarget {
    base: PathBuf,
    header: AttributeHeader,
    bodies: Bodies,
}

impl FileSaveTarget {
    /// Target writing under `base` (e.g. `/data/price` → `/data/price.dat`)
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let file_name = base
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        FileSaveTarget {
            base,
            header: AttributeHeader::new(
                file_name,
                attrstore_core::BasicType::Int32,
                attrstore_core::CollectionType::Single,
                0,
            ),
            bodies: Bodies::default(),
        }
    }

    /// Base path
    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl SaveTarget for FileSaveTarget {
    fn set_header(&mut self, header: AttributeHeader) {
        self.header = header;
    }

    fn header(&self) -> &AttributeHeader {
        &self.header
    }

    fn setup(&mut self) -> Result<()> {
        self.bodies = Bodies::default();
        if let Some(dir) = self.base.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    fn writer(&mut self, kind: FileKind) -> &mut Vec<u8> {
        self.bodies.get_mut(kind)
    }

    fn close(&mut self) -> Result<()> {
        let fh = self.header.to_file_header();
        for kind in FileKind::ALL {
            if kind.is_required(&self.header) {
                let path = kind.path(&self.base);
                write_frozen_file(&path, &fh, self.bodies.get(kind))?;
                debug!(target: "attr::storage", path = %path.display(), bytes = self.bodies.get(kind).len(), "Wrote attribute file");
            }
        }
        Ok(())
    }
}

// ============================================================================
// MemorySaveTarget
// ============================================================================

/// Keeps the saved bytes in memory
#[derive(Debug, Clone)]
pub struct MemorySaveTarget {
    header: AttributeHeader,
    bodies: Bodies,
    closed: bool,
}

impl MemorySaveTarget {
    /// Empty target
    pub fn new() -> Self {
        MemorySaveTarget {
            header: AttributeHeader::new(
                "",
                attrstore_core::BasicType::Int32,
                attrstore_core::CollectionType::Single,
                0,
            ),
            bodies: Bodies::default(),
            closed: false,
        }
    }

    /// Saved body of one kind, if the save is complete and the kind applies
    pub fn body(&self, kind: FileKind) -> Option<&[u8]> {
        (self.closed && kind.is_required(&self.header)).then(|| self.bodies.get(kind))
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write the captured save to `<base><suffix>` files
    pub fn write_to_files(&self, base: &Path) -> Result<()> {
        if !self.closed {
            return Err(Error::InvalidOperation("memory save target not closed".to_string()));
        }
        let mut target = FileSaveTarget::new(base);
        target.set_header(self.header.clone());
        target.setup()?;
        for kind in FileKind::ALL {
            target.writer(kind).extend_from_slice(self.bodies.get(kind));
        }
        target.close()
    }
}

impl Default for MemorySaveTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveTarget for MemorySaveTarget {
    fn set_header(&mut self, header: AttributeHeader) {
        self.header = header;
    }

    fn header(&self) -> &AttributeHeader {
        &self.header
    }

    fn setup(&mut self) -> Result<()> {
        self.bodies = Bodies::default();
        self.closed = false;
        Ok(())
    }

    fn writer(&mut self, kind: FileKind) -> &mut Vec<u8> {
        self.bodies.get_mut(kind)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FileHeader;
    use attrstore_core::{BasicType, CollectionType};
    use tempfile::TempDir;

    #[test]
    fn test_required_kinds() {
        let single = AttributeHeader::new("a", BasicType::Int8, CollectionType::Single, 1);
        let mut wset = AttributeHeader::new("b", BasicType::String, CollectionType::WeightedSet, 1);
        wset.enumerated = true;

        assert!(FileKind::Dat.is_required(&single));
        assert!(!FileKind::Idx.is_required(&single));
        assert!(!FileKind::Udat.is_required(&single));
        for kind in FileKind::ALL {
            assert!(kind.is_required(&wset));
        }
    }

    #[test]
    fn test_path_suffix() {
        assert_eq!(
            FileKind::Weight.path(Path::new("/x/tags")),
            PathBuf::from("/x/tags.weight")
        );
    }

    #[test]
    fn test_file_target_writes_frozen_files() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("sub").join("price");
        let mut target = FileSaveTarget::new(&base);
        target.set_header(AttributeHeader::new("price", BasicType::Int32, CollectionType::Array, 2));
        target.setup().unwrap();
        target.writer(FileKind::Dat).extend_from_slice(&[1, 2, 3, 4]);
        target.writer(FileKind::Idx).extend_from_slice(&[0; 12]);
        target.close().unwrap();

        let dat = std::fs::read(FileKind::Dat.path(&base)).unwrap();
        let (h, len) = FileHeader::from_bytes(&dat).unwrap();
        assert!(h.is_frozen());
        assert!(h.get_integer(TAG_FROZEN_TIME).unwrap() > 0);
        assert_eq!(&dat[len..], &[1, 2, 3, 4]);
        assert!(FileKind::Idx.path(&base).exists());
        assert!(!FileKind::Weight.path(&base).exists());
    }

    #[test]
    fn test_memory_target_defers_write() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("m");
        let mut target = MemorySaveTarget::new();
        target.set_header(AttributeHeader::new("m", BasicType::Int64, CollectionType::Single, 1));
        target.setup().unwrap();
        target.writer(FileKind::Dat).extend_from_slice(&7i64.to_le_bytes());
        assert!(target.body(FileKind::Dat).is_none());
        assert!(target.write_to_files(&base).is_err());

        target.close().unwrap();
        assert_eq!(target.body(FileKind::Dat).unwrap(), &7i64.to_le_bytes());
        target.write_to_files(&base).unwrap();
        assert!(FileKind::Dat.path(&base).exists());
    }
}
