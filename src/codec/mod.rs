//! Archive codec layer.
//!
//! Formats are recognized by their leading bytes rather than file
//! extensions: ZIP, plain tar, gzip-compressed tar and bare gzip streams can
//! be walked, and archives are always created as `.tar.gz`.

mod tarball;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::LocalFileReader;
use crate::zip::{ZipFileEntry, ZipParser};

/// Bytes inspected to recognize a format; one tar header block.
const SNIFF_LEN: usize = 512;
const TAR_MAGIC_OFFSET: usize = 257;

/// Format-specific header of an archive member.
#[derive(Debug, Clone)]
pub enum MemberHeader {
    Zip(ZipFileEntry),
    Tar(TarHeader),
    Gzip(GzipHeader),
    /// Format without a structured name field.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct TarHeader {
    /// Path bytes after GNU long-name and PAX overrides.
    pub name: Vec<u8>,
    /// Whether the path came from a PAX `path` record.
    pub pax_path: bool,
}

#[derive(Debug, Clone)]
pub struct GzipHeader {
    /// The optional `FNAME` field.
    pub name: Option<Vec<u8>>,
}

impl MemberHeader {
    /// Raw name field, when this header kind stores one.
    pub fn name_bytes(&self) -> Option<&[u8]> {
        match self {
            MemberHeader::Zip(entry) => Some(&entry.file_name_raw),
            MemberHeader::Tar(header) => Some(&header.name),
            MemberHeader::Gzip(header) => header.name.as_deref(),
            MemberHeader::Unknown => None,
        }
    }

    /// Whether the format explicitly marks the name as UTF-8.
    pub fn declares_utf8(&self) -> bool {
        match self {
            MemberHeader::Zip(entry) => entry.is_utf8(),
            MemberHeader::Tar(header) => header.pax_path,
            MemberHeader::Gzip(_) | MemberHeader::Unknown => false,
        }
    }
}

/// One entry encountered while walking an archive.
///
/// The content is a forward-only stream valid only for the duration of the
/// visit.
pub struct ArchiveMember<'a> {
    /// Name as reported by the codec, lossily decoded.
    pub name: String,
    pub header: MemberHeader,
    pub is_dir: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    pub mode: u32,
    pub modified: SystemTime,
    pub content: &'a mut dyn Read,
}

impl std::fmt::Debug for ArchiveMember<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveMember")
            .field("name", &self.name)
            .field("is_dir", &self.is_dir)
            .field("size", &self.size)
            .field("mode", &format_args!("{:o}", self.mode))
            .finish_non_exhaustive()
    }
}

/// Called once per member; returning an error stops the walk.
pub type Visitor<'v> = dyn FnMut(ArchiveMember<'_>) -> Result<()> + 'v;

/// Reads and writes archive containers.
pub trait ArchiveCodec: Send + Sync {
    /// Visit every member of `archive` in order.
    ///
    /// Fails with [`Error::UnknownArchive`] when the container is not
    /// recognized. An error returned by the visitor ends the walk and is
    /// passed through unchanged.
    fn walk(&self, archive: &Path, visitor: &mut Visitor<'_>) -> Result<()>;

    /// Write `sources` (recursively) into a new archive at `output`, naming
    /// entries relative to `base`.
    fn create(&self, output: &Path, base: &Path, sources: &[PathBuf]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    Gzip,
}

/// Recognize an archive from its leading bytes.
pub fn detect_format(path: &Path) -> Result<Option<ArchiveFormat>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;

    if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        return Ok(Some(ArchiveFormat::Zip));
    }
    if head.starts_with(&[0x1f, 0x8b]) {
        let mut inner = Vec::with_capacity(SNIFF_LEN);
        let decoded = tarball::open_gzip(path)?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut inner);
        return Ok(Some(match decoded {
            Ok(_) if has_tar_magic(&inner) => ArchiveFormat::TarGz,
            _ => ArchiveFormat::Gzip,
        }));
    }
    if has_tar_magic(&head) {
        return Ok(Some(ArchiveFormat::Tar));
    }
    Ok(None)
}

fn has_tar_magic(block: &[u8]) -> bool {
    block
        .get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5)
        .is_some_and(|magic| magic == b"ustar")
}

/// Codec for the formats this crate understands.
#[derive(Debug, Clone)]
pub struct StandardCodec {
    level: u32,
}

impl StandardCodec {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self::new(6)
    }
}

impl ArchiveCodec for StandardCodec {
    fn walk(&self, archive: &Path, visitor: &mut Visitor<'_>) -> Result<()> {
        let Some(format) = detect_format(archive)? else {
            return Err(Error::UnknownArchive {
                path: archive.to_path_buf(),
            });
        };
        debug!(archive = %archive.display(), ?format, "walking archive");

        match format {
            ArchiveFormat::Zip => walk_zip(archive, visitor),
            ArchiveFormat::Tar => tarball::walk_tar(BufReader::new(File::open(archive)?), visitor),
            ArchiveFormat::TarGz => tarball::walk_tar(tarball::open_gzip(archive)?, visitor),
            ArchiveFormat::Gzip => tarball::walk_gzip(archive, visitor),
        }
    }

    fn create(&self, output: &Path, base: &Path, sources: &[PathBuf]) -> Result<()> {
        tarball::create_tar_gz(output, base, sources, self.level)
    }
}

fn walk_zip(archive: &Path, visitor: &mut Visitor<'_>) -> Result<()> {
    let parser = ZipParser::new(LocalFileReader::new(archive)?);

    for entry in parser.list_files()? {
        if entry.is_symlink() {
            debug!(member = %entry.file_name(), "skipping symlink member");
            continue;
        }

        let is_dir = entry.is_directory();
        let mut content: Box<dyn Read + '_> = if is_dir {
            Box::new(io::empty())
        } else {
            parser.open_entry(&entry)?
        };

        visitor(ArchiveMember {
            name: entry.file_name(),
            is_dir,
            size: entry.uncompressed_size,
            mode: entry.permissions(),
            modified: entry.modified(),
            header: MemberHeader::Zip(entry),
            content: &mut content,
        })?;
    }
    Ok(())
}
