//! Fixtures shared by the unit tests.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{ArchiveCodec, ArchiveMember, MemberHeader, Visitor};
use crate::error::{Error, Result};
use crate::writer::{FileWriter, LocalFileWriter};
use crate::zip::{EXTRA_EXTENDED_TIMESTAMP, FLAG_UTF8};

/// 1980-01-01 00:00:00 in MS-DOS format.
const DOS_DATE: u16 = (1 << 5) | 1;

struct FixtureEntry {
    name: Vec<u8>,
    flags: u16,
    method: u16,
    data: Vec<u8>,
    crc: u32,
    size: u32,
    unix_mode: Option<u32>,
    mtime: Option<i32>,
    is_dir: bool,
}

/// Builds small ZIP archives in memory.
#[derive(Default)]
pub struct ZipFixture {
    entries: Vec<FixtureEntry>,
    comment: Vec<u8>,
}

impl ZipFixture {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &[u8], flags: u16, data: &[u8], deflate: bool) -> Self {
        let mut crc = flate2::Crc::new();
        crc.update(data);
        let (method, stored) = if deflate {
            let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).unwrap();
            (8, encoder.finish().unwrap())
        } else {
            (0, data.to_vec())
        };
        self.entries.push(FixtureEntry {
            name: name.to_vec(),
            flags,
            method,
            data: stored,
            crc: crc.sum(),
            size: data.len() as u32,
            unix_mode: None,
            mtime: None,
            is_dir: false,
        });
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        self = self.push(name.as_bytes(), 0, b"", false);
        if let Some(entry) = self.entries.last_mut() {
            entry.is_dir = true;
        }
        self
    }

    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.push(name.as_bytes(), 0, data, false)
    }

    /// A file whose name carries the UTF-8 flag.
    pub fn utf8_file(self, name: &str, data: &[u8]) -> Self {
        self.push(name.as_bytes(), FLAG_UTF8, data, false)
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.push(name.as_bytes(), 0, data, true)
    }

    pub fn raw_name_file(self, name: &[u8], flags: u16, data: &[u8]) -> Self {
        self.push(name, flags, data, false)
    }

    /// A file made on a Unix host, with a mode and an extended timestamp.
    pub fn unix_file(mut self, name: &str, data: &[u8], mode: u32, mtime: i32) -> Self {
        self = self.push(name.as_bytes(), 0, data, false);
        if let Some(entry) = self.entries.last_mut() {
            entry.unix_mode = Some(mode);
            entry.mtime = Some(mtime);
        }
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offsets = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            offsets.push(out.len() as u32);
            out.extend_from_slice(b"PK\x03\x04");
            out.write_u16::<LittleEndian>(20).unwrap();
            out.write_u16::<LittleEndian>(entry.flags).unwrap();
            out.write_u16::<LittleEndian>(entry.method).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(DOS_DATE).unwrap();
            out.write_u32::<LittleEndian>(entry.crc).unwrap();
            out.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(entry.size).unwrap();
            out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.extend_from_slice(&entry.name);
            out.extend_from_slice(&entry.data);
        }

        let cd_offset = out.len() as u32;
        for (entry, offset) in self.entries.iter().zip(offsets) {
            let mut extra = Vec::new();
            if let Some(mtime) = entry.mtime {
                extra.write_u16::<LittleEndian>(EXTRA_EXTENDED_TIMESTAMP).unwrap();
                extra.write_u16::<LittleEndian>(5).unwrap();
                extra.write_u8(0x01).unwrap();
                extra.write_i32::<LittleEndian>(mtime).unwrap();
            }
            let (made_by, external) = match entry.unix_mode {
                Some(mode) => ((3 << 8) | 20, mode << 16),
                None if entry.is_dir => (20, 0x10),
                None => (20, 0),
            };

            out.extend_from_slice(b"PK\x01\x02");
            out.write_u16::<LittleEndian>(made_by).unwrap();
            out.write_u16::<LittleEndian>(20).unwrap();
            out.write_u16::<LittleEndian>(entry.flags).unwrap();
            out.write_u16::<LittleEndian>(entry.method).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(DOS_DATE).unwrap();
            out.write_u32::<LittleEndian>(entry.crc).unwrap();
            out.write_u32::<LittleEndian>(entry.data.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(entry.size).unwrap();
            out.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(extra.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(external).unwrap();
            out.write_u32::<LittleEndian>(offset).unwrap();
            out.extend_from_slice(&entry.name);
            out.extend_from_slice(&extra);
        }
        let cd_size = out.len() as u32 - cd_offset;

        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.entries.len() as u16).unwrap();
        out.write_u32::<LittleEndian>(cd_size).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(self.comment.len() as u16).unwrap();
        out.extend_from_slice(&self.comment);
        out
    }
}

/// A member served by [`MockCodec`].
#[derive(Debug, Clone)]
pub struct MockMember {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub data: Vec<u8>,
}

impl MockMember {
    /// A file that reports `size` bytes but carries no content.
    pub fn file(name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            size,
            is_dir: false,
            data: Vec::new(),
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 0,
            is_dir: true,
            data: Vec::new(),
        }
    }
}

/// Codec serving a fixed member list and counting how it is used.
#[derive(Debug, Default)]
pub struct MockCodec {
    members: Vec<MockMember>,
    create_size: usize,
    fail_create: bool,
    walks: AtomicUsize,
    visited: AtomicUsize,
}

impl MockCodec {
    pub fn new(members: Vec<MockMember>) -> Self {
        Self {
            members,
            ..Self::default()
        }
    }

    /// Make `create` produce an archive of exactly `size` bytes.
    pub fn creating(mut self, size: usize) -> Self {
        self.create_size = size;
        self
    }

    /// Make `create` leave a partial archive behind and fail.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn walks(&self) -> usize {
        self.walks.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> usize {
        self.visited.load(Ordering::SeqCst)
    }
}

impl ArchiveCodec for MockCodec {
    fn walk(&self, _archive: &Path, visitor: &mut Visitor<'_>) -> Result<()> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        for member in &self.members {
            self.visited.fetch_add(1, Ordering::SeqCst);
            let mut content: &[u8] = &member.data;
            visitor(ArchiveMember {
                name: member.name.clone(),
                header: MemberHeader::Unknown,
                is_dir: member.is_dir,
                size: member.size,
                mode: 0o644,
                modified: UNIX_EPOCH,
                content: &mut content,
            })?;
        }
        Ok(())
    }

    fn create(&self, output: &Path, _base: &Path, _sources: &[PathBuf]) -> Result<()> {
        if self.fail_create {
            std::fs::write(output, b"partial")?;
            return Err(Error::Corrupt(anyhow::anyhow!("injected create failure")));
        }
        std::fs::write(output, vec![0u8; self.create_size])?;
        Ok(())
    }
}

/// Writer that fails at a chosen step and otherwise writes to disk.
#[derive(Debug, Clone, Copy)]
pub struct FailingWriter {
    on_write: bool,
    on_chtimes: bool,
}

impl FailingWriter {
    pub fn on_write() -> Self {
        Self {
            on_write: true,
            on_chtimes: false,
        }
    }

    pub fn on_chtimes() -> Self {
        Self {
            on_write: false,
            on_chtimes: true,
        }
    }
}

impl FileWriter for FailingWriter {
    fn write(&self, path: &Path, content: &mut dyn Read) -> io::Result<u64> {
        if self.on_write {
            return Err(io::Error::other("injected write failure"));
        }
        LocalFileWriter.write(path, content)
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        LocalFileWriter.chmod(path, mode)
    }

    fn chtimes(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> io::Result<()> {
        if self.on_chtimes {
            return Err(io::Error::other("injected chtimes failure"));
        }
        LocalFileWriter.chtimes(path, accessed, modified)
    }
}
