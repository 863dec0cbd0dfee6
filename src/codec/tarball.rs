use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use ignore::WalkBuilder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tar::{Archive, Builder, EntryType, Header, HeaderMode};
use tracing::debug;

use super::{ArchiveMember, GzipHeader, MemberHeader, TarHeader, Visitor};
use crate::error::{Error, Result};

pub(super) fn walk_tar<R: Read>(reader: R, visitor: &mut Visitor<'_>) -> Result<()> {
    let mut archive = Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;

        let (kind, mode, mtime, size) = {
            let header = entry.header();
            (
                header.entry_type(),
                header.mode()?,
                header.mtime()?,
                entry.size(),
            )
        };
        let is_dir = kind.is_dir();
        if !is_dir && !matches!(kind, EntryType::Regular | EntryType::Continuous) {
            debug!(kind = ?kind, "skipping non-regular tar member");
            continue;
        }

        let name = entry.path_bytes().into_owned();
        let pax_path = has_pax_path(&mut entry)?;

        visitor(ArchiveMember {
            name: String::from_utf8_lossy(&name).into_owned(),
            header: MemberHeader::Tar(TarHeader { name, pax_path }),
            is_dir,
            size,
            mode: mode & 0o7777,
            modified: UNIX_EPOCH + Duration::from_secs(mtime),
            content: &mut entry,
        })?;
    }
    Ok(())
}

fn has_pax_path<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<bool> {
    let Some(extensions) = entry.pax_extensions()? else {
        return Ok(false);
    };
    for extension in extensions {
        if extension?.key() == Ok("path") {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(super) fn open_gzip(archive: &Path) -> Result<MultiGzDecoder<BufReader<File>>> {
    Ok(MultiGzDecoder::new(BufReader::new(File::open(archive)?)))
}

/// A bare gzip file is a single member, even when it holds several
/// concatenated gzip streams.
///
/// The trailer only records the length of the last stream, modulo 2^32, so
/// the size comes from decoding the whole file once before the visit.
pub(super) fn walk_gzip(archive: &Path, visitor: &mut Visitor<'_>) -> Result<()> {
    let size = io::copy(&mut open_gzip(archive)?, &mut io::sink())?;

    let mut decoder = open_gzip(archive)?;
    let (fname, mtime) = match decoder.header() {
        Some(header) => (header.filename().map(<[u8]>::to_vec), header.mtime()),
        None => (None, 0),
    };

    let fallback = archive
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = fname
        .as_deref()
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .unwrap_or(fallback);

    let modified = if mtime == 0 {
        fs::metadata(archive)?.modified()?
    } else {
        UNIX_EPOCH + Duration::from_secs(mtime as u64)
    };

    visitor(ArchiveMember {
        name,
        header: MemberHeader::Gzip(GzipHeader { name: fname }),
        is_dir: false,
        size,
        mode: 0o644,
        modified,
        content: &mut decoder,
    })
}

/// Write `sources` into a gzip-compressed tar at `output`.
///
/// Directories are walked recursively in name order. Symlinks are never
/// followed or stored, and `output` itself is skipped if it is reached.
pub(super) fn create_tar_gz(output: &Path, base: &Path, sources: &[PathBuf], level: u32) -> Result<()> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level));
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    for source in sources {
        let walker = WalkBuilder::new(source)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = entry?;
            let path = entry.path();
            if path == output {
                continue;
            }
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                debug!(path = %path.display(), "not archiving symlink");
                continue;
            }
            if !file_type.is_file() && !file_type.is_dir() {
                continue;
            }

            let name = path.strip_prefix(base).map_err(|_| Error::containment(path))?;
            if name.as_os_str().is_empty() {
                continue;
            }
            append_entry(&mut builder, path, name)?;
        }
    }

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

fn append_entry<W: Write>(builder: &mut Builder<W>, path: &Path, name: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&meta, HeaderMode::Complete);

    let mut archived = name.as_os_str().to_owned();
    if meta.is_dir() {
        archived.push("/");
    }
    let archived = PathBuf::from(archived);

    // Readers only treat names as UTF-8 when a PAX record says so.
    if let Some(utf8) = archived.to_str().filter(|s| !s.is_ascii()) {
        let utf8 = utf8.replace('\\', "/");
        builder.append_pax_extensions([("path", utf8.as_bytes())])?;
    }

    if meta.is_dir() {
        builder.append_data(&mut header, &archived, io::empty())?;
    } else {
        builder.append_data(&mut header, &archived, File::open(path)?)?;
    }
    Ok(())
}
