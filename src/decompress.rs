use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::codec::ArchiveMember;
use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::name::extract_name;
use crate::quota::{QuotaBudget, check_decompression_space};

/// Summary of one archive member, as it would be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Resolved name, relative to the extraction directory.
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub mode: u32,
    pub modified: SystemTime,
}

/// Join an archive member name onto `dir`, treating absolute names as
/// relative to it.
fn member_path(dir: &Path, name: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {}
            other => path.push(other),
        }
    }
    path
}

impl Filesystem {
    /// Check that extracting `dir/file` would stay within the disk limit.
    ///
    /// Returns immediately when there is no limit. Otherwise the archive's
    /// members are summed and the walk stops at the first one that does not
    /// fit.
    pub async fn space_available_for_decompression(
        &self,
        dir: impl AsRef<Path>,
        file: impl AsRef<Path>,
    ) -> Result<()> {
        if self.quota.max_allowed() <= 0 {
            return Ok(());
        }
        let relative = dir.as_ref().join(file.as_ref());
        self.blocking(move |fs| {
            let source = fs.existing_archive(&relative)?;
            fs.check_space(&source)
        })
        .await
    }

    /// Extract every member of the archive at `dir/file` into `dir`.
    ///
    /// Directories are not created up front; files create their parents.
    /// Members matching the ignore rules are skipped without touching the
    /// filesystem. Any failure stops extraction and is reported with the
    /// archive path attached, except for unrecognized archives which are
    /// reported as [`Error::UnknownArchive`].
    pub async fn decompress_file(
        &self,
        dir: impl AsRef<Path>,
        file: impl AsRef<Path>,
    ) -> Result<()> {
        let dir = dir.as_ref().to_path_buf();
        let file = file.as_ref().to_path_buf();
        self.blocking(move |fs| fs.decompress_blocking(&dir, &file))
            .await
    }

    /// List what extracting `dir/file` would produce, without writing.
    pub async fn archive_entries(
        &self,
        dir: impl AsRef<Path>,
        file: impl AsRef<Path>,
    ) -> Result<Vec<ArchiveEntry>> {
        let relative = dir.as_ref().join(file.as_ref());
        self.blocking(move |fs| {
            let source = fs.existing_archive(&relative)?;
            let mut entries = Vec::new();
            fs.codec.walk(&source, &mut |member| {
                entries.push(ArchiveEntry {
                    name: extract_name(&member),
                    size: member.size,
                    is_dir: member.is_dir,
                    mode: member.mode,
                    modified: member.modified,
                });
                Ok(())
            })?;
            Ok(entries)
        })
        .await
    }

    fn existing_archive(&self, relative: &Path) -> Result<PathBuf> {
        let source = self.safe_path(relative)?;
        match std::fs::metadata(&source) {
            Ok(meta) if meta.is_file() => Ok(source),
            Ok(_) => Err(Error::UnknownArchive { path: source }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound { path: source }),
            Err(e) => Err(e.into()),
        }
    }

    fn check_space(&self, source: &Path) -> Result<()> {
        let budget = QuotaBudget::from_tracker(&*self.quota);
        check_decompression_space(&*self.codec, source, &budget)
    }

    fn decompress_blocking(&self, dir: &Path, file: &Path) -> Result<()> {
        let source = self.existing_archive(&dir.join(file))?;
        if self.config.check_space_before_decompress {
            self.check_space(&source)?;
        }

        let mut delta = 0i64;
        let mut extracted = 0usize;
        self.codec.walk(&source, &mut |member| {
            if member.is_dir {
                return Ok(());
            }
            let relative = member_path(dir, &extract_name(&member));
            if self.ignore.is_ignored(&relative) {
                debug!(member = %relative.display(), "skipping ignored archive member");
                return Ok(());
            }
            delta += self
                .extract_member(&relative, member)
                .map_err(|e| e.in_archive(&source))?;
            extracted += 1;
            Ok(())
        })?;

        if delta != 0 {
            self.quota.record_delta(delta);
        }
        info!(archive = %source.display(), files = extracted, "decompressed archive");
        Ok(())
    }

    /// Write one member and return the change in disk usage.
    fn extract_member(&self, relative: &Path, member: ArchiveMember<'_>) -> Result<i64> {
        let path = self.safe_path(relative)?;
        let previous = std::fs::symlink_metadata(&path)
            .map(|m| if m.is_file() { m.len() } else { 0 })
            .unwrap_or(0);

        let written = self
            .writer
            .write(&path, member.content)
            .map_err(|source| Error::file_write(&path, source))?;
        self.writer
            .chmod(&path, member.mode)
            .map_err(|source| Error::Permission {
                path: path.clone(),
                source,
            })?;
        self.writer
            .chtimes(&path, member.modified, member.modified)
            .map_err(|source| Error::Timestamp {
                path: path.clone(),
                source,
            })?;

        debug!(member = %relative.display(), size = written, "extracted archive member");
        let written = i64::try_from(written).unwrap_or(i64::MAX);
        let previous = i64::try_from(previous).unwrap_or(i64::MAX);
        Ok(written.saturating_sub(previous))
    }
}
