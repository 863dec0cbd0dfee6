use filetime::FileTime;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::time::SystemTime;

/// Writes extracted files to their final, already validated location.
pub trait FileWriter: Send + Sync {
    /// Create or truncate `path`, creating parents as needed, and copy
    /// `content` into it. Returns the number of bytes written.
    fn write(&self, path: &Path, content: &mut dyn Read) -> io::Result<u64>;

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn chtimes(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileWriter;

impl FileWriter for LocalFileWriter {
    fn write(&self, path: &Path, content: &mut dyn Read) -> io::Result<u64> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // The path was resolved beforehand; a link appearing there since
        // would redirect the write.
        if fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to write through symlink {}", path.display()),
            ));
        }

        let mut file = BufWriter::new(File::create(path)?);
        let written = io::copy(content, &mut file)?;
        file.flush()?;
        Ok(written)
    }

    #[cfg(unix)]
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
    }

    #[cfg(not(unix))]
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_readonly(mode & 0o222 == 0);
        fs::set_permissions(path, permissions)
    }

    fn chtimes(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> io::Result<()> {
        filetime::set_file_times(
            path,
            FileTime::from_system_time(accessed),
            FileTime::from_system_time(modified),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn writes_with_parents_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");

        let written = LocalFileWriter.write(&path, &mut &b"content"[..]).unwrap();
        assert_eq!(written, 7);
        assert_eq!(fs::read(&path).unwrap(), b"content");

        let mtime = UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        LocalFileWriter.chtimes(&path, mtime, mtime).unwrap();
        let meta = fs::metadata(&path).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_500_000_000);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            LocalFileWriter.chmod(&path, 0o100640).unwrap();
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o7777, 0o640);
        }
    }

    #[test]
    fn truncates_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"a much longer original").unwrap();

        LocalFileWriter.write(&path, &mut &b"short"[..]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"short");
    }

    #[cfg(unix)]
    #[test]
    fn does_not_write_through_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(outside.path().join("target"), &link).unwrap();

        let err = LocalFileWriter.write(&link, &mut &b"data"[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!outside.path().join("target").exists());
    }
}
