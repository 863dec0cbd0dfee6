use std::path::{Path, PathBuf};

/// Errors raised by the archive engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A path would resolve outside of the sandbox root.
    #[error("path {} resolves outside of the sandbox root", .path.display())]
    Containment { path: PathBuf },

    /// The operation would push disk usage over the configured limit.
    #[error("not enough disk space: {required} bytes required, {available} bytes available")]
    QuotaExceeded { required: u64, available: u64 },

    /// None of the supported codecs recognize the archive.
    #[error("unrecognized archive format: {}", .path.display())]
    UnknownArchive { path: PathBuf },

    /// A required file or directory does not exist.
    #[error("{} does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to write {}", .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set permissions on {}", .path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set timestamps on {}", .path.display())]
    Timestamp {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure while processing the given archive.
    #[error("archive {}: {source}", .archive.display())]
    Archive {
        archive: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Structurally invalid archive data.
    #[error("corrupt archive: {0}")]
    Corrupt(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid ignore pattern: {0}")]
    Ignore(#[from] ignore::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn containment(path: impl AsRef<Path>) -> Self {
        Error::Containment {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Classify a failure while writing `path`.
    ///
    /// Content that fails its archive's integrity checks surfaces through the
    /// writer's I/O error, but is reported as [`Error::Corrupt`].
    pub(crate) fn file_write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        if source
            .get_ref()
            .is_some_and(|e| e.is::<crate::zip::EntryIntegrityError>())
        {
            return Error::Corrupt(anyhow::Error::new(source));
        }
        Error::FileWrite {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wrap an error with the identity of the archive it came from.
    pub(crate) fn in_archive(self, archive: impl AsRef<Path>) -> Self {
        Error::Archive {
            archive: archive.as_ref().to_path_buf(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through archive wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Archive { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_containment(&self) -> bool {
        matches!(self.root_cause(), Error::Containment { .. })
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self.root_cause(), Error::QuotaExceeded { .. })
    }

    pub fn is_unknown_archive(&self) -> bool {
        matches!(self.root_cause(), Error::UnknownArchive { .. })
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self.root_cause(), Error::Corrupt(_))
    }
}
