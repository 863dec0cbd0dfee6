use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::filesystem::Filesystem;

/// An archive produced by [`Filesystem::compress_files`].
#[derive(Debug)]
pub struct CompressedArchive {
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// `archive-<RFC3339 timestamp without colons>.tar.gz`, to the second.
pub fn archive_file_name(now: OffsetDateTime) -> Result<String> {
    let stamp = now
        .replace_nanosecond(0)
        .map_err(io::Error::other)?
        .format(&Rfc3339)
        .map_err(io::Error::other)?;
    Ok(format!("archive-{}.tar.gz", stamp.replace(':', "")))
}

impl Filesystem {
    /// Compress an allow-list of paths inside `dir` into a new archive
    /// placed in `dir`.
    ///
    /// Every path is validated before anything is written. The archive size
    /// counts against the quota once created; if it does not fit, the
    /// archive is removed again and [`Error::QuotaExceeded`] is returned.
    pub async fn compress_files<P: AsRef<Path>>(
        &self,
        dir: impl AsRef<Path>,
        paths: &[P],
    ) -> Result<CompressedArchive> {
        let dir = dir.as_ref().to_path_buf();
        let base = self.blocking(move |fs| fs.safe_path(&dir)).await?;
        if !tokio::fs::metadata(&base).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::NotFound { path: base });
        }

        let sources = self.parallel_safe_path(&base, paths).await?;

        let output = base.join(archive_file_name(OffsetDateTime::now_utc())?);
        let created = {
            let output = output.clone();
            self.blocking(move |fs| fs.codec.create(&output, &base, &sources))
                .await
        };
        if let Err(e) = created {
            remove_archive(&output).await;
            return Err(e);
        }

        let metadata = match tokio::fs::metadata(&output).await {
            Ok(metadata) => metadata,
            Err(e) => {
                remove_archive(&output).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.quota.has_space_for(metadata.len()) {
            warn!(
                archive = %output.display(),
                size = metadata.len(),
                "archive does not fit in the disk limit, removing it"
            );
            remove_archive(&output).await;
            return Err(e);
        }

        self.quota.record_delta(i64::try_from(metadata.len()).unwrap_or(i64::MAX));
        info!(archive = %output.display(), size = metadata.len(), "created archive");

        Ok(CompressedArchive {
            path: output,
            metadata,
        })
    }
}

async fn remove_archive(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(archive = %path.display(), error = %e, "failed to remove archive");
        }
    }
}
