//! # sandbox-archive
//!
//! Archive compression and extraction confined to a sandbox directory.
//!
//! Every path an operation touches is resolved against the sandbox root
//! first, so archive members such as `../../etc/passwd` or symlinks pointing
//! outside the root are rejected before anything is written. Disk usage is
//! tracked against an optional limit: extraction can be checked up front,
//! and created archives are removed again if they do not fit.
//!
//! ## Features
//!
//! - Extract ZIP, tar, tar.gz and single-file gzip archives, detected by content
//! - Create `.tar.gz` archives from an allow-list of paths
//! - Decode legacy GBK member names from archives made on Chinese Windows systems
//! - Gitignore-style deny list of paths extraction must leave alone
//! - Preserve permissions and modification times of extracted files
//!
//! ## Example
//!
//! ```no_run
//! use sandbox_archive::{Config, Filesystem};
//!
//! #[tokio::main]
//! async fn main() -> sandbox_archive::Result<()> {
//!     let config = Config::new("/var/lib/sandbox/srv-1")
//!         .with_disk_limit(1 << 30)
//!         .with_denylist(["config.yml"]);
//!     let fs = Filesystem::new(config)?;
//!
//!     let archive = fs.compress_files("world", &["region", "level.dat"]).await?;
//!     println!("created {}", archive.path.display());
//!
//!     fs.space_available_for_decompression("uploads", "plugins.zip").await?;
//!     fs.decompress_file("uploads", "plugins.zip").await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod compress;
pub mod config;
pub mod decompress;
pub mod denylist;
pub mod error;
pub mod filesystem;
pub mod io;
pub mod name;
pub mod quota;
pub mod sandbox;
pub mod writer;
pub mod zip;

#[cfg(test)]
mod test_utils;

pub use codec::{ArchiveCodec, ArchiveMember, MemberHeader, StandardCodec};
pub use compress::CompressedArchive;
pub use config::Config;
pub use decompress::ArchiveEntry;
pub use denylist::{DenyList, IgnoreMatcher};
pub use error::{Error, Result};
pub use filesystem::Filesystem;
pub use io::{LocalFileReader, ReadAt};
pub use quota::{DiskQuota, QuotaTracker};
pub use sandbox::{PathResolver, SafePathResolver};
pub use writer::{FileWriter, LocalFileWriter};
pub use zip::{ZipFileEntry, ZipParser};
