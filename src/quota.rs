//! Disk quota tracking and the decompression pre-flight.

use ignore::WalkBuilder;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};

use crate::codec::ArchiveCodec;
use crate::error::{Error, Result};

/// Tracks how much of the sandbox's disk allowance is in use.
pub trait QuotaTracker: Send + Sync {
    /// Bytes currently in use.
    fn current_usage(&self) -> i64;

    /// Maximum allowed bytes; zero or negative means unlimited.
    fn max_allowed(&self) -> i64;

    /// Record bytes added (positive) or removed (negative).
    fn record_delta(&self, delta: i64);

    /// Fails with [`Error::QuotaExceeded`] when `size` more bytes would not fit.
    fn has_space_for(&self, size: u64) -> Result<()> {
        let limit = self.max_allowed();
        if limit <= 0 {
            return Ok(());
        }
        let usage = self.current_usage();
        let required = usage.saturating_add(i64::try_from(size).unwrap_or(i64::MAX));
        if required > limit {
            return Err(Error::QuotaExceeded {
                required: required.max(0) as u64,
                available: (limit - usage).max(0) as u64,
            });
        }
        Ok(())
    }
}

/// In-process quota tracker backed by atomic counters.
#[derive(Debug, Default)]
pub struct DiskQuota {
    usage: AtomicI64,
    limit: AtomicI64,
}

impl DiskQuota {
    pub fn new(limit: i64) -> Self {
        Self {
            usage: AtomicI64::new(0),
            limit: AtomicI64::new(limit),
        }
    }

    pub fn set_limit(&self, limit: i64) {
        self.limit.store(limit, Ordering::SeqCst);
    }

    pub fn set_usage(&self, usage: i64) {
        self.usage.store(usage, Ordering::SeqCst);
    }

    /// Walk `root` and replace the tracked usage with the summed file sizes.
    ///
    /// Symlinks are not followed and unreadable entries are skipped.
    pub fn recalculate(&self, root: &Path) -> i64 {
        let mut total = 0i64;
        for entry in WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .build()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry during disk usage walk");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => {
                    total = total.saturating_add(i64::try_from(meta.len()).unwrap_or(i64::MAX))
                }
                Err(e) => warn!(path = %entry.path().display(), error = %e, "cannot stat file"),
            }
        }
        debug!(root = %root.display(), usage = total, "recalculated disk usage");
        self.set_usage(total);
        total
    }
}

impl QuotaTracker for DiskQuota {
    fn current_usage(&self) -> i64 {
        self.usage.load(Ordering::SeqCst)
    }

    fn max_allowed(&self) -> i64 {
        self.limit.load(Ordering::SeqCst)
    }

    fn record_delta(&self, delta: i64) {
        self.usage.fetch_add(delta, Ordering::SeqCst);
    }
}

/// Snapshot of a tracker plus the running projection of a pre-flight walk.
#[derive(Debug)]
pub struct QuotaBudget {
    usage: i64,
    limit: i64,
    projected: AtomicI64,
}

impl QuotaBudget {
    pub fn new(usage: i64, limit: i64) -> Self {
        Self {
            usage,
            limit,
            projected: AtomicI64::new(0),
        }
    }

    pub fn from_tracker(tracker: &dyn QuotaTracker) -> Self {
        Self::new(tracker.current_usage(), tracker.max_allowed())
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit <= 0
    }

    /// Bytes accumulated so far.
    pub fn projected(&self) -> i64 {
        self.projected.load(Ordering::SeqCst)
    }

    /// Add `size` to the projection, failing once usage would pass the limit.
    pub fn add(&self, size: u64) -> Result<()> {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        let projected = self
            .projected
            .fetch_add(size, Ordering::SeqCst)
            .saturating_add(size);
        if self.is_unlimited() {
            return Ok(());
        }
        let required = projected.saturating_add(self.usage);
        if required > self.limit {
            return Err(Error::QuotaExceeded {
                required: required.max(0) as u64,
                available: (self.limit - self.usage).max(0) as u64,
            });
        }
        Ok(())
    }
}

/// Decide whether fully extracting `archive` fits in `budget`.
///
/// Unlimited budgets return without opening the archive. Otherwise members
/// are summed in order and the walk stops at the first member that tips the
/// projection over the limit.
pub fn check_decompression_space(
    codec: &dyn ArchiveCodec,
    archive: &Path,
    budget: &QuotaBudget,
) -> Result<()> {
    if budget.is_unlimited() {
        return Ok(());
    }
    codec.walk(archive, &mut |member| budget.add(member.size))?;
    debug!(
        archive = %archive.display(),
        projected = budget.projected(),
        "archive fits in remaining disk space"
    );
    Ok(())
}
