use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::codec::{ArchiveCodec, StandardCodec};
use crate::config::Config;
use crate::denylist::{DenyList, IgnoreMatcher};
use crate::error::{Error, Result};
use crate::quota::{DiskQuota, QuotaTracker};
use crate::sandbox::{PathResolver, SafePathResolver};
use crate::writer::{FileWriter, LocalFileWriter};

/// A sandboxed directory and the collaborators that guard it.
///
/// Cloning is cheap; clones share the same quota tracker.
#[derive(Clone)]
pub struct Filesystem {
    pub(crate) root: PathBuf,
    pub(crate) config: Arc<Config>,
    pub(crate) resolver: Arc<dyn PathResolver>,
    pub(crate) quota: Arc<dyn QuotaTracker>,
    pub(crate) writer: Arc<dyn FileWriter>,
    pub(crate) ignore: Arc<dyn IgnoreMatcher>,
    pub(crate) codec: Arc<dyn ArchiveCodec>,
}

impl Filesystem {
    /// Open the sandbox described by `config`.
    ///
    /// The root is created if missing, and the quota tracker starts from a
    /// walk of its current contents.
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.root)?;
        let root = config.root.canonicalize()?;

        let quota = DiskQuota::new(config.disk_limit);
        quota.recalculate(&root);

        let ignore = DenyList::new(&root, &config.denylist)?;
        let codec = StandardCodec::new(config.gzip_level());

        debug!(root = %root.display(), limit = config.disk_limit, "opened sandbox");
        Ok(Self {
            root,
            config: Arc::new(config),
            resolver: Arc::new(SafePathResolver),
            quota: Arc::new(quota),
            writer: Arc::new(LocalFileWriter),
            ignore: Arc::new(ignore),
            codec: Arc::new(codec),
        })
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_quota(mut self, quota: Arc<dyn QuotaTracker>) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn FileWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_ignore_matcher(mut self, ignore: Arc<dyn IgnoreMatcher>) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn ArchiveCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Canonical sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn quota(&self) -> &Arc<dyn QuotaTracker> {
        &self.quota
    }

    /// Resolve `relative` against the sandbox root.
    pub fn safe_path(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        self.resolver.resolve(&self.root, relative.as_ref())
    }

    /// Resolve every path under `base` concurrently, requiring each to exist.
    ///
    /// All paths are checked before returning. When several fail, the error
    /// for the earliest path in `paths` is returned whatever order the
    /// checks finished in.
    pub async fn parallel_safe_path<P: AsRef<Path>>(
        &self,
        base: &Path,
        paths: &[P],
    ) -> Result<Vec<PathBuf>> {
        let mut set = JoinSet::new();
        for (index, path) in paths.iter().enumerate() {
            let resolver = Arc::clone(&self.resolver);
            let base = base.to_path_buf();
            let path = path.as_ref().to_path_buf();
            set.spawn_blocking(move || (index, resolve_existing(&*resolver, &base, &path)));
        }

        let mut results: Vec<Option<Result<PathBuf>>> = (0..paths.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (index, result) = joined?;
            results[index] = Some(result);
        }
        results.into_iter().flatten().collect()
    }

    /// Run blocking filesystem work off the async runtime.
    pub(crate) async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Filesystem) -> Result<T> + Send + 'static,
    {
        let fs = self.clone();
        tokio::task::spawn_blocking(move || f(&fs)).await?
    }
}

fn resolve_existing(resolver: &dyn PathResolver, base: &Path, path: &Path) -> Result<PathBuf> {
    let resolved = resolver.resolve(base, path)?;
    match std::fs::symlink_metadata(&resolved) {
        Ok(_) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}
