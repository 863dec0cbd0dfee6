//! Sandbox configuration.
//!
//! ```toml
//! root = "/var/lib/sandbox/srv-1"
//! disk_limit = 1073741824
//! denylist = ["config.yml", "/logs/*.log"]
//! check_space_before_decompress = true
//! compression_level = 6
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Result;

const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Directory no resolved path may escape.
    pub root: PathBuf,

    /// Maximum disk usage in bytes; zero or negative means unlimited.
    pub disk_limit: i64,

    /// Gitignore-style patterns for paths decompression must never touch.
    pub denylist: Vec<String>,

    /// Run the quota pre-flight before every decompression.
    pub check_space_before_decompress: bool,

    /// Gzip level used for created archives (0-9).
    pub compression_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            disk_limit: 0,
            denylist: Vec::new(),
            check_space_before_decompress: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Config {
    /// Config rooted at `root` with every other setting at its default.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn with_disk_limit(mut self, limit: i64) -> Self {
        self.disk_limit = limit;
        self
    }

    pub fn with_denylist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denylist = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn gzip_level(&self) -> u32 {
        self.compression_level.min(9)
    }
}
