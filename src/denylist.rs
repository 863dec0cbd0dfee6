use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

use crate::error::Result;
use crate::sandbox::clean_relative;

/// Decides whether a sandbox-relative path must be left untouched.
pub trait IgnoreMatcher: Send + Sync {
    fn is_ignored(&self, path: &Path) -> bool;
}

/// Gitignore-style deny list.
pub struct DenyList {
    matcher: Gitignore,
}

impl DenyList {
    pub fn new<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder.add_line(None, pattern.as_ref())?;
        }
        Ok(Self {
            matcher: builder.build()?,
        })
    }

    pub fn empty() -> Self {
        Self {
            matcher: Gitignore::empty(),
        }
    }
}

impl IgnoreMatcher for DenyList {
    fn is_ignored(&self, path: &Path) -> bool {
        if self.matcher.is_empty() {
            return false;
        }
        // Paths that climb out of the root are rejected later by the resolver.
        let Some(cleaned) = clean_relative(path) else {
            return false;
        };
        if cleaned.as_os_str().is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(&cleaned, false)
            .is_ignore()
    }
}
