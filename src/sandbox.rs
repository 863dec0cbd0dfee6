//! Path containment for everything that touches the sandbox root.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Dangling symlinks followed before a path is given up on.
const MAX_SYMLINK_HOPS: usize = 40;

/// Resolves untrusted relative paths against a root directory.
pub trait PathResolver: Send + Sync {
    /// Canonical absolute location of `relative` under `root`, or
    /// [`Error::Containment`] when it would land outside of `root`.
    ///
    /// The target does not need to exist.
    fn resolve(&self, root: &Path, relative: &Path) -> Result<PathBuf>;
}

/// Lexically normalizes an untrusted path into a relative one.
///
/// Root and prefix components are dropped so absolute inputs are treated as
/// relative to the sandbox, `.` is removed and `..` pops the previous
/// component. Returns `None` when a `..` would climb above the start.
pub fn clean_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Resolver backed by the real filesystem.
///
/// After lexical cleaning, the deepest existing ancestor of the target is
/// canonicalized so symlinks pointing out of the root are caught as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct SafePathResolver;

impl PathResolver for SafePathResolver {
    fn resolve(&self, root: &Path, relative: &Path) -> Result<PathBuf> {
        let root = root.canonicalize()?;
        let cleaned = clean_relative(relative).ok_or_else(|| Error::containment(relative))?;

        let mut existing = root.join(&cleaned);
        let mut missing = Vec::new();
        let mut hops = 0;
        let canonical = loop {
            match existing.canonicalize() {
                Ok(path) => break path,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // A dangling symlink is followed lexically to its target,
                    // which then has to pass the same containment check.
                    if existing.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(Error::containment(relative));
                        }
                        let target = existing.read_link()?;
                        existing = match existing.parent() {
                            Some(parent) => parent.join(target),
                            None => target,
                        };
                        continue;
                    }
                    let Some(name) = existing.file_name().map(ToOwned::to_owned) else {
                        return Err(Error::containment(relative));
                    };
                    missing.push(name);
                    if !existing.pop() {
                        return Err(Error::containment(relative));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        let mut resolved = canonical;
        for name in missing.into_iter().rev() {
            resolved.push(name);
        }

        if !resolved.starts_with(&root) {
            return Err(Error::containment(relative));
        }
        Ok(resolved)
    }
}
