//! Sysroot VFS wrapper (§4.2): transparent remapping of filesystem calls
//! under an optional sysroot prefix, with symlink canonicalization bounded
//! by `MAXSYMLINKS`. Grounded in `original_source/src/ld-libs.c`'s
//! `find_lib_in_path`, which performs the equivalent `access()`/open-class
//! probing this module centralizes.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Default bound on symlink-resolution hops, matching glibc's `MAXSYMLINKS`.
pub const MAXSYMLINKS: u32 = 20;

/// A thin filesystem interposer. When `root` is `Some`, every path passed
/// in is treated as chroot-relative: symlinks are resolved as if rooted at
/// `root`, and a `..` that would escape it is clamped instead of followed.
#[derive(Debug, Clone)]
pub struct Sysroot {
    root: Option<PathBuf>,
}

impl Sysroot {
    pub fn new(root: Option<PathBuf>) -> Self {
        Sysroot { root }
    }

    pub fn is_active(&self) -> bool {
        self.root.is_some()
    }

    /// Maps a logical (target) path to the real filesystem path backing it.
    /// With no sysroot configured this is the identity function.
    pub fn host_path(&self, logical: &Path) -> PathBuf {
        match &self.root {
            None => logical.to_path_buf(),
            Some(root) => {
                let canon_logical = canonicalize_components(logical);
                join_under_root(root, &canon_logical)
            }
        }
    }

    /// Returns `true` if `host_path(logical)` names an existing regular file,
    /// resolving at most `MAXSYMLINKS` levels of symlinks rooted at the
    /// sysroot.
    pub fn exists(&self, logical: &Path) -> bool {
        self.resolve_symlinks(logical).is_some()
    }

    /// Resolves symlinks (bounded by `MAXSYMLINKS`) and returns the final
    /// host-filesystem path if it exists, or `None` if it doesn't or the
    /// hop limit was exceeded.
    pub fn resolve_symlinks(&self, logical: &Path) -> Option<PathBuf> {
        let mut current = self.host_path(logical);
        for _ in 0..MAXSYMLINKS {
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    let target = fs::read_link(&current).ok()?;
                    current = if target.is_absolute() {
                        match &self.root {
                            Some(root) => join_under_root(root, &canonicalize_components(&target)),
                            None => target,
                        }
                    } else {
                        current.parent().unwrap_or(Path::new("/")).join(target)
                    };
                }
                Ok(_) => return Some(current),
                Err(_) => return None,
            }
        }
        None
    }
}

/// Walks path components, collapsing `.` and clamping `..` at the root
/// (never produces a component that climbs above the logical root).
fn canonicalize_components(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn join_under_root(root: &Path, logical: &Path) -> PathBuf {
    let mut joined = root.to_path_buf();
    for comp in logical.components() {
        match comp {
            Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if joined != *root {
                    joined.pop();
                }
            }
            Component::CurDir => {}
            Component::Normal(part) => joined.push(part),
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_with_no_root() {
        let s = Sysroot::new(None);
        assert_eq!(s.host_path(Path::new("/lib/libc.so.6")), PathBuf::from("/lib/libc.so.6"));
    }

    #[test]
    fn joins_under_configured_root() {
        let s = Sysroot::new(Some(PathBuf::from("/srv/target")));
        assert_eq!(
            s.host_path(Path::new("/lib/libc.so.6")),
            PathBuf::from("/srv/target/lib/libc.so.6")
        );
    }

    #[test]
    fn parent_dir_does_not_escape_root() {
        let s = Sysroot::new(Some(PathBuf::from("/srv/target")));
        assert_eq!(
            s.host_path(Path::new("/../../etc/passwd")),
            PathBuf::from("/srv/target/etc/passwd")
        );
    }
}
