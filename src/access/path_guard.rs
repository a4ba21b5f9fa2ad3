//! Sandbox containment: resolves a requested path to its canonical location and
//! refuses anything that does not live under the canonical root.
//!
//! Resolution follows symlinks segment by segment *before* the containment
//! check, so a link whose literal path is inside the root but whose target is
//! outside is rejected. Trailing segments that do not exist are kept lexically,
//! which lets callers ask about paths that are about to be reported as missing.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::AccessError;

/// Upper bound on symlinks followed while resolving one path (matches Linux MAXSYMLINKS).
const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Canonical form of the configured root. Re-evaluated on every call so a
    /// root that disappears mid-session is reported as a configuration problem.
    pub fn canonical_root(&self) -> Result<PathBuf, AccessError> {
        std::fs::canonicalize(&self.root).map_err(|source| AccessError::Config {
            root: self.root.clone(),
            source,
        })
    }

    /// Resolve a caller-supplied path. Relative paths are anchored at the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, AccessError> {
        let root = self.canonical_root()?;
        Self::resolve_within(&root, Path::new(requested)).ok_or_else(|| {
            tracing::warn!(requested, "Rejected path outside sandbox root");
            AccessError::OutsideRoot(requested.to_string())
        })
    }

    /// Resolve `requested` against an already canonical `root`.
    ///
    /// Returns `None` when the resolved location is outside `root` or when
    /// resolution itself fails (symlink loop, unreadable link), since
    /// containment cannot be proven in either case.
    pub fn resolve_within(root: &Path, requested: &Path) -> Option<PathBuf> {
        let absolute = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };

        let resolved = resolve_symlinks(&absolute).ok()?;
        is_contained(root, &resolved).then_some(resolved)
    }
}

/// Segment-wise containment: `/a/b` contains `/a/b` and `/a/b/c`, never `/a/bc`.
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

enum Segment {
    Root(PathBuf),
    Parent,
    Name(OsString),
}

fn segments(path: &Path) -> Vec<Segment> {
    path.components()
        .filter_map(|c| match c {
            Component::Prefix(_) | Component::RootDir => {
                Some(Segment::Root(PathBuf::from(c.as_os_str())))
            }
            Component::CurDir => None,
            Component::ParentDir => Some(Segment::Parent),
            Component::Normal(name) => Some(Segment::Name(name.to_os_string())),
        })
        .collect()
}

/// Canonicalize an absolute path without requiring it to exist.
///
/// `resolved` is symlink-free at every step, so `..` can be applied by
/// popping a segment.
fn resolve_symlinks(path: &Path) -> io::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    let mut pending: VecDeque<Segment> = segments(path).into();
    let mut hops = 0usize;

    while let Some(segment) = pending.pop_front() {
        match segment {
            Segment::Root(root) => resolved.push(root),
            Segment::Parent => {
                resolved.pop();
            }
            Segment::Name(name) => {
                let candidate = resolved.join(&name);
                match std::fs::symlink_metadata(&candidate) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(io::Error::other("too many levels of symbolic links"));
                        }
                        let target = std::fs::read_link(&candidate)?;
                        if target.is_absolute() {
                            resolved = PathBuf::new();
                        }
                        for seg in segments(&target).into_iter().rev() {
                            pending.push_front(seg);
                        }
                    }
                    // Existing non-link entries and missing tails are taken as-is.
                    _ => resolved = candidate,
                }
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, PathGuard, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        let guard = PathGuard::new(&root);
        (temp, guard, root)
    }

    #[test]
    fn test_root_itself_is_allowed() {
        let (_temp, guard, root) = sandbox();
        assert_eq!(guard.resolve(".").unwrap(), root);
        assert_eq!(guard.resolve(root.to_str().unwrap()).unwrap(), root);
    }

    #[test]
    fn test_relative_paths_anchor_at_root() {
        let (_temp, guard, root) = sandbox();
        assert_eq!(guard.resolve("a.txt").unwrap(), root.join("a.txt"));
        assert_eq!(guard.resolve("sub/../a.txt").unwrap(), root.join("a.txt"));
        assert_eq!(guard.resolve("./sub/./").unwrap(), root.join("sub"));
    }

    #[test]
    fn test_missing_paths_still_resolve() {
        let (_temp, guard, root) = sandbox();
        assert_eq!(
            guard.resolve("missing/deeper/file.rs").unwrap(),
            root.join("missing/deeper/file.rs")
        );
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_temp, guard, _root) = sandbox();
        for requested in ["..", "../etc/passwd", "sub/../../x", "missing/../../x"] {
            let err = guard.resolve(requested).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::OutsideRoot, "{}", requested);
        }
    }

    #[test]
    fn test_absolute_path_outside_is_rejected() {
        let (_temp, guard, _root) = sandbox();
        let other = TempDir::new().unwrap();
        let outside = other.path().join("file.txt");
        std::fs::write(&outside, "secret").unwrap();

        let err = guard.resolve(outside.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AccessError::OutsideRoot(_)));
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_rejected() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().canonicalize().unwrap();
        std::fs::create_dir_all(base.join("a/b")).unwrap();
        std::fs::create_dir_all(base.join("a/bc")).unwrap();
        std::fs::write(base.join("a/bc/file.txt"), "x").unwrap();

        let guard = PathGuard::new(base.join("a/b"));
        let sibling = base.join("a/bc/file.txt");
        assert!(guard.resolve(sibling.to_str().unwrap()).is_err());
        assert!(!is_contained(&base.join("a/b"), &base.join("a/bc")));
        assert!(is_contained(&base.join("a/b"), &base.join("a/b")));
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let temp = TempDir::new().unwrap();
        let guard = PathGuard::new(temp.path().join("does-not-exist"));
        let err = guard.resolve("a.txt").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        use std::os::unix::fs::symlink;

        let (_temp, guard, root) = sandbox();
        let other = TempDir::new().unwrap();
        std::fs::write(other.path().join("secret.txt"), "top secret").unwrap();

        symlink(other.path(), root.join("escape")).unwrap();
        symlink(other.path().join("secret.txt"), root.join("notes.txt")).unwrap();

        assert!(guard.resolve("escape/secret.txt").is_err());
        assert!(guard.resolve("notes.txt").is_err());
        // A link that points somewhere missing outside the root is just as bad.
        symlink("/nonexistent-peek-target/x", root.join("dangling")).unwrap();
        assert!(guard.resolve("dangling").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_resolves_to_target() {
        use std::os::unix::fs::symlink;

        let (_temp, guard, root) = sandbox();
        symlink("sub", root.join("alias")).unwrap();
        symlink("../a.txt", root.join("sub/up")).unwrap();

        assert_eq!(guard.resolve("alias").unwrap(), root.join("sub"));
        assert_eq!(guard.resolve("alias/up").unwrap(), root.join("a.txt"));
        // `..` applies to the link target, not the literal path.
        assert_eq!(guard.resolve("alias/../a.txt").unwrap(), root.join("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_rejected() {
        use std::os::unix::fs::symlink;

        let (_temp, guard, root) = sandbox();
        symlink(root.join("loop_b"), root.join("loop_a")).unwrap();
        symlink(root.join("loop_a"), root.join("loop_b")).unwrap();

        let err = guard.resolve("loop_a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutsideRoot);
    }
}
