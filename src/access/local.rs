//! Read-one and enumerate-by-glob over the sandbox root.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use super::content_search::DEFAULT_SEARCH_TIMEOUT;
use super::path_guard::PathGuard;
use super::sensitivity::is_sensitive;
use super::AccessError;

/// One glob hit, relative to the sandbox root with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileMatch {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct LocalFileAccess {
    guard: PathGuard,
    walk_timeout: Duration,
}

/// Flags the blocking walk to stop once the awaiting future is dropped.
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl LocalFileAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            guard: PathGuard::new(root),
            walk_timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    /// Wall-clock bound for one `enumerate` walk.
    pub fn with_walk_timeout(mut self, timeout: Duration) -> Self {
        self.walk_timeout = timeout;
        self
    }

    /// Read a whole file as UTF-8 text.
    ///
    /// Order of checks: containment, existence, sensitivity, decoding. The
    /// sensitivity check looks at both the requested name and the resolved
    /// target so a harmless-looking link to `.env` is still blocked.
    pub async fn read_one(&self, file_path: &str) -> Result<String, AccessError> {
        let resolved = self.guard.resolve(file_path)?;

        let meta = match tokio::fs::metadata(&resolved).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(AccessError::PermissionDenied(file_path.to_string()))
            }
            Err(_) => return Err(AccessError::NotFound(file_path.to_string())),
        };
        if !meta.is_file() {
            return Err(AccessError::NotFound(file_path.to_string()));
        }

        if is_sensitive(Path::new(file_path)) || is_sensitive(&resolved) {
            tracing::info!(file_path, "Blocked read of sensitive file");
            return Err(AccessError::SensitiveBlocked(file_path.to_string()));
        }

        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|e| AccessError::from_io(file_path, e))?;

        String::from_utf8(bytes).map_err(|_| AccessError::NotText(file_path.to_string()))
    }

    /// Match a relative glob against the tree under `base` (a directory inside the root).
    ///
    /// Only regular files are returned, sensitive names are dropped, and the
    /// result is de-duplicated and sorted. An empty list is a valid answer.
    /// Symlinked directories are not descended into.
    pub async fn enumerate(&self, pattern: &str, base: &str) -> Result<Vec<FileMatch>, AccessError> {
        let walk = Walk {
            guard: self.guard.clone(),
            pattern: pattern.to_string(),
            base: base.to_string(),
            deadline: Instant::now() + self.walk_timeout,
            timeout: self.walk_timeout,
            aborted: Arc::new(AtomicBool::new(false)),
        };
        let _abort = AbortOnDrop(walk.aborted.clone());

        tokio::task::spawn_blocking(move || walk.run())
            .await
            .map_err(|e| AccessError::Io {
                path: pattern.to_string(),
                source: std::io::Error::other(e),
            })?
    }

    /// Resolve `base` to an existing directory inside the root.
    pub fn resolve_dir(&self, base: &str) -> Result<PathBuf, AccessError> {
        let dir = self.guard.resolve(base)?;
        if !dir.is_dir() {
            return Err(AccessError::DirectoryNotFound(base.to_string()));
        }
        Ok(dir)
    }
}

fn validate_pattern(pattern: &str) -> Result<glob::Pattern, AccessError> {
    if pattern.trim().is_empty() {
        return Err(AccessError::InvalidArgument(
            "glob pattern must not be empty".into(),
        ));
    }
    if Path::new(pattern).is_absolute() || pattern.starts_with('/') || pattern.starts_with('\\') {
        return Err(AccessError::InvalidArgument(format!(
            "glob pattern must be relative: {}",
            pattern
        )));
    }
    if pattern.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(AccessError::InvalidArgument(format!(
            "glob pattern must not contain '..': {}",
            pattern
        )));
    }
    glob::Pattern::new(pattern).map_err(|e| {
        AccessError::InvalidArgument(format!("invalid glob pattern '{}': {}", pattern, e.msg))
    })
}

/// Deepest directory level a pattern can reach; `None` when `**` makes it unbounded.
fn max_depth(pattern: &str) -> Option<usize> {
    if pattern.contains("**") {
        None
    } else {
        Some(pattern.split('/').filter(|s| !s.is_empty()).count())
    }
}

/// One blocking `enumerate` run.
struct Walk {
    guard: PathGuard,
    pattern: String,
    base: String,
    deadline: Instant,
    timeout: Duration,
    aborted: Arc<AtomicBool>,
}

impl Walk {
    fn run(&self) -> Result<Vec<FileMatch>, AccessError> {
        let matcher = validate_pattern(&self.pattern)?;

        let root = self.guard.canonical_root()?;
        let base_dir = PathGuard::resolve_within(&root, Path::new(&self.base))
            .ok_or_else(|| AccessError::OutsideRoot(self.base.clone()))?;
        if !base_dir.is_dir() {
            return Err(AccessError::DirectoryNotFound(self.base.clone()));
        }

        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let mut walker = WalkDir::new(&base_dir).min_depth(1).follow_links(false);
        if let Some(depth) = max_depth(&self.pattern) {
            walker = walker.max_depth(depth);
        }

        let mut found = BTreeSet::new();
        for entry in walker {
            if self.aborted.load(Ordering::Relaxed) {
                return Err(AccessError::Io {
                    path: self.pattern.clone(),
                    source: std::io::ErrorKind::Interrupted.into(),
                });
            }
            if Instant::now() >= self.deadline {
                tracing::warn!(pattern = %self.pattern, "File enumeration timed out");
                return Err(AccessError::Timeout(self.timeout));
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&base_dir) else {
                continue;
            };
            if !matcher.matches_path_with(relative, options) {
                continue;
            }

            // A symlinked file may point anywhere; re-check its target.
            let path = entry.path();
            let Some(resolved) = PathGuard::resolve_within(&root, path) else {
                tracing::debug!(path = %path.display(), "Match resolves outside root");
                continue;
            };
            if !resolved.is_file() || is_sensitive(path) || is_sensitive(&resolved) {
                continue;
            }

            let shown = path.strip_prefix(&root).unwrap_or(path);
            found.insert(shown.to_string_lossy().replace('\\', "/"));
        }

        Ok(found.into_iter().map(|path| FileMatch { path }).collect())
    }
}
