//! Sandboxed local file access: path containment, sensitive-name filtering,
//! single-file reads, glob enumeration and external content search.

pub mod content_search;
pub mod local;
pub mod path_guard;
pub mod sensitivity;

pub use content_search::{ContentSearchRunner, SearchOutput};
pub use local::LocalFileAccess;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::error::ErrorKind;

/// Expected failures of the local access layer. `Display` output is what the
/// caller sees after the `Error: ` prefix, so it only echoes caller input.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Server root directory is not accessible")]
    Config {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Access denied - path is outside allowed directory: {0}")]
    OutsideRoot(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Cannot read sensitive file: {0}")]
    SensitiveBlocked(String),

    #[error("File is not a text file or has unsupported encoding: {0}")]
    NotText(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Search tool failed: {0}")]
    SearchFailed(String),

    #[error("No content search tool available (install ripgrep, or search inside a git working tree with git installed)")]
    ToolUnavailable,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::OutsideRoot(_) => ErrorKind::OutsideRoot,
            Self::NotFound(_) | Self::DirectoryNotFound(_) => ErrorKind::NotFound,
            Self::SensitiveBlocked(_) => ErrorKind::SensitiveBlocked,
            Self::NotText(_) => ErrorKind::NotText,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::SearchFailed(_) => ErrorKind::SearchToolFailed,
            Self::ToolUnavailable => ErrorKind::ToolUnavailable,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Map an I/O error from touching `requested` onto the taxonomy.
    pub(crate) fn from_io(requested: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(requested.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(requested.to_string()),
            std::io::ErrorKind::InvalidData => Self::NotText(requested.to_string()),
            _ => Self::Io {
                path: requested.to_string(),
                source: err,
            },
        }
    }
}
