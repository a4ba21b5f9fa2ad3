//! Read-only GitHub REST client used by the remote tools.

pub mod client;
#[cfg(test)]
pub(crate) mod stub;

pub use client::{GitHubClient, SearchResults};

use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("Invalid repository '{0}': expected owner/name")]
    InvalidRepo(String),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("PR #{number} not found in {repo}")]
    PrNotFound { repo: String, number: u64 },

    #[error("File not found: {path} (branch: {branch})")]
    FileNotFound { path: String, branch: String },

    #[error("Rate limit exceeded or authentication required. Set GITHUB_TOKEN or github.token in the config.")]
    RateLimited,

    #[error("Invalid search query. {0}")]
    InvalidQuery(&'static str),

    #[error("GitHub API returned status {0}")]
    Status(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("GitHub request failed: {0}")]
    Transport(String),

    #[error("Unexpected response from GitHub: {0}")]
    Decode(String),

    #[error("{0} is not a file (it might be a directory)")]
    NotAFile(String),

    #[error("File content is empty or unavailable")]
    EmptyContent,

    #[error("File is not a text file or has unsupported encoding")]
    NotText,
}

impl GitHubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRepo(_) | Self::InvalidPath(_) | Self::NotAFile(_) => {
                ErrorKind::InvalidArgument
            }
            Self::PrNotFound { .. } | Self::FileNotFound { .. } => ErrorKind::NotFound,
            Self::RateLimited | Self::InvalidQuery(_) => ErrorKind::Upstream4xx,
            Self::Status(code) if *code >= 500 => ErrorKind::Upstream5xx,
            Self::Status(_) => ErrorKind::Upstream4xx,
            Self::Timeout => ErrorKind::Timeout,
            Self::Transport(_) | Self::Decode(_) => ErrorKind::Transport,
            Self::EmptyContent | Self::NotText => ErrorKind::NotText,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
