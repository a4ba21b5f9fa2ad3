use std::sync::Arc;

use serde_json::Value;

use crate::access::{ContentSearchRunner, LocalFileAccess};
use crate::config::PeekConfig;
use crate::error::PeekError;
use crate::github::{GitHubClient, GitHubError};

/// Shared collaborators for tool execution, Arc-wrapped for cloning into tasks.
#[derive(Clone)]
pub struct ToolContext {
    pub files: Arc<LocalFileAccess>,
    pub search: Arc<ContentSearchRunner>,
    pub github: Arc<GitHubClient>,
    pub default_branch: Arc<str>,
    /// 0 disables truncation
    pub max_output_bytes: usize,
}

impl ToolContext {
    pub fn from_config(config: &PeekConfig) -> Result<Self, GitHubError> {
        let search = ContentSearchRunner::new(
            &config.search.primary,
            &config.search.fallback,
            config.search.timeout(),
        );

        Ok(Self {
            files: Arc::new(
                LocalFileAccess::new(&config.server.root).with_walk_timeout(config.search.timeout()),
            ),
            search: Arc::new(search),
            github: Arc::new(GitHubClient::from_config(&config.github)?),
            default_branch: config.github.default_branch.as_str().into(),
            max_output_bytes: config.server.max_output_bytes,
        })
    }
}

/// Required string argument; absent or non-string is a protocol fault.
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, PeekError> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(PeekError::InvalidParams(format!("{} must be a string", key))),
        None => Err(PeekError::InvalidParams(format!("{} is required", key))),
    }
}

/// Optional string argument; `null` counts as absent.
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, PeekError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(PeekError::InvalidParams(format!("{} must be a string", key))),
    }
}

pub fn required_u64(args: &Value, key: &str) -> Result<u64, PeekError> {
    match args.get(key) {
        Some(v) => v.as_u64().ok_or_else(|| {
            PeekError::InvalidParams(format!("{} must be a non-negative integer", key))
        }),
        None => Err(PeekError::InvalidParams(format!("{} is required", key))),
    }
}
