//! Error types for peek. Protocol faults map to JSON-RPC codes;
//! tool-level failures become `Error: ...` text results.

use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes.
const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const INVALID_PARAMS: i32 = -32602;
const METHOD_NOT_FOUND: i32 = -32601;
const INTERNAL_ERROR: i32 = -32603;

/// Failures that break the protocol contract and surface to the caller as
/// JSON-RPC errors instead of text results.
#[derive(Error, Debug)]
pub enum PeekError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl PeekError {
    /// JSON-RPC error code for this error variant.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::ParseError(_) => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::UnknownTool(_) | Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Convert to (code, message) pair for RpcResponse::error.
    pub fn into_rpc(self) -> (i32, String) {
        let code = self.rpc_code();
        (code, self.to_string())
    }
}

/// Classification of an expected tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    OutsideRoot,
    NotFound,
    SensitiveBlocked,
    NotText,
    PermissionDenied,
    Timeout,
    Upstream4xx,
    Upstream5xx,
    Transport,
    SearchToolFailed,
    ToolUnavailable,
    InvalidArgument,
    Io,
}

/// Outcome of a single tool invocation. Expected failures travel as
/// `Error` values; they are never raised past the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    Ok(String),
    Error { kind: ErrorKind, message: String },
}

impl ToolResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self::Ok(text.into())
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    #[cfg(test)]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok(_) => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }

    /// Text shown to the caller; errors carry the `Error: ` prefix.
    pub fn into_text(self) -> String {
        match self {
            Self::Ok(text) => text,
            Self::Error { message, .. } => format!("Error: {}", message),
        }
    }
}

impl From<crate::access::AccessError> for ToolResult {
    fn from(err: crate::access::AccessError) -> Self {
        Self::error(err.kind(), err.to_string())
    }
}

impl From<crate::github::GitHubError> for ToolResult {
    fn from(err: crate::github::GitHubError) -> Self {
        Self::error(err.kind(), err.to_string())
    }
}
