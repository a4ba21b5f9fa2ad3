//! Tool catalog and name-based dispatch.

use std::time::Instant;

use serde_json::{json, Value};

use super::handlers::{files, github};
use crate::error::{PeekError, ToolResult};

pub use super::handlers::common::ToolContext;

/// Dispatch a tool call by name.
///
/// `Err` is reserved for protocol faults (unknown tool, bad arguments);
/// everything else comes back as a `ToolResult`.
pub async fn dispatch(name: &str, args: &Value, ctx: &ToolContext) -> Result<ToolResult, PeekError> {
    let start = Instant::now();

    let result = match name {
        "search_files" => files::tool_search_files(args, ctx).await,
        "read_file" => files::tool_read_file(args, ctx).await,
        "get_pr_diff" => github::tool_get_pr_diff(args, ctx).await,
        "search_github_files" => github::tool_search_github_files(args, ctx).await,
        "read_github_file" => github::tool_read_github_file(args, ctx).await,
        "grep_github_repo" => github::tool_grep_github_repo(args, ctx).await,
        _ => Err(PeekError::UnknownTool(name.to_string())),
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(ToolResult::Ok(text)) => {
            tracing::info!(tool = name, elapsed_ms, bytes = text.len(), "tool call ok")
        }
        Ok(ToolResult::Error { kind, message }) => {
            tracing::info!(tool = name, elapsed_ms, ?kind, "tool call failed: {}", message)
        }
        Err(e) => tracing::warn!(tool = name, elapsed_ms, "tool call rejected: {}", e),
    }

    result.map(|r| match r {
        ToolResult::Ok(text) => ToolResult::Ok(truncate_output(text, ctx.max_output_bytes)),
        err => err,
    })
}

/// Cut `text` to at most `max_bytes` on a char boundary and append a notice.
/// `max_bytes == 0` disables the limit.
pub fn truncate_output(mut text: String, max_bytes: usize) -> String {
    if max_bytes == 0 || text.len() <= max_bytes {
        return text;
    }

    let total = text.len();
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(&format!(
        "\n\n[Output truncated: showing {} of {} bytes]",
        cut, total
    ));
    text
}

/// MCP tool definitions.
pub fn tools_list() -> Vec<Value> {
    vec![
        json!({
            "name": "search_files",
            "description": "Search for files by name pattern (glob) or content (grep) in local codebase",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query (file pattern for glob, regex for grep)" },
                    "search_type": { "type": "string", "enum": ["glob", "grep"], "description": "Type of search to perform" },
                    "path": { "type": "string", "description": "Directory to search within, relative to the server root (defaults to the root)" }
                },
                "required": ["query", "search_type"]
            }
        }),
        json!({
            "name": "read_file",
            "description": "Read the full contents of a file from the local filesystem",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Absolute or root-relative path to the file to read" }
                },
                "required": ["file_path"]
            }
        }),
        json!({
            "name": "get_pr_diff",
            "description": "Fetch and analyze Pull Request changes from GitHub",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repo": { "type": "string", "description": "Repository in format 'owner/repo'" },
                    "pr_number": { "type": "integer", "description": "Pull request number" }
                },
                "required": ["repo", "pr_number"]
            }
        }),
        json!({
            "name": "search_github_files",
            "description": "Search for files in a GitHub repository by name or path pattern",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repo": { "type": "string", "description": "Repository in format 'owner/repo'" },
                    "query": { "type": "string", "description": "Filename or path pattern to search for" },
                    "path": { "type": "string", "description": "Optional path prefix to search within (e.g., 'src/')" }
                },
                "required": ["repo", "query"]
            }
        }),
        json!({
            "name": "read_github_file",
            "description": "Read the contents of a file from a GitHub repository",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repo": { "type": "string", "description": "Repository in format 'owner/repo'" },
                    "file_path": { "type": "string", "description": "Path to the file in the repository" },
                    "branch": { "type": "string", "description": "Branch name (defaults to 'main')" }
                },
                "required": ["repo", "file_path"]
            }
        }),
        json!({
            "name": "grep_github_repo",
            "description": "Search for code content in a GitHub repository (grep-like search)",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repo": { "type": "string", "description": "Repository in format 'owner/repo'" },
                    "query": { "type": "string", "description": "Code content to search for" },
                    "path": { "type": "string", "description": "Optional path prefix to search within" }
                },
                "required": ["repo", "query"]
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::content_search::SPAWN_LOCK;
    use crate::config::PeekConfig;
    use crate::error::ErrorKind;
    use crate::github::stub::stub;
    use std::path::Path;
    use tempfile::TempDir;

    const MISSING: &str = "/nonexistent/peek-no-such-tool";
    // Nothing listens on the discard port; GitHub tools must not be reached.
    const NO_GITHUB: &str = "http://127.0.0.1:9";

    fn config_for(root: &Path, api_base: &str) -> PeekConfig {
        let mut config = PeekConfig::default();
        config.server.root = root.to_path_buf();
        config.github.api_base = api_base.to_string();
        config.search.primary = MISSING.to_string();
        config.search.fallback = MISSING.to_string();
        config
    }

    fn context(root: &Path) -> ToolContext {
        ToolContext::from_config(&config_for(root, NO_GITHUB)).unwrap()
    }

    async fn call_text(name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        dispatch(name, &args, ctx).await.unwrap()
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.py"), "print('a')\n").unwrap();
        std::fs::write(temp.path().join("b.py"), "print('b')\n").unwrap();
        std::fs::write(temp.path().join("c.txt"), "plain\n").unwrap();
        std::fs::write(temp.path().join(".env"), "API_KEY=123\n").unwrap();
        temp
    }

    // ------------------------------------------------------------------
    // Catalog and protocol faults
    // ------------------------------------------------------------------

    #[test]
    fn test_tools_list_has_six_tools_with_schemas() {
        let tools = tools_list();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(
            names,
            [
                "search_files",
                "read_file",
                "get_pr_diff",
                "search_github_files",
                "read_github_file",
                "grep_github_repo"
            ]
        );
        for tool in &tools {
            assert_eq!(tool["inputSchema"]["type"], "object");
            assert!(tool["inputSchema"]["required"].as_array().is_some());
        }
        assert_eq!(
            tools[0]["inputSchema"]["properties"]["search_type"]["enum"],
            json!(["glob", "grep"])
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_protocol_fault() {
        let temp = project();
        let err = dispatch("delete_everything", &json!({}), &context(temp.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, PeekError::UnknownTool(_)));
        assert_eq!(err.rpc_code(), -32601);
    }

    #[tokio::test]
    async fn test_bad_arguments_are_protocol_faults() {
        let temp = project();
        let ctx = context(temp.path());

        let cases = [
            ("search_files", json!({"search_type": "glob"})),
            ("search_files", json!({"query": "*.py"})),
            ("search_files", json!({"query": "*.py", "search_type": "fuzzy"})),
            ("read_file", json!({})),
            ("read_file", json!({"file_path": 42})),
            ("get_pr_diff", json!({"repo": "o/r", "pr_number": "7"})),
            ("read_github_file", json!({"repo": "o/r"})),
            ("grep_github_repo", json!({"query": "x"})),
        ];
        for (name, args) in cases {
            let err = dispatch(name, &args, &ctx).await.unwrap_err();
            assert_eq!(err.rpc_code(), -32602, "{} {}", name, args);
        }
    }

    // ------------------------------------------------------------------
    // search_files / read_file
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_glob_lists_sorted_relative_paths() {
        let temp = project();
        let result = call_text(
            "search_files",
            json!({"query": "*.py", "search_type": "glob"}),
            &context(temp.path()),
        )
        .await;
        assert_eq!(result, ToolResult::ok("Found 2 files:\n  a.py\n  b.py\n"));
    }

    #[tokio::test]
    async fn test_glob_without_hits_is_success() {
        let temp = project();
        let result = call_text(
            "search_files",
            json!({"query": "*.rs", "search_type": "glob"}),
            &context(temp.path()),
        )
        .await;
        assert_eq!(result, ToolResult::ok("No files found matching pattern: *.rs"));

        // Only sensitive hits count as none.
        let result = call_text(
            "search_files",
            json!({"query": ".env*", "search_type": "glob"}),
            &context(temp.path()),
        )
        .await;
        assert!(!result.is_error());
        assert!(result.into_text().starts_with("No files found"));
    }

    #[tokio::test]
    async fn test_search_outside_root_is_denied() {
        let temp = project();
        let ctx = context(temp.path());
        for search_type in ["glob", "grep"] {
            let result = call_text(
                "search_files",
                json!({"query": "*", "search_type": search_type, "path": ".."}),
                &ctx,
            )
            .await;
            assert_eq!(result.kind(), Some(ErrorKind::OutsideRoot), "{}", search_type);
        }
    }

    #[tokio::test]
    async fn test_grep_without_matches_is_success() {
        let _lock = SPAWN_LOCK.lock().await;
        let temp = project();
        let mut config = config_for(temp.path(), NO_GITHUB);
        config.search.primary = "false".to_string();
        let ctx = ToolContext::from_config(&config).unwrap();

        let result = call_text(
            "search_files",
            json!({"query": "nothing", "search_type": "grep"}),
            &ctx,
        )
        .await;
        assert_eq!(result, ToolResult::ok("No matches found"));
    }

    #[tokio::test]
    async fn test_grep_without_tools_is_error_result() {
        let _lock = SPAWN_LOCK.lock().await;
        let temp = project();
        let result = call_text(
            "search_files",
            json!({"query": "print", "search_type": "grep"}),
            &context(temp.path()),
        )
        .await;
        assert_eq!(result.kind(), Some(ErrorKind::ToolUnavailable));
        assert!(result.into_text().starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_read_file_results() {
        let temp = project();
        let ctx = context(temp.path());

        let ok = call_text("read_file", json!({"file_path": "a.py"}), &ctx).await;
        assert_eq!(ok, ToolResult::ok("print('a')\n"));

        let sensitive = call_text("read_file", json!({"file_path": ".env"}), &ctx).await;
        assert_eq!(sensitive.kind(), Some(ErrorKind::SensitiveBlocked));
        assert_eq!(sensitive.into_text(), "Error: Cannot read sensitive file: .env");

        let missing = call_text("read_file", json!({"file_path": "nope.py"}), &ctx).await;
        assert_eq!(missing.into_text(), "Error: File not found: nope.py");

        let outside = call_text("read_file", json!({"file_path": "../x"}), &ctx).await;
        assert_eq!(outside.kind(), Some(ErrorKind::OutsideRoot));
    }

    #[tokio::test]
    async fn test_large_output_is_truncated() {
        let temp = project();
        std::fs::write(temp.path().join("big.txt"), "x".repeat(5000)).unwrap();
        let mut config = config_for(temp.path(), NO_GITHUB);
        config.server.max_output_bytes = 1000;
        let ctx = ToolContext::from_config(&config).unwrap();

        let text = call_text("read_file", json!({"file_path": "big.txt"}), &ctx)
            .await
            .into_text();
        assert!(text.starts_with(&"x".repeat(1000)));
        assert!(text.ends_with("[Output truncated: showing 1000 of 5000 bytes]"));
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        assert_eq!(truncate_output("short".into(), 100), "short");
        assert_eq!(truncate_output("x".repeat(50), 0), "x".repeat(50));

        // "é" is two bytes; a cut at 3 would split the second one.
        let text = truncate_output("éé".repeat(2), 3);
        assert!(text.starts_with("é\n\n[Output truncated: showing 2 of 8 bytes]"));
    }

    // ------------------------------------------------------------------
    // GitHub tools
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_pr_diff_not_found_is_error_text() {
        let temp = project();
        let gh = stub(404, "application/json", "{}").await;
        let ctx = ToolContext::from_config(&config_for(temp.path(), &gh.base)).unwrap();

        let result = call_text("get_pr_diff", json!({"repo": "o/r", "pr_number": 5}), &ctx).await;
        assert_eq!(result.kind(), Some(ErrorKind::NotFound));
        assert_eq!(result.into_text(), "Error: PR #5 not found in o/r");
    }

    #[tokio::test]
    async fn test_invalid_repo_is_error_text() {
        let temp = project();
        let result = call_text(
            "get_pr_diff",
            json!({"repo": "not-a-repo", "pr_number": 1}),
            &context(temp.path()),
        )
        .await;
        assert_eq!(result.kind(), Some(ErrorKind::InvalidArgument));
    }

    #[tokio::test]
    async fn test_search_github_files_empty() {
        let temp = project();
        let gh = stub(200, "application/json", r#"{"total_count":0,"items":[]}"#).await;
        let ctx = ToolContext::from_config(&config_for(temp.path(), &gh.base)).unwrap();

        let result = call_text(
            "search_github_files",
            json!({"repo": "o/r", "query": "nothing.rs"}),
            &ctx,
        )
        .await;
        assert_eq!(result, ToolResult::ok("No files found matching: nothing.rs"));
    }

    #[tokio::test]
    async fn test_grep_github_repo_lists_matches_with_hint() {
        let temp = project();
        let body = json!({
            "total_count": 1,
            "items": [{"path": "src/lib.rs", "html_url": "https://github.com/o/r/blob/main/src/lib.rs"}]
        });
        let gh = stub(200, "application/json", body.to_string()).await;
        let ctx = ToolContext::from_config(&config_for(temp.path(), &gh.base)).unwrap();

        let text = call_text(
            "grep_github_repo",
            json!({"repo": "o/r", "query": "fn main", "path": "src/"}),
            &ctx,
        )
        .await
        .into_text();
        assert!(text.starts_with("Found 1 matches (showing first 1):\n\n"));
        assert!(text.contains("src/lib.rs"));
        assert!(text.ends_with("Note: Use read_github_file to view full file contents."));
        assert!(gh.last_request().contains("path%3Asrc%2F"));
    }

    #[tokio::test]
    async fn test_read_github_file_branch_defaults_to_config() {
        let temp = project();
        let body = json!({"type": "file", "content": "cHJpbnQoJ2hpJyk="});
        let gh = stub(200, "application/json", body.to_string()).await;
        let mut config = config_for(temp.path(), &gh.base);
        config.github.default_branch = "trunk".to_string();
        let ctx = ToolContext::from_config(&config).unwrap();

        let result = call_text(
            "read_github_file",
            json!({"repo": "o/r", "file_path": "app.py"}),
            &ctx,
        )
        .await;
        assert_eq!(result, ToolResult::ok("print('hi')"));
        assert!(gh.last_request().contains("?ref=trunk "));

        call_text(
            "read_github_file",
            json!({"repo": "o/r", "file_path": "app.py", "branch": "develop"}),
            &ctx,
        )
        .await;
        assert!(gh.last_request().contains("?ref=develop "));
    }
}
