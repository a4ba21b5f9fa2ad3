use serde_json::Value;

use super::common::{optional_str, required_str, ToolContext};
use crate::access::SearchOutput;
use crate::error::{PeekError, ToolResult};

/// `search_files`: glob over names or grep over contents under `path`.
pub async fn tool_search_files(args: &Value, ctx: &ToolContext) -> Result<ToolResult, PeekError> {
    let query = required_str(args, "query")?;
    let search_type = required_str(args, "search_type")?;
    let path = optional_str(args, "path")?.unwrap_or(".");

    match search_type {
        "glob" => Ok(glob_search(query, path, ctx).await),
        "grep" => Ok(grep_search(query, path, ctx).await),
        other => Err(PeekError::InvalidParams(format!(
            "Invalid search_type: {} (expected 'glob' or 'grep')",
            other
        ))),
    }
}

async fn glob_search(pattern: &str, base: &str, ctx: &ToolContext) -> ToolResult {
    let matches = match ctx.files.enumerate(pattern, base).await {
        Ok(m) => m,
        Err(e) => return e.into(),
    };

    if matches.is_empty() {
        return ToolResult::ok(format!("No files found matching pattern: {}", pattern));
    }

    let mut out = format!("Found {} files:\n", matches.len());
    for m in &matches {
        out.push_str("  ");
        out.push_str(&m.path);
        out.push('\n');
    }
    ToolResult::ok(out)
}

async fn grep_search(pattern: &str, base: &str, ctx: &ToolContext) -> ToolResult {
    let dir = match ctx.files.resolve_dir(base) {
        Ok(d) => d,
        Err(e) => return e.into(),
    };

    match ctx.search.search(pattern, &dir).await {
        Ok(SearchOutput::Matches(text)) => ToolResult::ok(text),
        Ok(SearchOutput::NoMatches) => ToolResult::ok("No matches found"),
        Err(e) => e.into(),
    }
}

/// `read_file`: full text of one file inside the sandbox.
pub async fn tool_read_file(args: &Value, ctx: &ToolContext) -> Result<ToolResult, PeekError> {
    let file_path = required_str(args, "file_path")?;
    Ok(match ctx.files.read_one(file_path).await {
        Ok(contents) => ToolResult::Ok(contents),
        Err(e) => e.into(),
    })
}
