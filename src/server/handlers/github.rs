use std::fmt::Write as _;

use serde_json::Value;

use super::common::{optional_str, required_str, required_u64, ToolContext};
use crate::error::{PeekError, ToolResult};
use crate::github::SearchResults;

pub async fn tool_get_pr_diff(args: &Value, ctx: &ToolContext) -> Result<ToolResult, PeekError> {
    let repo = required_str(args, "repo")?;
    let pr_number = required_u64(args, "pr_number")?;

    Ok(match ctx.github.pr_diff(repo, pr_number).await {
        Ok(diff) => ToolResult::Ok(diff),
        Err(e) => e.into(),
    })
}

pub async fn tool_search_github_files(
    args: &Value,
    ctx: &ToolContext,
) -> Result<ToolResult, PeekError> {
    let repo = required_str(args, "repo")?;
    let query = required_str(args, "query")?;
    let path = optional_str(args, "path")?;

    Ok(match ctx.github.search_files(repo, query, path).await {
        Ok(results) if results.total_count == 0 => {
            ToolResult::ok(format!("No files found matching: {}", query))
        }
        Ok(results) => ToolResult::ok(format_results(&results, "files")),
        Err(e) => e.into(),
    })
}

pub async fn tool_read_github_file(
    args: &Value,
    ctx: &ToolContext,
) -> Result<ToolResult, PeekError> {
    let repo = required_str(args, "repo")?;
    let file_path = required_str(args, "file_path")?;
    let branch = optional_str(args, "branch")?
        .filter(|b| !b.is_empty())
        .unwrap_or(&ctx.default_branch);

    Ok(match ctx.github.read_file(repo, file_path, branch).await {
        Ok(text) => ToolResult::Ok(text),
        Err(e) => e.into(),
    })
}

pub async fn tool_grep_github_repo(
    args: &Value,
    ctx: &ToolContext,
) -> Result<ToolResult, PeekError> {
    let repo = required_str(args, "repo")?;
    let query = required_str(args, "query")?;
    let path = optional_str(args, "path")?;

    Ok(match ctx.github.search_code(repo, query, path).await {
        Ok(results) if results.total_count == 0 => {
            ToolResult::ok(format!("No matches found for: {}", query))
        }
        Ok(results) => {
            let mut out = format_results(&results, "matches");
            out.push_str("\nNote: Use read_github_file to view full file contents.");
            ToolResult::ok(out)
        }
        Err(e) => e.into(),
    })
}

fn format_results(results: &SearchResults, noun: &str) -> String {
    let mut out = format!(
        "Found {} {} (showing first {}):\n\n",
        results.total_count,
        noun,
        results.items.len()
    );
    for item in &results.items {
        let _ = write!(out, "  {}\n     {}\n\n", item.path, item.html_url);
    }
    out
}
