use std::sync::OnceLock;
use std::time::{Duration, Instant};

use base64::Engine;
use regex::Regex;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;

use super::GitHubError;
use crate::config::GitHubConfig;

const JSON_ACCEPT: &str = "application/vnd.github.v3+json";
const DIFF_ACCEPT: &str = "application/vnd.github.v3.diff";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("peek/", env!("CARGO_PKG_VERSION"));

pub const FILE_SEARCH_PAGE_SIZE: u32 = 100;
pub const CODE_SEARCH_PAGE_SIZE: u32 = 30;

/// Body of `GET /search/code`, reduced to what the tools print.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
pub struct SearchResults {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
pub struct SearchItem {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub html_url: String,
}

/// What a request was for, so a bare status code can be turned into a message
/// that names the missing resource.
enum Endpoint<'a> {
    PullRequest { repo: &'a str, number: u64 },
    Contents { path: &'a str, branch: &'a str },
    Search { invalid_hint: &'static str },
}

fn status_error(status: u16, endpoint: &Endpoint<'_>) -> GitHubError {
    match (status, endpoint) {
        (404, Endpoint::PullRequest { repo, number }) => GitHubError::PrNotFound {
            repo: repo.to_string(),
            number: *number,
        },
        (404, Endpoint::Contents { path, branch }) => GitHubError::FileNotFound {
            path: path.to_string(),
            branch: branch.to_string(),
        },
        (403, _) => GitHubError::RateLimited,
        (422, Endpoint::Search { invalid_hint }) => GitHubError::InvalidQuery(*invalid_hint),
        (code, _) => GitHubError::Status(code),
    }
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(GitHubError::from_reqwest)?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &GitHubConfig) -> Result<Self, GitHubError> {
        Self::new(config.api_base.clone(), config.token.clone(), config.timeout())
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Unified diff of a pull request.
    pub async fn pr_diff(&self, repo: &str, number: u64) -> Result<String, GitHubError> {
        validate_repo(repo)?;
        let url = format!("{}/repos/{}/pulls/{}", self.api_base, repo, number);
        let response = self
            .get(&url, DIFF_ACCEPT, &[], Endpoint::PullRequest { repo, number })
            .await?;
        response.text().await.map_err(GitHubError::from_reqwest)
    }

    /// Files whose name matches `query`, optionally under `path`.
    pub async fn search_files(
        &self,
        repo: &str,
        query: &str,
        path: Option<&str>,
    ) -> Result<SearchResults, GitHubError> {
        validate_repo(repo)?;
        let q = search_query(repo, &format!("filename:{}", query), path);
        self.search(q, FILE_SEARCH_PAGE_SIZE, "Check your search parameters.")
            .await
    }

    /// Files whose content matches `query`, optionally under `path`.
    pub async fn search_code(
        &self,
        repo: &str,
        query: &str,
        path: Option<&str>,
    ) -> Result<SearchResults, GitHubError> {
        validate_repo(repo)?;
        let q = search_query(repo, query, path);
        self.search(q, CODE_SEARCH_PAGE_SIZE, "Try a more specific search.")
            .await
    }

    /// Decoded text of one file at `branch`.
    pub async fn read_file(
        &self,
        repo: &str,
        file_path: &str,
        branch: &str,
    ) -> Result<String, GitHubError> {
        validate_repo(repo)?;
        let encoded = encode_path(file_path)?;
        let url = format!("{}/repos/{}/contents/{}", self.api_base, repo, encoded);
        let response = self
            .get(
                &url,
                JSON_ACCEPT,
                &[("ref", branch.to_string())],
                Endpoint::Contents {
                    path: file_path,
                    branch,
                },
            )
            .await?;

        let body: Value = response.json().await.map_err(GitHubError::from_reqwest)?;
        decode_contents(file_path, &body)
    }

    async fn search(
        &self,
        q: String,
        per_page: u32,
        invalid_hint: &'static str,
    ) -> Result<SearchResults, GitHubError> {
        let url = format!("{}/search/code", self.api_base);
        let response = self
            .get(
                &url,
                JSON_ACCEPT,
                &[("q", q), ("per_page", per_page.to_string())],
                Endpoint::Search { invalid_hint },
            )
            .await?;
        response.json().await.map_err(GitHubError::from_reqwest)
    }

    async fn get(
        &self,
        url: &str,
        accept: &str,
        query: &[(&str, String)],
        endpoint: Endpoint<'_>,
    ) -> Result<reqwest::Response, GitHubError> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, accept)
            .header(API_VERSION_HEADER, API_VERSION);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            tracing::warn!(url, "GitHub request failed: {}", e);
            GitHubError::from_reqwest(e)
        })?;

        let status = response.status();
        tracing::debug!(
            url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "GitHub request"
        );

        if status.is_success() {
            Ok(response)
        } else {
            Err(status_error(status.as_u16(), &endpoint))
        }
    }
}

fn repo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("static regex"))
}

/// `owner/name` with no segment that would be read as a relative reference.
pub fn validate_repo(repo: &str) -> Result<(), GitHubError> {
    let dotted = repo.split('/').any(|seg| seg == "." || seg == "..");
    if !repo_pattern().is_match(repo) || dotted {
        return Err(GitHubError::InvalidRepo(repo.to_string()));
    }
    Ok(())
}

/// Percent-encode each segment of a repository path, keeping `/` separators.
fn encode_path(file_path: &str) -> Result<String, GitHubError> {
    let trimmed = file_path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(GitHubError::InvalidPath(file_path.to_string()));
    }

    let mut encoded = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(GitHubError::InvalidPath(file_path.to_string()));
        }
        encoded.push(urlencoding::encode(segment).into_owned());
    }
    Ok(encoded.join("/"))
}

fn search_query(repo: &str, term: &str, path: Option<&str>) -> String {
    let mut q = format!("repo:{} {}", repo, term);
    if let Some(path) = path.filter(|p| !p.is_empty()) {
        q.push_str(" path:");
        q.push_str(path);
    }
    q
}

/// Contents API payloads carry base64 wrapped at 60 columns.
fn decode_contents(file_path: &str, body: &Value) -> Result<String, GitHubError> {
    if body.get("type").and_then(Value::as_str) != Some("file") {
        return Err(GitHubError::NotAFile(file_path.to_string()));
    }

    let content = body.get("content").and_then(Value::as_str).unwrap_or("");
    let compact: String = content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(GitHubError::EmptyContent);
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| GitHubError::Decode(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes).map_err(|_| GitHubError::NotText)
}
