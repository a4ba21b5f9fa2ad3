use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR: &str = ".peek";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct PeekConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub github: GitHubConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Sandbox root for local file tools
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Tool output above this many bytes is truncated (0 = unlimited)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Primary content search program (ripgrep)
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Fallback program, invoked as `<fallback> grep`
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_primary() -> String {
    "rg".to_string()
}

fn default_fallback() -> String {
    "git".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            primary: default_primary(),
            fallback: default_fallback(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GitHubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bearer token; `GITHUB_TOKEN` fills this in when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
            token: None,
            default_branch: default_branch(),
        }
    }
}

impl GitHubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PeekConfig {
    /// Fill the GitHub token from the environment unless the file set one.
    pub fn with_env_token(mut self, token: Option<String>) -> Self {
        if self.github.token.is_none() {
            self.github.token = token.filter(|t| !t.trim().is_empty());
        }
        self
    }

    /// Copy safe to print: the token is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.github.token.is_some() {
            copy.github.token = Some("<redacted>".to_string());
        }
        copy
    }
}

/// Implicit config locations, most specific first.
pub fn config_candidates(root: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![root.join(CONFIG_DIR).join(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_DIR).join(CONFIG_FILE));
    }
    candidates
}

/// Load the effective config. An explicit file must exist and parse; implicit
/// files fall back to defaults with a warning.
pub fn load_config(explicit: Option<&Path>, root: &Path) -> anyhow::Result<(PeekConfig, Option<PathBuf>)> {
    load_config_from(explicit, &config_candidates(root))
}

fn load_config_from(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> anyhow::Result<(PeekConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        return Ok((anchor_root(config, &content, path), Some(path.to_path_buf())));
    }

    for path in candidates {
        if !path.exists() {
            continue;
        }
        let config = match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => anchor_root(config, &content, path),
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    PeekConfig::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                PeekConfig::default()
            }
        };
        return Ok((config, Some(path.clone())));
    }

    Ok((PeekConfig::default(), None))
}

/// A relative `server.root` written in a config file is taken relative to the
/// project that file belongs to (the parent of `.peek/`, or the file's own
/// directory for a `--config` file elsewhere). An unset root stays `.`, i.e.
/// the working directory.
fn anchor_root(mut config: PeekConfig, content: &str, path: &Path) -> PeekConfig {
    let root_set = content
        .parse::<toml::Table>()
        .ok()
        .and_then(|table| table.get("server").and_then(|s| s.get("root")).cloned())
        .is_some();
    if !root_set || config.server.root.is_absolute() {
        return config;
    }

    let Some(mut base) = path.parent().map(Path::to_path_buf) else {
        return config;
    };
    if base.file_name().is_some_and(|name| name == CONFIG_DIR) {
        if let Some(project) = base.parent() {
            base = project.to_path_buf();
        }
    }
    config.server.root = base.join(&config.server.root);
    config
}

pub const DEFAULT_CONFIG: &str = r#"# peek configuration
# See: peek config --help

[server]
# Relative to the directory that holds .peek/
root = "."
max_output_bytes = 1048576

[search]
timeout_secs = 30
primary = "rg"
fallback = "git"

[github]
api_base = "https://api.github.com"
timeout_secs = 30
# token = "ghp_..."   (GITHUB_TOKEN is used when unset)
default_branch = "main"
"#;
