//! Content search by shelling out to ripgrep, falling back to `git grep`.
//!
//! The utility is picked by probing: spawn ripgrep, and only if the binary is
//! not installed spawn git. Every child is spawned with `kill_on_drop`, so a
//! timeout or a cancelled caller terminates the process instead of leaving it
//! running.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::sensitivity::SENSITIVE_PATTERNS;
use super::AccessError;

pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful outcomes of a content search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutput {
    /// Raw tool output: file headings and `line:text` rows.
    Matches(String),
    NoMatches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTool {
    Ripgrep,
    GitGrep,
}

impl fmt::Display for SearchTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ripgrep => write!(f, "ripgrep"),
            Self::GitGrep => write!(f, "git grep"),
        }
    }
}

enum Attempt {
    Completed(Result<SearchOutput, AccessError>),
    NotInstalled,
}

#[derive(Debug, Clone)]
pub struct ContentSearchRunner {
    ripgrep: PathBuf,
    git: PathBuf,
    timeout: Duration,
}

impl Default for ContentSearchRunner {
    fn default() -> Self {
        Self::new("rg", "git", DEFAULT_SEARCH_TIMEOUT)
    }
}

impl ContentSearchRunner {
    pub fn new(ripgrep: impl Into<PathBuf>, git: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ripgrep: ripgrep.into(),
            git: git.into(),
            timeout,
        }
    }

    /// Search `dir` (already validated by the caller) for `pattern`.
    pub async fn search(&self, pattern: &str, dir: &Path) -> Result<SearchOutput, AccessError> {
        if let Attempt::Completed(result) = self.attempt(SearchTool::Ripgrep, pattern, dir).await {
            return result;
        }

        tracing::info!("ripgrep not installed, falling back to git grep");
        match self.attempt(SearchTool::GitGrep, pattern, dir).await {
            Attempt::Completed(result) => result,
            Attempt::NotInstalled => Err(AccessError::ToolUnavailable),
        }
    }

    fn command(&self, tool: SearchTool, pattern: &str, dir: &Path) -> Command {
        let mut cmd = match tool {
            SearchTool::Ripgrep => {
                let mut cmd = Command::new(&self.ripgrep);
                cmd.args(["--line-number", "--heading", "--color", "never"]);
                for p in SENSITIVE_PATTERNS {
                    cmd.arg("--iglob").arg(format!("!*{}*", p));
                }
                cmd.arg("-e").arg(pattern).arg(".");
                cmd
            }
            SearchTool::GitGrep => {
                let mut cmd = Command::new(&self.git);
                cmd.args(["grep", "-n", "--no-color", "-e"])
                    .arg(pattern)
                    .args(["--", "."]);
                for p in SENSITIVE_PATTERNS {
                    cmd.arg(format!(":(exclude,icase,glob)**/*{}*", p));
                }
                cmd
            }
        };

        cmd.current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn attempt(&self, tool: SearchTool, pattern: &str, dir: &Path) -> Attempt {
        let child = match self.command(tool, pattern, dir).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Attempt::NotInstalled,
            Err(e) => {
                return Attempt::Completed(Err(AccessError::SearchFailed(format!(
                    "failed to start {}: {}",
                    tool, e
                ))))
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Attempt::Completed(Err(AccessError::SearchFailed(format!(
                    "{} did not complete: {}",
                    tool, e
                ))))
            }
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", tool, self.timeout);
                return Attempt::Completed(Err(AccessError::Timeout(self.timeout)));
            }
        };

        let result = match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                if stdout.trim().is_empty() {
                    Ok(SearchOutput::NoMatches)
                } else {
                    Ok(SearchOutput::Matches(stdout))
                }
            }
            Some(1) => Ok(SearchOutput::NoMatches),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let message = if stderr.is_empty() {
                    format!("{} exited with {}", tool, output.status)
                } else {
                    stderr
                };
                Err(AccessError::SearchFailed(message))
            }
        };

        tracing::debug!(%tool, status = %output.status, "content search finished");
        Attempt::Completed(result)
    }
}

/// Writing an executable while another test forks can fail with ETXTBSY;
/// tests that write scripts or spawn search processes take this lock.
#[cfg(test)]
pub(crate) static SPAWN_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());
