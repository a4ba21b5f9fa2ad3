//! Sensitive-file detection by file name.
//!
//! Substring denylist over the lowercased final path segment. Over-blocking is
//! acceptable, under-blocking is not, so `my.pem.backup` and
//! `old_credentials.json` are both treated as sensitive.

use std::path::Path;

/// Substrings that mark a file name as secret material.
pub const SENSITIVE_PATTERNS: &[&str] = &[
    ".env",
    "credentials",
    "secrets",
    "private_key",
    ".pem",
    ".key",
    "id_rsa",
    "id_dsa",
];

/// True when the file name (not the directory) matches the denylist.
pub fn is_sensitive_name(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Path variant of [`is_sensitive_name`]; only the final segment is considered.
pub fn is_sensitive(path: &Path) -> bool {
    path.file_name()
        .map(|name| is_sensitive_name(&name.to_string_lossy()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denylisted_names_are_sensitive() {
        for name in [
            ".env",
            ".env.local",
            ".env.production",
            "id_rsa",
            "id_dsa.pub",
            "secrets.yaml",
            "private_key.pem",
            "server.key",
            "credentials",
            "CREDENTIALS.JSON",
            ".ENV",
        ] {
            assert!(is_sensitive_name(name), "{} should be sensitive", name);
        }
    }

    #[test]
    fn test_substring_matching_over_blocks() {
        assert!(is_sensitive_name("my.pem.backup"));
        assert!(is_sensitive_name("old_credentials.json"));
    }

    #[test]
    fn test_ordinary_names_are_not_sensitive() {
        for name in ["README.md", "main.py", "config.py", "Cargo.toml", "lib.rs"] {
            assert!(!is_sensitive_name(name), "{} should not be sensitive", name);
        }
    }

    #[test]
    fn test_only_final_segment_matters() {
        assert!(!is_sensitive(Path::new("secrets/readme.md")));
        assert!(!is_sensitive(Path::new(".env.d/notes.txt")));
        assert!(is_sensitive(Path::new("src/config/.env")));
        assert!(!is_sensitive(Path::new("/")));
    }
}
