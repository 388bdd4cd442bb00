//! Configuration module
//!
//! Two configuration sources exist:
//! - the TOML settings file (connection details, retention counts, remote
//!   storage credentials, logging), loaded and validated once at startup;
//! - the JSON files manifest declaring directory/file targets, loaded per
//!   run with a non-fatal empty fallback.

mod loader;
mod manifest;
mod types;

pub use loader::{load_settings, ConfigError, Result};
pub use manifest::{DirectoryTarget, FileManifest, FileTarget};
pub use types::*;

/// Expand a leading tilde (~) to the user's home directory
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde(&PathBuf::from("~/backups"));
        assert!(!expanded.starts_with("~"));

        let absolute = PathBuf::from("/var/backups");
        assert_eq!(expand_tilde(&absolute), absolute);
    }
}
