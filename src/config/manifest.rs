//! Declarative manifest of file and directory backup targets
//!
//! The manifest is a JSON document:
//!
//! ```json
//! {
//!   "directories": [{"source": "/etc/nginx", "name": "nginx", "max": 3, "exclude": ["*.log"]}],
//!   "files": [{"source": "/etc/fstab"}]
//! }
//! ```
//!
//! A missing or malformed manifest is not fatal: the file backup degrades to
//! a no-op with a warning. Omitted fields are filled in one explicit
//! resolution step rather than at each use site.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Retained-copy default for targets that do not declare `max`
const DEFAULT_MAX_RETAINED: u32 = 1;

#[derive(Debug, Clone, Deserialize, Default)]
struct RawManifest {
    #[serde(default)]
    directories: Vec<RawDirectoryEntry>,
    #[serde(default)]
    files: Vec<RawFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDirectoryEntry {
    source: PathBuf,
    name: Option<String>,
    max: Option<u32>,
    exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFileEntry {
    source: PathBuf,
    name: Option<String>,
    max: Option<u32>,
}

/// A directory to archive, with all defaults resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTarget {
    pub source: PathBuf,
    /// Logical name; forms this target's retention group
    pub name: String,
    /// Number of copies to retain remotely (0 = unlimited)
    pub max: u32,
    /// Exclude patterns, matched as suffixes after stripping wildcards
    pub exclude: Vec<String>,
}

/// A single file to copy, with all defaults resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    pub source: PathBuf,
    pub name: String,
    pub max: u32,
}

/// Resolved manifest with per-target defaults applied
#[derive(Debug, Clone, Default)]
pub struct FileManifest {
    pub directories: Vec<DirectoryTarget>,
    pub files: Vec<FileTarget>,
}

impl FileManifest {
    /// The designated fallback for a missing or unreadable manifest
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the manifest from `path`, falling back to the empty manifest
    /// (with a warning) when the file is missing or malformed.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            warn!(
                "Files manifest not found at {}; no files will be backed up",
                path.display()
            );
            return Self::empty();
        }

        match Self::parse_file(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(
                    "Failed to load files manifest {}: {:#}; treating as empty",
                    path.display(),
                    e
                );
                Self::empty()
            }
        }
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw: RawManifest =
            serde_json::from_str(&contents).context("Failed to parse manifest JSON")?;
        Ok(Self::resolve(raw))
    }

    fn resolve(raw: RawManifest) -> Self {
        let directories = raw
            .directories
            .into_iter()
            .map(|entry| DirectoryTarget {
                name: resolve_name(entry.name, &entry.source),
                max: entry.max.unwrap_or(DEFAULT_MAX_RETAINED),
                exclude: entry.exclude.unwrap_or_default(),
                source: entry.source,
            })
            .collect();

        let files = raw
            .files
            .into_iter()
            .map(|entry| FileTarget {
                name: resolve_name(entry.name, &entry.source),
                max: entry.max.unwrap_or(DEFAULT_MAX_RETAINED),
                source: entry.source,
            })
            .collect();

        Self { directories, files }
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }

    pub fn target_count(&self) -> usize {
        self.directories.len() + self.files.len()
    }
}

/// Default logical name: the final path segment of the source
fn resolve_name(name: Option<String>, source: &Path) -> String {
    name.unwrap_or_else(|| {
        source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string())
    })
}
