//! Backup manager - orchestrates one backup run
//!
//! The run is strictly sequential: remote folder layout, then the database
//! backup, then the file backups. The two backup types are isolated from
//! each other; within the files type, every declared target is isolated
//! from its siblings. Only folder-layout problems (and authentication,
//! which the caller handles before invoking [`BackupManager::run`]) abort
//! the run as a whole.

use crate::config::{DirectoryTarget, FileManifest, FileTarget, Settings};
use crate::remote::{FolderLayout, RemoteStore};
use crate::utils::{archive, mysql, retention};
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Timestamp embedded in artifact names; sorts chronologically as text,
/// which keeps names usable as an ordering fallback
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Which backup types this run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupSelection {
    pub mysql: bool,
    pub files: bool,
}

impl BackupSelection {
    /// CLI flag semantics: each flag restricts the run to its type; with
    /// neither or both given, both types run.
    pub fn from_flags(mysql: bool, files: bool) -> Self {
        if mysql == files {
            Self {
                mysql: true,
                files: true,
            }
        } else {
            Self { mysql, files }
        }
    }
}

/// Outcome of one backup type, as an explicit value rather than a raised
/// error, so one type's failure never crosses into the other
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeOutcome {
    Completed,
    Failed(String),
}

impl TypeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TypeOutcome::Completed)
    }
}

/// Aggregate result of one run
#[derive(Debug, Default)]
pub struct BackupReport {
    pub mysql: Option<TypeOutcome>,
    pub files: Option<TypeOutcome>,
}

impl BackupReport {
    pub fn attempted(&self) -> usize {
        self.mysql.iter().count() + self.files.iter().count()
    }

    pub fn succeeded(&self) -> usize {
        [&self.mysql, &self.files]
            .into_iter()
            .flatten()
            .filter(|outcome| outcome.is_success())
            .count()
    }

    pub fn all_failed(&self) -> bool {
        self.attempted() > 0 && self.succeeded() == 0
    }
}

/// Scoped temp artifact: removed when dropped, whether or not the upload
/// it was produced for went through
struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Failed to remove temp file {}: {}", self.path.display(), e);
            }
        }
    }
}

pub struct BackupManager {
    settings: Settings,
    temp_dir: PathBuf,
}

impl BackupManager {
    /// Create a backup manager scratching under the system temp directory
    pub fn new(settings: Settings) -> Self {
        let temp_dir = std::env::temp_dir().join("server-backup");
        Self { settings, temp_dir }
    }

    /// Create a backup manager with an explicit scratch directory
    pub fn with_temp_dir(settings: Settings, temp_dir: PathBuf) -> Self {
        Self { settings, temp_dir }
    }

    /// Run the selected backup types against an already-authenticated
    /// store and report per-type outcomes. Each type runs even when the
    /// other fails.
    pub fn run(&self, store: &dyn RemoteStore, selection: BackupSelection) -> Result<BackupReport> {
        info!("Starting backup run");
        fs::create_dir_all(&self.temp_dir).with_context(|| {
            format!(
                "Failed to create temp directory: {}",
                self.temp_dir.display()
            )
        })?;

        let layout = FolderLayout::ensure(store, &self.settings.remote)
            .context("Failed to prepare remote folder layout")?;

        let mut report = BackupReport::default();

        if selection.mysql {
            report.mysql = Some(match self.backup_databases(store, &layout) {
                Ok(()) => {
                    info!("MySQL backup completed");
                    TypeOutcome::Completed
                }
                Err(e) => {
                    error!("MySQL backup failed: {:#}", e);
                    TypeOutcome::Failed(format!("{:#}", e))
                }
            });
        }

        if selection.files {
            report.files = Some(match self.backup_files(store, &layout) {
                Ok(uploaded) => {
                    info!("Files backup completed: {} item(s) uploaded", uploaded);
                    TypeOutcome::Completed
                }
                Err(e) => {
                    error!("Files backup failed: {:#}", e);
                    TypeOutcome::Failed(format!("{:#}", e))
                }
            });
            // Defensive sweep for leftovers, including from interrupted
            // earlier runs
            self.sweep_temp_files();
        }

        info!(
            "Backup run finished: {}/{} backup types completed",
            report.succeeded(),
            report.attempted()
        );
        Ok(report)
    }

    /// One dump covering the configured databases, compressed, uploaded,
    /// then pruned against the global database retention count
    fn backup_databases(&self, store: &dyn RemoteStore, layout: &FolderLayout) -> Result<()> {
        info!("Backing up MySQL databases");

        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        let prefix = &self.settings.backup.name_prefix;
        let raw = TempArtifact::new(
            self.temp_dir
                .join(format!("{}_mysql_{}.sql", prefix, timestamp)),
        );
        let compressed = TempArtifact::new(
            self.temp_dir
                .join(format!("{}_mysql_{}.sql.gz", prefix, timestamp)),
        );

        mysql::dump_to_file(&self.settings.mysql, raw.path())?;
        archive::gzip_file(
            raw.path(),
            compressed.path(),
            self.settings.backup.compression_level,
        )
        .context("Failed to compress dump")?;
        // Dropping the guard deletes the uncompressed dump
        drop(raw);

        store
            .upload(compressed.path(), &layout.database)
            .context("Upload failed")?;

        retention::prune_folder(
            store,
            &layout.database,
            self.settings.mysql.max_backups,
            "database",
        )?;

        Ok(())
    }

    /// Every manifest target, each isolated from the others; reports how
    /// many uploaded
    fn backup_files(&self, store: &dyn RemoteStore, layout: &FolderLayout) -> Result<usize> {
        let manifest = FileManifest::load(&self.settings.backup.manifest_path);
        if manifest.is_empty() {
            info!("No file targets configured for backup");
            return Ok(0);
        }

        info!("Backing up {} file target(s)", manifest.target_count());
        let mut uploaded = 0;

        for target in &manifest.directories {
            match self.backup_directory_target(store, layout, target) {
                Ok(()) => uploaded += 1,
                Err(e) => warn!(
                    "Skipping directory target {}: {:#}",
                    target.source.display(),
                    e
                ),
            }
        }

        for target in &manifest.files {
            match self.backup_file_target(store, layout, target) {
                Ok(()) => uploaded += 1,
                Err(e) => warn!("Skipping file target {}: {:#}", target.source.display(), e),
            }
        }

        // Folder-wide cap on top of the per-target limits; only meaningful
        // once something new landed remotely this run
        if uploaded > 0 {
            retention::prune_folder(
                store,
                &layout.files,
                self.settings.backup.max_files_backups,
                "files",
            )?;
        }

        Ok(uploaded)
    }

    fn backup_directory_target(
        &self,
        store: &dyn RemoteStore,
        layout: &FolderLayout,
        target: &DirectoryTarget,
    ) -> Result<()> {
        if !target.source.exists() {
            anyhow::bail!("directory does not exist");
        }
        if !target.source.is_dir() {
            anyhow::bail!("path is not a directory");
        }

        let group = self.files_group(&target.name);
        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        let artifact =
            TempArtifact::new(self.temp_dir.join(format!("{}{}.tar.gz", group, timestamp)));

        archive::archive_directory(
            &target.source,
            artifact.path(),
            &target.exclude,
            self.settings.backup.compression_level,
        )
        .context("Failed to build archive")?;

        store
            .upload(artifact.path(), &layout.files)
            .context("Upload failed")?;

        retention::prune_group(store, &layout.files, &group, target.max)?;
        Ok(())
    }

    fn backup_file_target(
        &self,
        store: &dyn RemoteStore,
        layout: &FolderLayout,
        target: &FileTarget,
    ) -> Result<()> {
        if !target.source.exists() {
            anyhow::bail!("file does not exist");
        }
        if !target.source.is_file() {
            anyhow::bail!("path is not a regular file");
        }

        let group = self.files_group(&target.name);
        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        let artifact = TempArtifact::new(self.temp_dir.join(format!("{}{}", group, timestamp)));

        archive::copy_preserving(&target.source, artifact.path())
            .context("Failed to copy file")?;

        store
            .upload(artifact.path(), &layout.files)
            .context("Upload failed")?;

        retention::prune_group(store, &layout.files, &group, target.max)?;
        Ok(())
    }

    /// Retention group key for a file target. The trailing separator keeps
    /// logical names that prefix each other ("nginx", "nginx-old") in
    /// distinct groups, since group listings match by substring.
    fn files_group(&self, name: &str) -> String {
        format!("{}_files_{}_", self.settings.backup.name_prefix, name)
    }

    /// Remove any leftover file artifacts carrying this prefix from the
    /// scratch directory
    fn sweep_temp_files(&self) {
        let pattern = format!("{}_files_", self.settings.backup.name_prefix);
        let entries = match fs::read_dir(&self.temp_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Failed to sweep temp directory {}: {}",
                    self.temp_dir.display(),
                    e
                );
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&pattern) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("Failed to clean up {:?}: {}", entry.path(), e);
                }
            }
        }
    }
}
