//! Local artifact production: tar.gz archives, gzip compression, file copies

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("path escapes archive root: {0}")]
    BadEntry(PathBuf),
}

/// Create a gzip-compressed tar archive of `source` at `dest`.
///
/// Entries are placed under the directory's own name, mirroring how the
/// archive unpacks. Exclude patterns are matched as suffixes of the
/// in-archive path after stripping wildcard characters; an excluded
/// directory prunes its whole subtree.
pub fn archive_directory(
    source: &Path,
    dest: &Path,
    excludes: &[String],
    level: u32,
) -> Result<(), ArchiveError> {
    let suffixes = normalize_excludes(excludes);
    let root: PathBuf = source
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::new(level));
    let mut builder = Builder::new(encoder);

    let mut walker = WalkDir::new(source).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|source_err| ArchiveError::Walk {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| ArchiveError::BadEntry(entry.path().to_path_buf()))?;
        let arc_path = root.join(rel);

        if is_excluded(&arc_path, &suffixes) {
            debug!("Excluding {} from archive", arc_path.display());
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        if entry.file_type().is_dir() {
            builder.append_dir(&arc_path, entry.path())?;
        } else if entry.file_type().is_file() {
            builder.append_path_with_name(entry.path(), &arc_path)?;
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Gzip-compress a single file
pub fn gzip_file(source: &Path, dest: &Path, level: u32) -> Result<(), ArchiveError> {
    let mut input = File::open(source)?;
    let output = File::create(dest)?;
    let mut encoder = GzEncoder::new(output, Compression::new(level));
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

/// Copy a file to `dest`, carrying over the modification time where the
/// platform allows it. Permissions are preserved by the copy itself.
pub fn copy_preserving(source: &Path, dest: &Path) -> Result<(), ArchiveError> {
    fs::copy(source, dest)?;

    if let Ok(modified) = fs::metadata(source).and_then(|m| m.modified()) {
        match OpenOptions::new().write(true).open(dest) {
            Ok(file) => {
                if let Err(e) = file.set_modified(modified) {
                    debug!("Could not carry mtime to {}: {}", dest.display(), e);
                }
            }
            Err(e) => debug!("Could not reopen {} for mtime: {}", dest.display(), e),
        }
    }

    Ok(())
}

/// Strip wildcard characters, keeping only the suffixes to match. Patterns
/// that strip down to nothing would exclude everything and are dropped.
fn normalize_excludes(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.replace('*', ""))
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_excluded(arc_path: &Path, suffixes: &[String]) -> bool {
    let name = arc_path.to_string_lossy();
    suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
}
