//! External dump tool invocation

use crate::config::MysqlSettings;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("dump command '{0}' not found")]
    MissingBinary(String),

    #[error("failed to create dump file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' exited with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Run the configured dump tool, writing the raw dump to `output`.
///
/// The dump is taken as a consistent single-transaction snapshot and
/// includes routines and triggers. A non-zero exit is a [`DumpError`];
/// the caller decides what to do with the partial output file.
pub fn dump_to_file(settings: &MysqlSettings, output: &Path) -> Result<(), DumpError> {
    which::which(&settings.dump_command)
        .map_err(|_| DumpError::MissingBinary(settings.dump_command.clone()))?;

    let databases = settings.database_list();
    if databases.is_empty() {
        info!("Dumping all databases from {}", settings.host);
    } else {
        info!(
            "Dumping {} database(s) from {}",
            databases.len(),
            settings.host
        );
    }

    let dump_file = File::create(output).map_err(|source| DumpError::CreateFile {
        path: output.to_path_buf(),
        source,
    })?;

    let result = Command::new(&settings.dump_command)
        .args(build_dump_args(settings))
        .stdout(Stdio::from(dump_file))
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| DumpError::Spawn {
            command: settings.dump_command.clone(),
            source,
        })?;

    if !result.status.success() {
        return Err(DumpError::Failed {
            command: settings.dump_command.clone(),
            code: result.status.code(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }

    Ok(())
}

/// Argument list for the dump tool. Kept separate from the invocation so
/// the flag set is testable without a database.
pub fn build_dump_args(settings: &MysqlSettings) -> Vec<String> {
    let mut args = Vec::new();
    args.push(format!("--host={}", settings.host));
    args.push(format!("--user={}", settings.user));

    if !settings.password.is_empty() {
        args.push(format!("--password={}", settings.password));
    }

    args.push("--single-transaction".to_string());
    args.push("--routines".to_string());
    args.push("--triggers".to_string());

    let databases = settings.database_list();
    if databases.is_empty() {
        args.push("--all-databases".to_string());
    } else {
        args.extend(databases);
    }

    args
}
