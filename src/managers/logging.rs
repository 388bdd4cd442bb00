//! Logging setup
//!
//! Dual-output logging in the same shape as the rest of the tool's
//! observability: a concise INFO console stream on stderr and a
//! daily-rotated log file at the configured level, with old files cleaned
//! up past a retention count.

use crate::config::{expand_tilde, LoggingSettings};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "server-backup.log";

/// Keeps the non-blocking file writer alive; dropping it flushes
/// outstanding log lines to disk.
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// Initialize console plus rotating-file logging.
///
/// The returned guard must live for the duration of the program.
pub fn init_logging(settings: &LoggingSettings) -> Result<LogGuard> {
    let log_dir = expand_tilde(&settings.directory);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(level_filter(parse_level(&settings.level)));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_filter(level_filter(Level::INFO));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    cleanup_old_logs(&log_dir, settings.max_files)?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("server_backup={}", level)).add_directive(level.into())
    })
}

/// Remove rotated log files beyond the newest `max_files`
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<()> {
    let mut log_files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with(LOG_FILE_PREFIX)
        })
        .collect();

    log_files.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    for stale in log_files.into_iter().skip(max_files as usize) {
        if let Err(e) = fs::remove_file(stale.path()) {
            tracing::warn!("Failed to remove old log file {:?}: {}", stale.path(), e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn level_parsing_defaults_to_info() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }

    #[test]
    fn old_logs_cleaned_past_limit() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            let path = temp
                .path()
                .join(format!("{}.2026-08-0{}", LOG_FILE_PREFIX, i + 1));
            fs::write(&path, "line").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        cleanup_old_logs(temp.path(), 2).unwrap();

        let remaining = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(remaining, 2);
    }

    #[test]
    fn unrelated_files_survive_cleanup() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("other.txt"), "keep").unwrap();
        fs::write(
            temp.path().join(format!("{}.2026-08-01", LOG_FILE_PREFIX)),
            "log",
        )
        .unwrap();

        cleanup_old_logs(temp.path(), 0).unwrap();

        assert!(temp.path().join("other.txt").exists());
        assert!(!temp
            .path()
            .join(format!("{}.2026-08-01", LOG_FILE_PREFIX))
            .exists());
    }
}
