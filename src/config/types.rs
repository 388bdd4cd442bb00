use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root settings structure, loaded once at startup and passed by reference
/// into every component. There is no ambient global configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub mysql: MysqlSettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// General backup settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupSettings {
    /// Prefix for backup artifact names
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Gzip compression level (0-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Path to the JSON manifest declaring file/directory targets
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Cap on the whole files folder, applied after the per-target passes.
    /// 0 disables the folder-wide cap; per-target limits still apply.
    #[serde(default)]
    pub max_files_backups: u32,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            compression_level: default_compression_level(),
            manifest_path: default_manifest_path(),
            max_files_backups: 0,
        }
    }
}

/// MySQL connection and dump settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MysqlSettings {
    #[serde(default = "default_mysql_host")]
    pub host: String,

    #[serde(default = "default_mysql_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Comma-separated database names; empty means all databases
    #[serde(default)]
    pub databases: String,

    /// Dump binary to invoke (name resolved on PATH, or an absolute path)
    #[serde(default = "default_dump_command")]
    pub dump_command: String,

    /// Number of database backups to retain remotely (0 = unlimited)
    #[serde(default = "default_max_database_backups")]
    pub max_backups: u32,
}

impl MysqlSettings {
    /// Parse the comma-separated database list. Empty entries are dropped;
    /// an empty result selects the all-databases dump mode.
    pub fn database_list(&self) -> Vec<String> {
        self.databases
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for MysqlSettings {
    fn default() -> Self {
        Self {
            host: default_mysql_host(),
            user: default_mysql_user(),
            password: String::new(),
            databases: String::new(),
            dump_command: default_dump_command(),
            max_backups: default_max_database_backups(),
        }
    }
}

/// Remote storage settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteSettings {
    /// OAuth client credentials file (downloaded from the provider console)
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,

    /// Persisted session token file
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Existing remote folder id to upload into; when unset, a folder named
    /// `folder_name` is created or reused at the storage root
    #[serde(default)]
    pub folder_id: Option<String>,

    #[serde(default = "default_folder_name")]
    pub folder_name: String,

    /// Upload chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            token_file: default_token_file(),
            folder_id: None,
            folder_name: default_folder_name(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Level for the log file; the console always logs at info
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Number of rotated log files to keep
    #[serde(default = "default_log_max_files")]
    pub max_files: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            level: default_log_level(),
            max_files: default_log_max_files(),
        }
    }
}

// Default value functions

fn default_name_prefix() -> String { "server-backup".to_string() }
fn default_compression_level() -> u32 { 6 }
fn default_manifest_path() -> PathBuf { PathBuf::from("files_config.json") }
fn default_mysql_host() -> String { "localhost".to_string() }
fn default_mysql_user() -> String { "backup_user".to_string() }
fn default_dump_command() -> String { "mysqldump".to_string() }
fn default_max_database_backups() -> u32 { 50 }
fn default_credentials_file() -> PathBuf { PathBuf::from("credentials/remote.json") }
fn default_token_file() -> PathBuf { PathBuf::from("credentials/token.json") }
fn default_folder_name() -> String { "Server Backups".to_string() }
fn default_chunk_size() -> usize { 1024 * 1024 }
fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
