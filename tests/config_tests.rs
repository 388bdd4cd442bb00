// Integration tests for settings loading and validation

use std::fs;
use tempfile::TempDir;

#[test]
fn full_settings_file_loads() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("backup-config.toml");

    let config_content = r#"
[backup]
name_prefix = "myserver"
compression_level = 9
manifest_path = "/etc/backup/files_config.json"
max_files_backups = 10

[mysql]
host = "db.internal"
user = "backup"
password = "hunter2"
databases = "wordpress,nextcloud"
max_backups = 14

[remote]
credentials_file = "/etc/backup/credentials.json"
token_file = "/etc/backup/token.json"
folder_name = "Offsite Backups"
chunk_size = 2097152

[logging]
directory = "/var/log/server-backup"
level = "debug"
max_files = 5
"#;

    fs::write(&config_path, config_content).unwrap();

    let settings = server_backup::load_settings(&config_path).unwrap();
    assert_eq!(settings.backup.name_prefix, "myserver");
    assert_eq!(settings.backup.compression_level, 9);
    assert_eq!(settings.backup.max_files_backups, 10);
    assert_eq!(settings.mysql.host, "db.internal");
    assert_eq!(settings.mysql.database_list(), vec!["wordpress", "nextcloud"]);
    assert_eq!(settings.mysql.max_backups, 14);
    assert_eq!(settings.remote.folder_name, "Offsite Backups");
    assert_eq!(settings.remote.chunk_size, 2 * 1024 * 1024);
    assert_eq!(settings.logging.level, "debug");
}

#[test]
fn sparse_settings_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("backup-config.toml");

    fs::write(&config_path, "[mysql]\nhost = \"10.0.0.5\"\n").unwrap();

    let settings = server_backup::load_settings(&config_path).unwrap();
    assert_eq!(settings.mysql.host, "10.0.0.5");
    assert_eq!(settings.mysql.user, "backup_user");
    assert_eq!(settings.backup.name_prefix, "server-backup");
    assert_eq!(settings.backup.compression_level, 6);
    assert_eq!(settings.remote.folder_name, "Server Backups");
    // Empty list selects the all-databases mode
    assert!(settings.mysql.database_list().is_empty());
}

#[test]
fn missing_settings_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = server_backup::load_settings(temp_dir.path().join("absent.toml"));
    assert!(result.is_err());
}

#[test]
fn out_of_range_compression_level_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("backup-config.toml");
    fs::write(&config_path, "[backup]\ncompression_level = 99\n").unwrap();

    let result = server_backup::load_settings(&config_path);
    assert!(result.is_err());
}

#[test]
fn malformed_toml_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("backup-config.toml");
    fs::write(&config_path, "[backup\nname_prefix =").unwrap();

    let result = server_backup::load_settings(&config_path);
    assert!(result.is_err());
}
