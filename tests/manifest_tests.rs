// Integration tests for the files manifest

use server_backup::FileManifest;
use std::fs;
use tempfile::TempDir;

#[test]
fn omitted_fields_get_documented_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("files_config.json");
    fs::write(&path, r#"{"directories": [{"source": "/etc/nginx"}]}"#).unwrap();

    let manifest = FileManifest::load(&path);
    assert_eq!(manifest.directories.len(), 1);

    let target = &manifest.directories[0];
    assert_eq!(target.name, "nginx");
    assert_eq!(target.max, 1);
    assert!(target.exclude.is_empty());
}

#[test]
fn missing_manifest_falls_back_to_empty() {
    let temp = TempDir::new().unwrap();
    let manifest = FileManifest::load(&temp.path().join("files_config.json"));
    assert!(manifest.is_empty());
}

#[test]
fn malformed_manifest_falls_back_to_empty() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("files_config.json");
    fs::write(&path, r#"{"directories": "not-a-list"}"#).unwrap();

    let manifest = FileManifest::load(&path);
    assert!(manifest.is_empty());
}

#[test]
fn mixed_manifest_resolves_both_kinds() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("files_config.json");
    fs::write(
        &path,
        r#"{
            "directories": [
                {"source": "/var/www/uploads", "name": "uploads", "max": 7, "exclude": ["cache/*", "*.tmp"]}
            ],
            "files": [
                {"source": "/etc/fstab"},
                {"source": "/etc/hosts", "max": 3}
            ]
        }"#,
    )
    .unwrap();

    let manifest = FileManifest::load(&path);
    assert_eq!(manifest.target_count(), 3);

    let dir = &manifest.directories[0];
    assert_eq!(dir.name, "uploads");
    assert_eq!(dir.max, 7);
    assert_eq!(dir.exclude, vec!["cache/*", "*.tmp"]);

    assert_eq!(manifest.files[0].name, "fstab");
    assert_eq!(manifest.files[0].max, 1);
    assert_eq!(manifest.files[1].max, 3);
}
