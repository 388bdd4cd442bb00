//! Remote retention: keep the newest N artifacts of a group, delete the rest
//!
//! The same pass runs in two places with different listings: the whole
//! `database` folder for database dumps, and a name-filtered group per
//! declared file target. Pruning must only run after the new artifact for
//! that group uploaded successfully, so a failed backup never erodes the
//! good copies that are already remote.
//!
//! Individual deletions are best-effort: a failed delete is logged and the
//! remaining candidates are still attempted. The excess artifacts simply
//! come up again on the next pass.

use crate::remote::{RemoteFile, RemoteStore, StoreError};
use tracing::{debug, info, warn};

/// The entries to delete from a newest-first listing: everything past the
/// first `max`. `max == 0` disables the policy entirely.
pub fn excess(files: &[RemoteFile], max: u32) -> &[RemoteFile] {
    if max == 0 {
        return &[];
    }
    let keep = max as usize;
    if files.len() <= keep {
        &[]
    } else {
        &files[keep..]
    }
}

/// Prune everything directly under `folder_id` down to `max` entries
pub fn prune_folder(
    store: &dyn RemoteStore,
    folder_id: &str,
    max: u32,
    label: &str,
) -> Result<usize, StoreError> {
    if max == 0 {
        debug!("Retention disabled for {}", label);
        return Ok(0);
    }
    let files = store.list_by_parent(folder_id)?;
    Ok(delete_excess(store, &files, max, label))
}

/// Prune one retention group: files under `folder_id` whose name contains
/// `group`, down to `max` entries. Groups end with a separator so that
/// logical names which prefix each other stay independent.
pub fn prune_group(
    store: &dyn RemoteStore,
    folder_id: &str,
    group: &str,
    max: u32,
) -> Result<usize, StoreError> {
    if max == 0 {
        debug!("Retention disabled for group {}", group);
        return Ok(0);
    }
    let files = store.list_by_name_contains(group, folder_id)?;
    Ok(delete_excess(store, &files, max, group))
}

fn delete_excess(store: &dyn RemoteStore, files: &[RemoteFile], max: u32, label: &str) -> usize {
    let doomed = excess(files, max);
    if doomed.is_empty() {
        debug!("{}: {}/{} backups retained", label, files.len(), max);
        return 0;
    }

    let mut deleted = 0;
    for file in doomed {
        match store.delete(&file.id) {
            Ok(()) => {
                info!("Deleted old backup: {}", file.name);
                deleted += 1;
            }
            Err(e) => {
                warn!("Failed to delete old backup {}: {}", file.name, e);
            }
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemoteStore;
    use rstest::rstest;

    fn listing(count: usize) -> Vec<RemoteFile> {
        // Index 0 is the newest, matching the store's ordering contract
        (0..count)
            .map(|i| RemoteFile {
                id: format!("id-{}", i),
                name: format!("backup-{}", i),
                created_time: format!("2026-01-{:02}T00:00:00Z", 28 - i),
            })
            .collect()
    }

    #[rstest]
    #[case(5, 3, 2)]
    #[case(4, 3, 1)]
    #[case(3, 3, 0)]
    #[case(1, 3, 0)]
    #[case(0, 3, 0)]
    #[case(10, 1, 9)]
    fn excess_counts(#[case] existing: usize, #[case] max: u32, #[case] expected: usize) {
        let files = listing(existing);
        assert_eq!(excess(&files, max).len(), expected);
    }

    #[test]
    fn excess_keeps_the_newest() {
        let files = listing(5);
        let doomed = excess(&files, 3);
        // Only the two oldest entries are selected
        assert_eq!(doomed[0].id, "id-3");
        assert_eq!(doomed[1].id, "id-4");
    }

    #[test]
    fn zero_max_disables_policy() {
        let files = listing(10);
        assert!(excess(&files, 0).is_empty());

        // The disabled policy never even lists the folder
        let store = MockRemoteStore::new();
        let deleted = prune_folder(&store, "folder", 0, "database").unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn prune_folder_deletes_beyond_max() {
        let mut store = MockRemoteStore::new();
        store
            .expect_list_by_parent()
            .withf(|folder| folder == "db-folder")
            .times(1)
            .returning(|_| Ok(listing(5)));
        store
            .expect_delete()
            .withf(|id| id == "id-3" || id == "id-4")
            .times(2)
            .returning(|_| Ok(()));

        let deleted = prune_folder(&store, "db-folder", 3, "database").unwrap();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn prune_group_lists_by_group_substring() {
        let mut store = MockRemoteStore::new();
        store
            .expect_list_by_name_contains()
            .withf(|group, folder| group == "server-backup_files_nginx_" && folder == "files-folder")
            .times(1)
            .returning(|_, _| Ok(listing(2)));
        store
            .expect_delete()
            .withf(|id| id == "id-1")
            .times(1)
            .returning(|_| Ok(()));

        let deleted = prune_group(&store, "files-folder", "server-backup_files_nginx_", 1).unwrap();
        assert_eq!(deleted, 1);
    }

    #[test]
    fn failed_delete_does_not_block_the_rest() {
        let mut store = MockRemoteStore::new();
        store
            .expect_list_by_parent()
            .returning(|_| Ok(listing(4)));
        store
            .expect_delete()
            .withf(|id| id == "id-2")
            .times(1)
            .returning(|_| {
                Err(StoreError::Api {
                    status: 500,
                    message: "backend hiccup".to_string(),
                })
            });
        store
            .expect_delete()
            .withf(|id| id == "id-3")
            .times(1)
            .returning(|_| Ok(()));

        let deleted = prune_folder(&store, "folder", 2, "database").unwrap();
        assert_eq!(deleted, 1);
    }
}
