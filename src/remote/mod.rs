//! Remote storage abstraction
//!
//! The orchestrator talks to remote storage through the [`RemoteStore`]
//! trait so backup flows can be exercised against a test double. The real
//! implementation is [`drive::DriveClient`], a blocking HTTP client for a
//! Drive-style REST API (folder hierarchy, resumable chunked uploads,
//! creation-time-ordered listings, delete by id).

pub mod auth;
pub mod drive;

pub use auth::{AuthError, CodeSource};
pub use drive::DriveClient;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not authenticated with remote storage")]
    NotAuthenticated,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("remote storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote storage API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("upload of '{name}' failed (status {status}): {message}")]
    Upload {
        name: String,
        status: u16,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One remote artifact as returned by the listing operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    /// RFC 3339 creation time, as reported by the storage backend
    pub created_time: String,
}

/// Operations the backup flows need from a storage backend.
///
/// Listings are ordered newest-first by creation time; uploaded filenames
/// additionally embed a `%Y%m%d_%H%M%S` timestamp so chronological order
/// can be recovered from names alone if a backend ever reports unordered
/// results.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteStore {
    /// Look up a folder by exact name under `parent` (storage root when
    /// `None`), ignoring trashed entries; create it when absent. Returns
    /// the folder id either way.
    fn ensure_folder<'a>(&self, name: &str, parent: Option<&'a str>)
        -> Result<String, StoreError>;

    /// Upload a local file into `folder_id`, returning the new remote id.
    /// Transport failures are not retried here; the caller decides.
    fn upload(&self, local_path: &std::path::Path, folder_id: &str) -> Result<String, StoreError>;

    /// List files directly under `folder_id`, newest first.
    fn list_by_parent(&self, folder_id: &str) -> Result<Vec<RemoteFile>, StoreError>;

    /// List files under `folder_id` whose name contains `substring`,
    /// newest first. Used for per-target retention groups.
    fn list_by_name_contains(
        &self,
        substring: &str,
        folder_id: &str,
    ) -> Result<Vec<RemoteFile>, StoreError>;

    /// Permanently delete a file by id.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Remote folder ids for one orchestration run.
///
/// Held in memory only; nothing about the folder hierarchy is persisted
/// between runs.
#[derive(Debug, Clone)]
pub struct FolderLayout {
    pub root: String,
    pub database: String,
    pub files: String,
}

impl FolderLayout {
    /// Resolve the root/database/files hierarchy, creating folders as
    /// needed. A configured `folder_id` is trusted as the root; otherwise
    /// the configured folder name is looked up or created at the root of
    /// the storage.
    pub fn ensure(
        store: &dyn RemoteStore,
        settings: &crate::config::RemoteSettings,
    ) -> Result<Self, StoreError> {
        let root = match &settings.folder_id {
            Some(id) => id.clone(),
            None => store.ensure_folder(&settings.folder_name, None)?,
        };
        let database = store.ensure_folder("database", Some(&root))?;
        let files = store.ensure_folder("files", Some(&root))?;
        Ok(Self {
            root,
            database,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteSettings;

    #[test]
    fn layout_creates_hierarchy_from_folder_name() {
        let mut store = MockRemoteStore::new();
        store
            .expect_ensure_folder()
            .withf(|name, parent| name == "Server Backups" && parent.is_none())
            .times(1)
            .returning(|_, _| Ok("root-id".to_string()));
        store
            .expect_ensure_folder()
            .withf(|name, parent| name == "database" && *parent == Some("root-id"))
            .times(1)
            .returning(|_, _| Ok("db-id".to_string()));
        store
            .expect_ensure_folder()
            .withf(|name, parent| name == "files" && *parent == Some("root-id"))
            .times(1)
            .returning(|_, _| Ok("files-id".to_string()));

        let layout = FolderLayout::ensure(&store, &RemoteSettings::default()).unwrap();
        assert_eq!(layout.root, "root-id");
        assert_eq!(layout.database, "db-id");
        assert_eq!(layout.files, "files-id");
    }

    #[test]
    fn layout_reuses_configured_folder_id() {
        let mut store = MockRemoteStore::new();
        store
            .expect_ensure_folder()
            .withf(|name, parent| name == "database" && *parent == Some("preset"))
            .times(1)
            .returning(|_, _| Ok("db-id".to_string()));
        store
            .expect_ensure_folder()
            .withf(|name, parent| name == "files" && *parent == Some("preset"))
            .times(1)
            .returning(|_, _| Ok("files-id".to_string()));

        let settings = RemoteSettings {
            folder_id: Some("preset".to_string()),
            ..RemoteSettings::default()
        };
        let layout = FolderLayout::ensure(&store, &settings).unwrap();
        assert_eq!(layout.root, "preset");
    }
}
