//! Blocking client for the Drive-style remote storage REST API

use super::auth::{Authenticator, CodeSource, StoredToken};
use super::{RemoteFile, RemoteStore, StoreError};
use crate::config::RemoteSettings;
use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use serde::Deserialize;
use serde_json::json;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Chunk sizes must be a multiple of this; the configured value is rounded
/// down (but never below one unit)
const CHUNK_UNIT: usize = 256 * 1024;

/// Single page cap for listings; retention groups stay far below this
const LIST_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "createdTime")]
    created_time: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileResource>,
}

/// Remote storage client. Holds the session token in memory after
/// [`authenticate`](DriveClient::authenticate); all other state lives on
/// the remote side.
pub struct DriveClient {
    settings: RemoteSettings,
    http: Client,
    token: Option<StoredToken>,
}

impl DriveClient {
    pub fn new(settings: RemoteSettings) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            settings,
            http,
            token: None,
        }
    }

    /// Establish a usable session: obtain a token (stored, refreshed, or via
    /// the interactive flow driven by `codes`) and verify it against the
    /// API. Safe to call once per run; a second call re-validates.
    pub fn authenticate(&mut self, codes: &dyn CodeSource) -> Result<(), StoreError> {
        let authenticator = Authenticator::new(&self.settings);
        let token = authenticator.obtain_token(codes)?;
        self.token = Some(token);
        self.verify_session()?;
        info!("Authenticated with remote storage");
        Ok(())
    }

    fn verify_session(&self) -> Result<(), StoreError> {
        let response = self
            .http
            .get(format!("{}/about", API_BASE))
            .bearer_auth(self.access_token()?)
            .query(&[("fields", "user")])
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: format!(
                    "session verification failed: {}",
                    response.text().unwrap_or_default()
                ),
            });
        }
        Ok(())
    }

    fn access_token(&self) -> Result<&str, StoreError> {
        self.token
            .as_ref()
            .map(|t| t.access_token.as_str())
            .ok_or(StoreError::NotAuthenticated)
    }

    fn list_files(&self, query: &str) -> Result<Vec<RemoteFile>, StoreError> {
        let page_size = LIST_PAGE_SIZE.to_string();
        let response = self
            .http
            .get(format!("{}/files", API_BASE))
            .bearer_auth(self.access_token()?)
            .query(&[
                ("q", query),
                ("orderBy", "createdTime desc"),
                ("fields", "files(id,name,createdTime)"),
                ("pageSize", page_size.as_str()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        let list: FileList = response.json()?;
        Ok(list
            .files
            .into_iter()
            .map(|f| RemoteFile {
                id: f.id,
                name: f.name,
                created_time: f.created_time,
            })
            .collect())
    }

    fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<String, StoreError> {
        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent_id) = parent {
            metadata["parents"] = json!([parent_id]);
        }

        let response = self
            .http
            .post(format!("{}/files", API_BASE))
            .bearer_auth(self.access_token()?)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        let created: FileResource = response.json()?;
        info!("Created remote folder: {}", name);
        Ok(created.id)
    }

    /// Open a resumable upload session and return the session URL
    fn open_upload_session(
        &self,
        file_name: &str,
        folder_id: &str,
        total_size: u64,
    ) -> Result<String, StoreError> {
        let metadata = json!({
            "name": file_name,
            "parents": [folder_id],
        });

        let response = self
            .http
            .post(format!("{}/files?uploadType=resumable", UPLOAD_BASE))
            .bearer_auth(self.access_token()?)
            .header("X-Upload-Content-Length", total_size)
            .json(&metadata)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Upload {
                name: file_name.to_string(),
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Upload {
                name: file_name.to_string(),
                status: status.as_u16(),
                message: "upload session response carried no location".to_string(),
            })
    }

    fn upload_chunks(
        &self,
        session_url: &str,
        file: &mut File,
        file_name: &str,
        total_size: u64,
    ) -> Result<String, StoreError> {
        // Zero-byte files finalize with a single empty request
        if total_size == 0 {
            let response = self
                .http
                .put(session_url)
                .header("Content-Range", "bytes */0")
                .body(Vec::new())
                .send()?;
            return finish_upload(response, file_name);
        }

        let chunk_size = effective_chunk_size(self.settings.chunk_size);
        let mut buffer = vec![0u8; chunk_size];
        let mut offset: u64 = 0;

        loop {
            let read = read_chunk(file, &mut buffer)?;
            if read == 0 {
                return Err(StoreError::Upload {
                    name: file_name.to_string(),
                    status: 0,
                    message: format!(
                        "file ended at byte {} but {} bytes were announced",
                        offset, total_size
                    ),
                });
            }

            let range = content_range(offset, read, total_size);
            let response = self
                .http
                .put(session_url)
                .header("Content-Range", range)
                .body(buffer[..read].to_vec())
                .send()?;

            offset += read as u64;
            let status = response.status();

            // 308 means the backend stored this chunk and expects more
            if status.as_u16() == 308 {
                debug!(
                    "Upload progress for {}: {}%",
                    file_name,
                    offset * 100 / total_size
                );
                continue;
            }

            return finish_upload(response, file_name);
        }
    }
}

fn finish_upload(
    response: reqwest::blocking::Response,
    file_name: &str,
) -> Result<String, StoreError> {
    let status = response.status();
    if !status.is_success() {
        return Err(StoreError::Upload {
            name: file_name.to_string(),
            status: status.as_u16(),
            message: response.text().unwrap_or_default(),
        });
    }
    let created: FileResource = response.json()?;
    Ok(created.id)
}

impl RemoteStore for DriveClient {
    fn ensure_folder<'a>(&self, name: &str, parent: Option<&'a str>) -> Result<String, StoreError> {
        let query = folder_query(name, parent);
        let existing = self.list_files(&query)?;
        if let Some(folder) = existing.into_iter().next() {
            debug!("Reusing remote folder '{}' ({})", name, folder.id);
            return Ok(folder.id);
        }
        self.create_folder(name, parent)
    }

    fn upload(&self, local_path: &Path, folder_id: &str) -> Result<String, StoreError> {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| local_path.display().to_string());
        let total_size = std::fs::metadata(local_path)?.len();

        info!("Uploading {} ({} bytes)", file_name, total_size);
        let session_url = self.open_upload_session(&file_name, folder_id, total_size)?;

        let mut file = File::open(local_path)?;
        let id = self.upload_chunks(&session_url, &mut file, &file_name, total_size)?;
        info!("Uploaded {}", file_name);
        Ok(id)
    }

    fn list_by_parent(&self, folder_id: &str) -> Result<Vec<RemoteFile>, StoreError> {
        let query = format!(
            "'{}' in parents and trashed=false",
            escape_query_value(folder_id)
        );
        self.list_files(&query)
    }

    fn list_by_name_contains(
        &self,
        substring: &str,
        folder_id: &str,
    ) -> Result<Vec<RemoteFile>, StoreError> {
        let query = format!(
            "name contains '{}' and '{}' in parents and trashed=false",
            escape_query_value(substring),
            escape_query_value(folder_id)
        );
        self.list_files(&query)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .http
            .delete(format!("{}/files/{}", API_BASE, id))
            .bearer_auth(self.access_token()?)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Search expression for a live folder with an exact name, optionally
/// scoped to a parent
fn folder_query(name: &str, parent: Option<&str>) -> String {
    let mut query = format!(
        "name='{}' and mimeType='{}' and trashed=false",
        escape_query_value(name),
        FOLDER_MIME_TYPE
    );
    if let Some(parent_id) = parent {
        query.push_str(&format!(" and '{}' in parents", escape_query_value(parent_id)));
    }
    query
}

/// Escape a value for embedding in a single-quoted query string
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Round the configured chunk size down to the nearest accepted multiple
fn effective_chunk_size(configured: usize) -> usize {
    let rounded = configured / CHUNK_UNIT * CHUNK_UNIT;
    rounded.max(CHUNK_UNIT)
}

/// `Content-Range` header value for a chunk of `len` bytes at `offset`
fn content_range(offset: u64, len: usize, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, offset + len as u64 - 1, total)
}

/// Read until the buffer is full or the file ends
fn read_chunk(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_query_without_parent() {
        let query = folder_query("Server Backups", None);
        assert_eq!(
            query,
            "name='Server Backups' and mimeType='application/vnd.google-apps.folder' and trashed=false"
        );
    }

    #[test]
    fn folder_query_with_parent() {
        let query = folder_query("database", Some("root-1"));
        assert!(query.ends_with("and 'root-1' in parents"));
    }

    #[test]
    fn query_values_are_escaped() {
        assert_eq!(escape_query_value("o'brien"), "o\\'brien");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
    }

    #[test]
    fn chunk_size_rounds_to_unit() {
        assert_eq!(effective_chunk_size(1024 * 1024), 1024 * 1024);
        assert_eq!(effective_chunk_size(1024 * 1024 + 5), 1024 * 1024);
        // Too small still yields one full unit
        assert_eq!(effective_chunk_size(10), CHUNK_UNIT);
    }

    #[test]
    fn content_range_is_inclusive() {
        assert_eq!(content_range(0, 256, 1000), "bytes 0-255/1000");
        assert_eq!(content_range(768, 232, 1000), "bytes 768-999/1000");
    }

    #[test]
    fn store_operations_require_authentication() {
        let client = DriveClient::new(RemoteSettings::default());
        assert!(matches!(
            client.access_token(),
            Err(StoreError::NotAuthenticated)
        ));
    }
}
