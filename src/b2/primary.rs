//! B2 bucket as the primary store
//!
//! Logical paths map to object keys without the leading slash. Directories
//! are virtual; empty ones are kept alive by zero-byte `dir/` markers.

use std::future::Future;

use async_trait::async_trait;
use tracing::debug;

use super::client::B2Client;
use super::errors::B2Error;
use crate::mapping::paths;
use crate::remote::{PrimaryStore, PrimaryUpload, RemoteEntry, RemoteError, RemoteFile};

/// Listing prefix for a directory (`None` for the bucket root)
fn dir_prefix(path: &str) -> Option<String> {
    let key = paths::to_key(path).trim_end_matches('/');
    if key.is_empty() {
        None
    } else {
        Some(format!("{}/", key))
    }
}

/// Delete versions newest first until `find` comes back empty, so an older
/// version never resurfaces as the live file. Returns how many were deleted.
async fn delete_versions<F, FFut, D, DFut>(mut find: F, mut delete: D) -> Result<u32, B2Error>
where
    F: FnMut() -> FFut,
    FFut: Future<Output = Result<Option<String>, B2Error>>,
    D: FnMut(String) -> DFut,
    DFut: Future<Output = Result<(), B2Error>>,
{
    let mut deleted = 0;
    let mut last: Option<String> = None;
    while let Some(file_id) = find().await? {
        // The listing still shows a version we just deleted
        if last.as_deref() == Some(file_id.as_str()) {
            break;
        }
        delete(file_id.clone()).await?;
        last = Some(file_id);
        deleted += 1;
    }
    Ok(deleted)
}

#[async_trait]
impl PrimaryStore for B2Client {
    async fn ensure_directory(&self, path: &str) -> Result<(), RemoteError> {
        let Some(prefix) = dir_prefix(path) else {
            return Ok(());
        };
        if self.prefix_exists(&prefix).await? {
            return Ok(());
        }
        debug!(path = path, "Creating folder marker");
        self.create_folder(&prefix).await?;
        Ok(())
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let prefix = dir_prefix(path);
        let files = self
            .list_file_names(prefix.as_deref(), Some("/"))
            .await?;

        Ok(files
            .iter()
            // The folder marker of the listed directory itself
            .filter(|f| Some(f.file_name.as_str()) != prefix.as_deref())
            .filter(|f| f.action != "hide")
            .map(|f| f.to_entry())
            .collect())
    }

    async fn download_file(&self, file_id: &str) -> Result<RemoteFile, RemoteError> {
        let (bytes, mime_type) = self.download_file_by_id(file_id).await?;
        Ok(RemoteFile { bytes, mime_type })
    }

    async fn upload_file(&self, upload: PrimaryUpload<'_>) -> Result<String, RemoteError> {
        let info = B2Client::upload_file(
            self,
            paths::to_key(upload.path),
            upload.bytes,
            upload.mime_type,
        )
        .await?;
        info.file_id
            .ok_or_else(|| RemoteError::Transient("B2 upload response without fileId".into()))
    }

    async fn delete_file(&self, path: &str) -> Result<(), RemoteError> {
        let key = paths::to_key(path);
        let find = move || async move {
            match self.find_file(key).await {
                Ok(file) => Ok(file.file_id),
                Err(B2Error::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        };
        let delete =
            move |file_id: String| async move { self.delete_file_version(key, &file_id).await };

        match delete_versions(find, delete).await? {
            0 => Err(RemoteError::NotFound(path.to_string())),
            1 => Ok(()),
            n => {
                debug!(path = path, versions = n, "Deleted older versions too");
                Ok(())
            }
        }
    }

    fn base_url(&self) -> &str {
        self.public_url()
    }

    fn health(&self) -> &'static str {
        self.health_status()
    }
}
