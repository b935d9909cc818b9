//! Download proxy
//!
//! Serves bytes for a logical path, preferring the primary copy and
//! restoring it from the secondary store on a miss.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::naming::FALLBACK_NAME;
use super::{BridgeError, Context, DEFAULT_MIME};
use crate::mapping::{now_secs, paths, Mapping};
use crate::remote::{PrimaryUpload, RemoteError, RemoteFile};

/// Which store served a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Primary,
    Secondary,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Primary => write!(f, "primary"),
            Source::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub source: Source,
}

pub struct DownloadProxy {
    ctx: Arc<Context>,
}

impl DownloadProxy {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn download(&self, path: &str) -> Result<DownloadedFile, BridgeError> {
        let path = paths::normalize(path);
        let mapping = self
            .ctx
            .store
            .get_by_path(&path)?
            .ok_or_else(|| BridgeError::NotFound(path.clone()))?;
        self.ctx.store.touch(&path)?;

        let mut tried = None;
        if mapping.cached {
            if let Some(file) = self.try_primary(&mapping).await {
                return Ok(file);
            }
            tried = Some(mapping.primary_id);
        }

        self.restore(&path, tried.as_deref()).await
    }

    /// Cache hit attempt; `None` on any failure so the caller can restore
    async fn try_primary(&self, mapping: &Mapping) -> Option<DownloadedFile> {
        match self.ctx.primary.download_file(&mapping.primary_id).await {
            Ok(fetched) => {
                debug!(path = %mapping.path, "Served from primary store");
                Some(served(mapping, fetched, Source::Primary))
            }
            Err(e) => {
                warn!(
                    path = %mapping.path,
                    file_id = %mapping.primary_id,
                    error = %e,
                    "Primary copy unavailable, restoring from secondary store"
                );
                None
            }
        }
    }

    /// `tried` is the primary id that already failed for this request
    async fn restore(
        &self,
        path: &str,
        tried: Option<&str>,
    ) -> Result<DownloadedFile, BridgeError> {
        let _guard = self.ctx.locks.lock(path).await;

        let mapping = self
            .ctx
            .store
            .get_by_path(path)?
            .ok_or_else(|| BridgeError::NotFound(path.to_string()))?;

        // Another request may have restored it while we waited
        if mapping.cached && tried != Some(mapping.primary_id.as_str()) {
            if let Some(file) = self.try_primary(&mapping).await {
                return Ok(file);
            }
        }

        let fetched = self.ctx.secondary.download_file(&mapping.secondary_id).await?;
        let file = served(&mapping, fetched, Source::Secondary);

        match self.reupload(&mapping, &file).await {
            Ok(primary_id) => {
                // Record the metadata the fresh copy was written with
                let restored = Mapping {
                    primary_id,
                    cached: true,
                    last_accessed: now_secs(),
                    file_name: file.file_name.clone(),
                    file_size: file.bytes.len() as u64,
                    mime_type: file.mime_type.clone(),
                    ..mapping
                };
                self.ctx.store.upsert(&restored)?;
                info!(path = path, size = restored.file_size, "Restored primary copy");
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to restore primary copy");
                self.ctx.store.mark_evicted(path)?;
            }
        }

        Ok(file)
    }

    async fn reupload(
        &self,
        mapping: &Mapping,
        file: &DownloadedFile,
    ) -> Result<String, RemoteError> {
        self.ctx
            .primary
            .ensure_directory(paths::parent(&mapping.path))
            .await?;
        self.ctx
            .primary
            .upload_file(PrimaryUpload {
                path: &mapping.path,
                file_name: &file.file_name,
                file_size: file.bytes.len() as u64,
                mime_type: &file.mime_type,
                bytes: &file.bytes,
            })
            .await
    }
}

/// Stored name and MIME win over whatever the store reports
fn served(mapping: &Mapping, fetched: RemoteFile, source: Source) -> DownloadedFile {
    let mime_type = mapping
        .stored_mime()
        .map(str::to_string)
        .or(fetched.mime_type)
        .unwrap_or_else(|| DEFAULT_MIME.to_string());
    let file_name = mapping.stored_name().unwrap_or(FALLBACK_NAME).to_string();
    DownloadedFile {
        bytes: fetched.bytes,
        file_name,
        mime_type,
        source,
    }
}
