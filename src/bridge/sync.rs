//! Sync engine
//!
//! Backs up files that appear in a primary-store directory to the secondary
//! store. A file counts as backed up as soon as any mapping exists for its
//! path, whatever its cache state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::guard::PassGuard;
use super::{BridgeError, Context, DEFAULT_MIME};
use crate::mapping::{paths, Mapping};
use crate::remote::{RemoteEntry, RemoteError, SecondaryUpload};

/// Outcome of one directory sync
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced: u32,
    /// Files that already had a mapping
    pub skipped: u32,
    pub errors: u32,
}

pub struct SyncEngine {
    ctx: Arc<Context>,
    /// Guards scheduled passes; ad-hoc syncs rely on the path locks only
    pass_guard: PassGuard,
}

impl SyncEngine {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            pass_guard: PassGuard::new(),
        }
    }

    /// Back up every unmapped file directly inside `dir`
    ///
    /// Per-file failures are counted in the report; only a failure to reach
    /// the directory itself is returned as an error.
    pub async fn sync_directory(&self, dir: &str) -> Result<SyncReport, BridgeError> {
        let dir = paths::normalize(dir);
        self.ctx.primary.ensure_directory(&dir).await?;
        let entries = self.ctx.primary.list_directory(&dir).await?;

        let mut report = SyncReport::default();
        for entry in entries.iter().filter(|e| e.is_file()) {
            let path = paths::join(&dir, &entry.name);
            match self.sync_file(&path, entry).await {
                Ok(true) => report.synced += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.errors += 1;
                    warn!(path = %path, error = %e, "Failed to sync file");
                }
            }
        }

        info!(
            dir = %dir,
            synced = report.synced,
            skipped = report.skipped,
            errors = report.errors,
            "Directory sync finished"
        );
        Ok(report)
    }

    /// Scheduled variant of [`sync_directory`](Self::sync_directory) that
    /// refuses to overlap with itself
    pub async fn run_sync_pass(&self, dir: &str) -> Result<SyncReport, BridgeError> {
        let _ticket = self
            .pass_guard
            .try_begin()
            .ok_or(BridgeError::PassInProgress("sync"))?;
        self.sync_directory(dir).await
    }

    pub fn is_pass_running(&self) -> bool {
        self.pass_guard.is_running()
    }

    /// Returns `Ok(false)` when the path was already mapped
    async fn sync_file(&self, path: &str, entry: &RemoteEntry) -> Result<bool, BridgeError> {
        // Held across check, upload and upsert so concurrent triggers
        // cannot both archive the same path
        let _guard = self.ctx.locks.lock(path).await;

        if self.ctx.store.get_by_path(path)?.is_some() {
            debug!(path = path, "Already backed up");
            return Ok(false);
        }

        let file_id = entry
            .file_id
            .as_deref()
            .ok_or_else(|| RemoteError::NotFound(format!("no file id listed for {}", path)))?;

        let fetched = self.ctx.primary.download_file(file_id).await?;
        let mime_type = fetched
            .mime_type
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let file_size = fetched.bytes.len() as u64;

        let archived = self
            .ctx
            .secondary
            .upload_file(SecondaryUpload {
                bytes: &fetched.bytes,
                file_name: &entry.name,
                mime_type: &mime_type,
                file_size,
                caption: Some(path),
            })
            .await?;

        let mapping = Mapping::new_cached(
            path,
            file_id.to_string(),
            archived.id,
            archived.reference,
            &entry.name,
            file_size,
            &mime_type,
        );
        self.ctx.store.upsert(&mapping)?;

        info!(path = path, size = file_size, "Backed up file to secondary store");
        Ok(true)
    }
}
