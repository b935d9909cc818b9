//! Import engine
//!
//! Files that arrive on the secondary store first are copied into the
//! primary inbox and linked, so they become browsable and shareable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::naming::{sanitize_file_name, share_link};
use super::{BridgeError, Context, DEFAULT_MIME};
use crate::mapping::{paths, Mapping};
use crate::remote::PrimaryUpload;

/// A file already sitting on the secondary store
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub secondary_id: String,
    #[serde(default)]
    pub secondary_ref: Option<i64>,
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Size announced by the sender; the downloaded length wins
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub path: String,
    pub secondary_id: String,
    pub link: String,
    /// True when the path was already mapped and nothing was transferred
    pub already_present: bool,
}

pub struct ImportEngine {
    ctx: Arc<Context>,
    inbox_root: String,
}

impl ImportEngine {
    pub fn new(ctx: Arc<Context>, inbox_root: &str) -> Self {
        Self {
            ctx,
            inbox_root: paths::normalize(inbox_root),
        }
    }

    pub async fn import_file(
        &self,
        request: &ImportRequest,
    ) -> Result<ImportOutcome, BridgeError> {
        let name = sanitize_file_name(&request.file_name);
        let path = paths::join(&self.inbox_root, &name);
        let link = share_link(self.ctx.primary.base_url(), &path);

        let _guard = self.ctx.locks.lock(&path).await;

        if let Some(existing) = self.ctx.store.get_by_path(&path)? {
            debug!(path = %path, "Import target already mapped");
            return Ok(ImportOutcome {
                path,
                secondary_id: existing.secondary_id,
                link,
                already_present: true,
            });
        }

        self.ctx.primary.ensure_directory(&self.inbox_root).await?;
        let fetched = self
            .ctx
            .secondary
            .download_file(&request.secondary_id)
            .await?;
        let mime_type = request
            .mime_type
            .clone()
            .or(fetched.mime_type)
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let file_size = fetched.bytes.len() as u64;
        if let Some(announced) = request.file_size {
            if announced != file_size {
                debug!(path = %path, announced, actual = file_size, "Announced size differs");
            }
        }

        let primary_id = self
            .ctx
            .primary
            .upload_file(PrimaryUpload {
                path: &path,
                file_name: &name,
                file_size,
                mime_type: &mime_type,
                bytes: &fetched.bytes,
            })
            .await?;

        let mapping = Mapping::new_cached(
            &path,
            primary_id,
            request.secondary_id.clone(),
            request.secondary_ref,
            &name,
            file_size,
            &mime_type,
        );
        self.ctx.store.upsert(&mapping)?;

        info!(path = %path, size = file_size, "Imported file into primary store");
        Ok(ImportOutcome {
            path,
            secondary_id: request.secondary_id.clone(),
            link,
            already_present: false,
        })
    }
}
