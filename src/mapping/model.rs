//! Mapping record

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current epoch seconds
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Link between a logical path and its copies in both stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    /// Normalized logical path, unique
    pub path: String,
    /// Current or last-known primary copy id (stale after eviction)
    pub primary_id: String,
    /// Secondary anchor; carried forward by every rewrite
    pub secondary_id: String,
    /// Auxiliary secondary reference (message id)
    pub secondary_ref: Option<i64>,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    /// Epoch seconds of the last read or restore, 0 when never accessed
    pub last_accessed: i64,
    /// Epoch seconds of the first insert
    pub created_at: i64,
    /// Whether a valid primary copy exists
    pub cached: bool,
}

impl Mapping {
    /// Fresh mapping for a file that was just written to both stores
    pub fn new_cached(
        path: &str,
        primary_id: String,
        secondary_id: String,
        secondary_ref: Option<i64>,
        file_name: &str,
        file_size: u64,
        mime_type: &str,
    ) -> Self {
        let now = now_secs();
        Self {
            path: path.to_string(),
            primary_id,
            secondary_id,
            secondary_ref,
            file_name: file_name.to_string(),
            file_size,
            mime_type: mime_type.to_string(),
            last_accessed: now,
            created_at: now,
            cached: true,
        }
    }

    /// Stored MIME type, if one was recorded
    pub fn stored_mime(&self) -> Option<&str> {
        Some(self.mime_type.as_str()).filter(|m| !m.is_empty())
    }

    pub fn stored_name(&self) -> Option<&str> {
        Some(self.file_name.as_str()).filter(|n| !n.is_empty())
    }
}
