//! IPC protocol definitions
//!
//! Newline-delimited JSON exchanged with local clients over a Unix domain
//! socket. Every command gets exactly one response line.

use serde::{Deserialize, Serialize};

use crate::bridge::ImportRequest;
use crate::mapping::Mapping;

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Page size for `listMappings` when the client does not pass one
pub const DEFAULT_LIST_LIMIT: u32 = 100;

fn default_limit() -> u32 {
    DEFAULT_LIST_LIMIT
}

/// Commands sent by local clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Back up a primary directory (the configured sync root when omitted)
    #[serde(rename_all = "camelCase")]
    Sync {
        #[serde(default)]
        dir: Option<String>,
    },
    /// Fetch a file by logical path, restoring it if evicted
    #[serde(rename_all = "camelCase")]
    Download { path: String },
    /// Copy a file from the secondary store into the inbox
    Import(ImportRequest),
    /// Run an eviction pass now
    Evict,
    /// Get daemon status and mapping counts
    GetStatus,
    /// Page through mappings, newest first
    #[serde(rename_all = "camelCase")]
    ListMappings {
        #[serde(default = "default_limit")]
        limit: u32,
        #[serde(default)]
        offset: u32,
    },
}

/// Responses sent back to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    Error {
        error: String,
        /// True when the path has no mapping
        not_found: bool,
    },
    #[serde(rename_all = "camelCase")]
    Status {
        version: u32,
        healthy: bool,
        primary_health: String,
        mappings: u64,
        cached: u64,
        eviction_running: bool,
        sync_running: bool,
        locked_paths: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_path_cache: Option<CacheStats>,
    },
    #[serde(rename_all = "camelCase")]
    Synced {
        dir: String,
        synced: u32,
        skipped: u32,
        errors: u32,
    },
    #[serde(rename_all = "camelCase")]
    Evicted { evicted: u32, errors: u32 },
    /// File contents, base64 encoded
    #[serde(rename_all = "camelCase")]
    File {
        path: String,
        file_name: String,
        mime_type: String,
        size: u64,
        source: String,
        data: String,
    },
    #[serde(rename_all = "camelCase")]
    Imported {
        path: String,
        secondary_id: String,
        link: String,
        already_present: bool,
    },
    #[serde(rename_all = "camelCase")]
    Mappings {
        total: u64,
        mappings: Vec<MappingInfo>,
    },
}

/// Hit counters of the secondary client's file path cache
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl From<(u64, u64, f64)> for CacheStats {
    fn from((hits, misses, hit_rate): (u64, u64, f64)) -> Self {
        Self {
            hits,
            misses,
            hit_rate,
        }
    }
}

/// Mapping summary for list responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingInfo {
    pub path: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub cached: bool,
    pub last_accessed: i64,
    pub created_at: i64,
}

impl From<&Mapping> for MappingInfo {
    fn from(m: &Mapping) -> Self {
        Self {
            path: m.path.clone(),
            file_name: m.file_name.clone(),
            file_size: m.file_size,
            mime_type: m.mime_type.clone(),
            cached: m.cached,
            last_accessed: m.last_accessed,
            created_at: m.created_at,
        }
    }
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n'); // Add newline delimiter
    Ok(json)
}
