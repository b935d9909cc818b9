//! Store client abstractions
//!
//! The engine only talks to the two remote stores through these traits.
//! `b2` implements [`PrimaryStore`], `telegram` implements [`SecondaryStore`].

pub mod errors;
#[cfg(test)]
pub mod fake;

pub use errors::RemoteError;

use async_trait::async_trait;

/// Kind of an entry returned by a directory listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One immediate child of a primary-store directory
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Base name (no directory components)
    pub name: String,
    pub kind: EntryKind,
    /// Store-side id, absent for directories
    pub file_id: Option<String>,
    pub size: u64,
}

impl RemoteEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// File content fetched from either store
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub bytes: Vec<u8>,
    /// MIME type reported by the store, if any
    pub mime_type: Option<String>,
}

/// Upload request for the primary store
#[derive(Debug, Clone)]
pub struct PrimaryUpload<'a> {
    /// Logical destination path
    pub path: &'a str,
    pub file_name: &'a str,
    pub file_size: u64,
    pub mime_type: &'a str,
    pub bytes: &'a [u8],
}

/// Upload request for the secondary store
#[derive(Debug, Clone)]
pub struct SecondaryUpload<'a> {
    pub bytes: &'a [u8],
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub file_size: u64,
    pub caption: Option<&'a str>,
}

/// Identity assigned by the secondary store to an uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryObject {
    pub id: String,
    pub reference: Option<i64>,
}

/// User-facing store that doubles as the cache layer
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Create `path` as a directory if it does not exist yet
    async fn ensure_directory(&self, path: &str) -> Result<(), RemoteError>;

    /// List the immediate children of `path`
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    async fn download_file(&self, file_id: &str) -> Result<RemoteFile, RemoteError>;

    /// Upload a file and return its new primary-store id
    async fn upload_file(&self, upload: PrimaryUpload<'_>) -> Result<String, RemoteError>;

    async fn delete_file(&self, path: &str) -> Result<(), RemoteError>;

    /// Public base URL that share links are built on
    fn base_url(&self) -> &str;

    /// Connection health reported by the status command
    fn health(&self) -> &'static str {
        "healthy"
    }
}

/// Append-only archive addressed by opaque ids
#[async_trait]
pub trait SecondaryStore: Send + Sync {
    async fn upload_file(&self, upload: SecondaryUpload<'_>)
        -> Result<SecondaryObject, RemoteError>;

    async fn download_file(&self, id: &str) -> Result<RemoteFile, RemoteError>;

    /// (hits, misses, hit_rate) of the client's id lookup cache, if it keeps one
    fn lookup_stats(&self) -> Option<(u64, u64, f64)> {
        None
    }
}
