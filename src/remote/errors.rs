//! Upstream error classification shared by both store clients

/// Failure of a single call to a remote store
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Target object or directory does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Call failed but the client itself is usable (network, 5xx, rate limit)
    #[error("Transient upstream failure: {0}")]
    Transient(String),

    /// Client cannot work at all (bad credentials, missing bucket or chat)
    #[error("Permanent upstream failure: {0}")]
    Permanent(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}
