//! Engine error taxonomy

use crate::mapping::StoreError;
use crate::remote::RemoteError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No mapping exists for the requested path
    #[error("No mapping for path: {0}")]
    NotFound(String),

    /// A remote call failed where no fallback applies
    #[error(transparent)]
    Upstream(#[from] RemoteError),

    #[error("Mapping store failure: {0}")]
    Store(#[from] StoreError),

    /// A pass of the same kind is already running
    #[error("A {0} pass is already in progress")]
    PassInProgress(&'static str),
}

impl BridgeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound(_))
    }
}
