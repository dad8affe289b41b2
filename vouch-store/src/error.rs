//! Store errors

use thiserror::Error;

/// Errors from store and provider operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}
