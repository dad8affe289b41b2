//! Errors from training and recommendation

use thiserror::Error;
use vouch_core::ValidationError;
use vouch_store::StoreError;

/// Errors from a judgment-training unit
///
/// Any of these aborts the whole unit; callers retry it from the start.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Invalid judgment: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TrainError {
    /// Whether retrying the unit may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TrainError::Validation(_) => false,
            TrainError::Store(e) => e.is_transient(),
        }
    }
}

/// Errors from a recommendation request
///
/// Degraded sub-fetches are not errors; only bad input and failures of the
/// final item resolution surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
