//! Sync Engine error types

use contracts::AdapterError;
use thiserror::Error;

/// Synchronization Engine error
#[derive(Debug, Error)]
pub enum SyncError {
    /// Engine session failure; ends the tick
    #[error("adapter failure: {0}")]
    Adapter(#[from] AdapterError),

    /// Landmark mapping could not be written
    #[error("landmark mapping io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("landmark mapping encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the co-simulation has to stop
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Adapter(e) => e.is_fatal(),
            SyncError::Io(_) | SyncError::Encode(_) => true,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, SyncError>;
