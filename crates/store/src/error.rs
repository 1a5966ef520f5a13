//! Store-level errors.

use tasksync_core::{ExtensionRecordId, SyncError};

/// Error raised by the local persistence collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(ExtensionRecordId),
    #[error("owner isolation violation")]
    OwnerIsolation,
    #[error("record already exists: {0}")]
    AlreadyExists(ExtensionRecordId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        SyncError::store(value.to_string())
    }
}
