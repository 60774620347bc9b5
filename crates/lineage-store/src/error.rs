use std::io;

use lineage_types::{ActivityId, ActivityStatus};

/// Errors from lineage store operations.
///
/// Unknown ids are never errors: lookups return `Ok(None)` and
/// updates/deletes return `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The request references missing records or carries malformed
    /// fields. Nothing was persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The activity already reached a terminal status.
    #[error("activity {id} is already {status}")]
    ActivityFinalized {
        id: ActivityId,
        status: ActivityStatus,
    },

    /// I/O error from the journal file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A writer panicked while holding the state lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
