use std::io;

use lineage_store::StoreError;
use lineage_types::{EntityId, NodeRef};

/// Errors that abort a verification request.
///
/// Hash mismatches and unreadable files are not errors; they are
/// reported as a [`VerificationStatus`](crate::VerificationStatus).
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The entity to verify does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// A record referenced by the ancestor chain is missing from the store.
    #[error("missing record in lineage chain: {0}")]
    MissingRecord(NodeRef),

    /// Reading the entity's file failed for a reason other than absence.
    #[error("I/O error verifying entity {entity}: {source}")]
    Io {
        entity: EntityId,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
