//! Verification outcomes.
//!
//! A [`VerificationStatus`] is the expected-workflow result of checking one
//! entity; a [`ChainReport`] aggregates the statuses of every entity in an
//! ancestor chain.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use lineage_types::{ContentHash, EntityId};

/// Why an entity's content could not be checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnverifiableReason {
    /// The entity was recorded without a file path.
    NoPath,
    /// The recorded path no longer exists.
    FileMissing,
    /// The recorded path is not a regular file.
    NotAFile,
    /// The file exceeds the hashing size limit.
    TooLarge { limit: u64, size: u64 },
    /// Hashing exceeded its time budget.
    TimedOut { limit_ms: u64 },
    /// Reading the file failed (chain verification only).
    Io { message: String },
}

/// Outcome of verifying one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationStatus {
    /// The file hashes to the stored value.
    Verified,
    /// The file content changed since it was recorded.
    Mismatched {
        stored: ContentHash,
        current: ContentHash,
    },
    Unverifiable { reason: UnverifiableReason },
}

impl VerificationStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    pub fn is_mismatched(&self) -> bool {
        matches!(self, Self::Mismatched { .. })
    }

    pub fn is_unverifiable(&self) -> bool {
        matches!(self, Self::Unverifiable { .. })
    }

    pub(crate) fn unverifiable(reason: UnverifiableReason) -> Self {
        Self::Unverifiable { reason }
    }
}

/// Verification detail for a single entity.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityVerification {
    pub entity_id: EntityId,
    pub name: String,
    pub path: Option<PathBuf>,
    pub stored_hash: ContentHash,
    pub status: VerificationStatus,
    pub checked_at: DateTime<Utc>,
}

/// Aggregated verification of an entity and all of its ancestors.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChainReport {
    pub root: EntityId,
    pub verified: usize,
    pub invalid: usize,
    pub unverifiable: usize,
    /// Per-entity results in traversal order, root first.
    pub entities: Vec<EntityVerification>,
    /// The ancestor walk stopped at the node ceiling.
    pub truncated: bool,
}

impl ChainReport {
    pub(crate) fn new(root: EntityId, truncated: bool) -> Self {
        Self {
            root,
            verified: 0,
            invalid: 0,
            unverifiable: 0,
            entities: Vec::new(),
            truncated,
        }
    }

    pub(crate) fn record(&mut self, verification: EntityVerification) {
        match verification.status {
            VerificationStatus::Verified => self.verified += 1,
            VerificationStatus::Mismatched { .. } => self.invalid += 1,
            VerificationStatus::Unverifiable { .. } => self.unverifiable += 1,
        }
        self.entities.push(verification);
    }

    /// Returns `true` if no entity in the chain has changed content.
    pub fn is_intact(&self) -> bool {
        self.invalid == 0
    }

    /// Returns `true` if every entity in the chain was checked and matched.
    pub fn is_fully_verified(&self) -> bool {
        self.invalid == 0 && self.unverifiable == 0
    }

    /// Results for entities whose content changed.
    pub fn mismatches(&self) -> impl Iterator<Item = &EntityVerification> {
        self.entities.iter().filter(|v| v.status.is_mismatched())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
