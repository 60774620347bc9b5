use std::io;

use chrono::Utc;
use tracing::{debug, info};

use lineage_crypto::{ContentHasher, HashError, HashLimits};
use lineage_graph::{LineageTraversal, TraversalLimits};
use lineage_store::LineageStore;
use lineage_types::{Entity, EntityId, NodeRef};

use crate::error::{VerifyError, VerifyResult};
use crate::report::{ChainReport, EntityVerification, UnverifiableReason, VerificationStatus};

/// Recomputes content hashes of recorded files and compares them with the
/// hashes stored at recording time.
pub struct Verifier<'a, S: LineageStore + ?Sized> {
    store: &'a S,
    hasher: ContentHasher,
    traversal: TraversalLimits,
}

impl<'a, S: LineageStore + ?Sized> Verifier<'a, S> {
    /// A verifier with default hashing and traversal limits.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            hasher: ContentHasher::default(),
            traversal: TraversalLimits::default(),
        }
    }

    pub fn with_hash_limits(mut self, limits: HashLimits) -> Self {
        self.hasher = ContentHasher::new(limits);
        self
    }

    pub fn with_traversal_limits(mut self, limits: TraversalLimits) -> Self {
        self.traversal = limits;
        self
    }

    /// Check one entity's file against its stored hash.
    pub fn verify_entity(&self, id: &EntityId) -> VerifyResult<EntityVerification> {
        let entity = self
            .store
            .get_entity(id)?
            .ok_or(VerifyError::EntityNotFound(*id))?;
        let status = self.check(&entity)?;
        debug!(entity = %entity.summary(), ?status, "verified entity");
        Ok(verification(entity, status))
    }

    /// Verify an entity and every entity among its ancestors.
    ///
    /// The chain and its records come from one consistent view of the
    /// store; files are hashed afterwards, outside the store lock. Read
    /// failures are recorded per entity. Only a missing store record
    /// aborts the run.
    pub fn verify_chain(&self, id: &EntityId) -> VerifyResult<ChainReport> {
        let graph = LineageTraversal::new(self.store, self.traversal.clone()).ancestors(id, None)?;
        if graph.is_empty() {
            return Err(VerifyError::MissingRecord(NodeRef::Entity(*id)));
        }
        if let Some(missing) = graph.dangling().first() {
            return Err(VerifyError::MissingRecord(*missing));
        }

        let mut report = ChainReport::new(*id, graph.is_truncated());
        for entity in graph.entities() {
            let status = match self.check(entity) {
                Ok(status) => status,
                Err(VerifyError::Io { source, .. }) => {
                    VerificationStatus::unverifiable(UnverifiableReason::Io {
                        message: source.to_string(),
                    })
                }
                Err(e) => return Err(e),
            };
            report.record(verification(entity.clone(), status));
        }

        info!(
            root = %id,
            entities = report.len(),
            verified = report.verified,
            invalid = report.invalid,
            unverifiable = report.unverifiable,
            truncated = report.truncated,
            "verified lineage chain"
        );
        Ok(report)
    }

    fn check(&self, entity: &Entity) -> VerifyResult<VerificationStatus> {
        let Some(path) = &entity.path else {
            return Ok(VerificationStatus::unverifiable(UnverifiableReason::NoPath));
        };

        let status = match self.hasher.hash_file(path) {
            Ok(digest) if digest.hash == entity.hash => VerificationStatus::Verified,
            Ok(digest) => VerificationStatus::Mismatched {
                stored: entity.hash.clone(),
                current: digest.hash,
            },
            Err(HashError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                VerificationStatus::unverifiable(UnverifiableReason::FileMissing)
            }
            Err(HashError::Io(source)) => {
                return Err(VerifyError::Io {
                    entity: entity.id,
                    source,
                })
            }
            Err(HashError::TooLarge { limit, size }) => {
                VerificationStatus::unverifiable(UnverifiableReason::TooLarge { limit, size })
            }
            Err(HashError::TimedOut { limit_ms }) => {
                VerificationStatus::unverifiable(UnverifiableReason::TimedOut { limit_ms })
            }
            Err(HashError::NotAFile { .. }) => {
                VerificationStatus::unverifiable(UnverifiableReason::NotAFile)
            }
        };
        Ok(status)
    }
}

fn verification(entity: Entity, status: VerificationStatus) -> EntityVerification {
    EntityVerification {
        entity_id: entity.id,
        name: entity.name,
        path: entity.path,
        stored_hash: entity.hash,
        status,
        checked_at: Utc::now(),
    }
}
