use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use lineage_crypto::ContentHasher;
use lineage_export::{ProvDocument, ProvJsonExporter};
use lineage_graph::LineageTraversal;
use lineage_store::{LineageDb, LineageStore, StoreStats};
use lineage_types::{
    Activity, ActivityId, ActivityStatus, Entity, EntityId, Graph, NewActivity, NewAgent,
    NewEntity,
};
use lineage_verify::{ChainReport, EntityVerification, Verifier};

use crate::config::LineageConfig;
use crate::error::{SdkError, SdkResult};

/// High-level recorder API.
///
/// Owns the store for its lifetime. Dropping a `Lineage` flushes the
/// journal; [`close`](Lineage::close) does the same and reports failures.
pub struct Lineage {
    db: LineageDb,
    config: LineageConfig,
}

impl Lineage {
    /// Open the store described by `config`.
    pub fn open(config: LineageConfig) -> SdkResult<Self> {
        let db = match &config.database_path {
            Some(path) => LineageDb::open(path, config.journal.clone())?,
            None => LineageDb::in_memory(),
        };
        info!(persistent = db.is_persistent(), "lineage recorder ready");
        Ok(Self { db, config })
    }

    /// A volatile recorder with default limits.
    pub fn in_memory() -> Self {
        Self {
            db: LineageDb::in_memory(),
            config: LineageConfig::in_memory(),
        }
    }

    /// Direct access to the record store.
    pub fn store(&self) -> &LineageDb {
        &self.db
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    pub fn stats(&self) -> SdkResult<StoreStats> {
        Ok(self.db.stats()?)
    }

    // ---- Recording ----

    /// Record a file on disk as an entity, hashing its current content.
    ///
    /// If the most recent entity with the same hash was recorded from the
    /// same path, that entity is returned instead of a new one.
    pub fn track_file(&self, entity_type: &str, path: &Path) -> SdkResult<Entity> {
        let digest = ContentHasher::new(self.config.hashing.clone()).hash_file(path)?;
        if let Some(existing) = self.db.get_entity_by_hash(&digest.hash)? {
            if existing.path.as_deref() == Some(path) && existing.entity_type == entity_type {
                return Ok(existing);
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let entity = self.db.create_entity(
            NewEntity::new(entity_type, name, digest.hash.to_string())
                .with_path(path)
                .with_size(digest.size_bytes),
        )?;
        Ok(entity)
    }

    /// Start an activity run by `agent`, consuming `inputs`.
    ///
    /// The agent is looked up or created, and the `used` and
    /// `wasAssociatedWith` relations are recorded with the activity.
    pub fn begin_activity(
        &self,
        activity_type: &str,
        name: &str,
        agent: NewAgent,
        inputs: &[EntityId],
    ) -> SdkResult<Activity> {
        let agent = self.db.get_or_create_agent(agent)?;
        let mut request = NewActivity::new(activity_type, name, agent.id);
        for input in inputs {
            request = request.using(*input);
        }
        Ok(self.db.start_activity(request)?)
    }

    /// Record in-memory output of a running activity.
    ///
    /// Adds the `wasGeneratedBy` relation, a `wasAttributedTo` relation
    /// to the activity's agent, and `wasDerivedFrom` relations to each of
    /// the activity's inputs. The entity and its relations are stored
    /// together, or not at all if the activity has already finished.
    pub fn record_output(
        &self,
        activity: &ActivityId,
        entity_type: &str,
        name: &str,
        content: &[u8],
    ) -> SdkResult<Entity> {
        let hash = ContentHasher::hash_bytes(content);
        let request =
            NewEntity::new(entity_type, name, hash.to_string()).with_size(content.len() as u64);
        Ok(self.db.record_generation(activity, request)?)
    }

    /// Move an activity to a terminal status.
    pub fn finish_activity(
        &self,
        activity: &ActivityId,
        status: ActivityStatus,
        generated: &[EntityId],
    ) -> SdkResult<bool> {
        Ok(self.db.complete_activity(activity, status, generated)?)
    }

    // ---- Queries ----

    pub fn traversal(&self) -> LineageTraversal<'_, LineageDb> {
        LineageTraversal::new(&self.db, self.config.traversal.clone())
    }

    pub fn ancestors(&self, entity: &EntityId, max_depth: Option<usize>) -> SdkResult<Graph> {
        Ok(self.traversal().ancestors(entity, max_depth)?)
    }

    pub fn descendants(&self, entity: &EntityId, max_depth: Option<usize>) -> SdkResult<Graph> {
        Ok(self.traversal().descendants(entity, max_depth)?)
    }

    pub fn full_lineage(&self, entity: &EntityId) -> SdkResult<Graph> {
        Ok(self.traversal().full_lineage(entity)?)
    }

    // ---- Verification ----

    pub fn verifier(&self) -> Verifier<'_, LineageDb> {
        Verifier::new(&self.db)
            .with_hash_limits(self.config.hashing.clone())
            .with_traversal_limits(self.config.traversal.clone())
    }

    pub fn verify_entity(&self, entity: &EntityId) -> SdkResult<EntityVerification> {
        Ok(self.verifier().verify_entity(entity)?)
    }

    pub fn verify_chain(&self, entity: &EntityId) -> SdkResult<ChainReport> {
        Ok(self.verifier().verify_chain(entity)?)
    }

    // ---- Export ----

    pub fn exporter(&self) -> ProvJsonExporter<'_, LineageDb> {
        ProvJsonExporter::new(&self.db).with_traversal_limits(self.config.traversal.clone())
    }

    pub fn export(&self, root: Option<&EntityId>) -> SdkResult<ProvDocument> {
        Ok(self.exporter().export(root)?)
    }

    pub fn export_prov_json(&self, root: Option<&EntityId>) -> SdkResult<Value> {
        Ok(self.exporter().export_prov_json(root)?)
    }

    // ---- Lifecycle ----

    /// Rewrite the journal as a snapshot of the current records.
    pub fn compact(&self) -> SdkResult<()> {
        Ok(self.db.compact()?)
    }

    /// Flush the journal and release the store.
    pub fn close(self) -> SdkResult<()> {
        Ok(self.db.close()?)
    }
}

/// Open a recorder, run `f` against it, and close it afterwards, whether
/// or not `f` succeeds. An error from `f` takes precedence over one from
/// closing.
pub fn with_lineage<T, E>(
    config: LineageConfig,
    f: impl FnOnce(&Lineage) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<SdkError>,
{
    let lineage = Lineage::open(config)?;
    let result = f(&lineage);
    match (result, lineage.close()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err.into()),
        (Err(e), close) => {
            if let Err(close_err) = close {
                warn!(error = %close_err, "closing lineage store after failure");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use lineage_store::StoreError;
    use lineage_types::NodeRef;
    use lineage_verify::VerificationStatus;

    fn claude() -> NewAgent {
        NewAgent::new("llm", "claude-sonnet")
            .with_version("4")
            .with_provider("anthropic")
    }

    #[test]
    fn pipeline_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("input.csv");
        fs::write(&input_path, "name\nada\n").unwrap();

        let lineage = Lineage::in_memory();
        let input = lineage.track_file("input_file", &input_path).unwrap();
        let activity = lineage
            .begin_activity("generate", "generate personas", claude(), &[input.id])
            .unwrap();
        let persona = lineage
            .record_output(&activity.id, "persona", "persona_1", br#"{"name":"ada"}"#)
            .unwrap();
        assert!(lineage
            .finish_activity(&activity.id, ActivityStatus::Completed, &[])
            .unwrap());

        let graph = lineage.ancestors(&persona.id, None).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.contains(&NodeRef::Entity(input.id)));
        assert!(graph.contains(&NodeRef::Activity(activity.id)));

        let stored = lineage.store().get_activity(&activity.id).unwrap().unwrap();
        assert_eq!(stored.generated, vec![persona.id]);
        assert_eq!(stored.status, ActivityStatus::Completed);

        let report = lineage.verify_chain(&persona.id).unwrap();
        assert_eq!(report.verified, 1);
        assert_eq!(report.unverifiable, 1);

        let doc = lineage.export_prov_json(Some(&persona.id)).unwrap();
        assert_eq!(doc["agent"].as_object().unwrap().len(), 1);
        assert_eq!(doc["wasDerivedFrom"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn track_file_is_idempotent_for_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        fs::write(&path, "a,b\n").unwrap();

        let lineage = Lineage::in_memory();
        let first = lineage.track_file("input_file", &path).unwrap();
        let again = lineage.track_file("input_file", &path).unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.size_bytes, Some(4));

        fs::write(&path, "a,b\n1,2\n").unwrap();
        let changed = lineage.track_file("input_file", &path).unwrap();
        assert_ne!(changed.id, first.id);

        let status = lineage.verify_entity(&first.id).unwrap().status;
        assert!(status.is_mismatched());
        assert_eq!(
            lineage.verify_entity(&changed.id).unwrap().status,
            VerificationStatus::Verified
        );
    }

    #[test]
    fn output_of_finished_activity_is_rejected() {
        let lineage = Lineage::in_memory();
        let activity = lineage
            .begin_activity("generate", "generate", claude(), &[])
            .unwrap();
        lineage
            .finish_activity(&activity.id, ActivityStatus::Failed, &[])
            .unwrap();
        let err = lineage
            .record_output(&activity.id, "persona", "late", b"x")
            .unwrap_err();
        assert!(matches!(
            err,
            SdkError::Store(StoreError::ActivityFinalized { .. })
        ));
        assert_eq!(lineage.stats().unwrap().entities, 0);
    }

    #[test]
    fn output_racing_finish_is_never_orphaned() {
        let lineage = Lineage::in_memory();
        for round in 0..50 {
            let activity = lineage
                .begin_activity("generate", "generate", claude(), &[])
                .unwrap();
            let outcome = std::thread::scope(|scope| {
                let finisher = scope.spawn(|| {
                    lineage
                        .finish_activity(&activity.id, ActivityStatus::Completed, &[])
                        .unwrap()
                });
                let outcome = lineage.record_output(&activity.id, "persona", "p", b"{}");
                assert!(finisher.join().unwrap());
                outcome
            });

            let stored = lineage.store().get_activity(&activity.id).unwrap().unwrap();
            match outcome {
                Ok(persona) => {
                    assert_eq!(stored.generated, vec![persona.id], "round {round}");
                    assert_eq!(persona.generated_by, Some(activity.id));
                }
                Err(SdkError::Store(StoreError::ActivityFinalized { .. })) => {
                    assert!(stored.generated.is_empty(), "round {round}");
                }
                Err(other) => panic!("round {round}: {other}"),
            }
        }
        let stats = lineage.stats().unwrap();
        let generated: usize = lineage
            .store()
            .list_activities(&lineage_store::ActivityFilter::new())
            .unwrap()
            .iter()
            .map(|a| a.generated.len())
            .sum();
        assert_eq!(stats.entities, generated);
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = LineageConfig::persistent(dir.path().join("lineage.journal"));

        let persona_id = with_lineage(config.clone(), |lineage| {
            let activity = lineage.begin_activity("generate", "g", claude(), &[])?;
            let persona = lineage.record_output(&activity.id, "persona", "p", b"{}")?;
            lineage.finish_activity(&activity.id, ActivityStatus::Completed, &[])?;
            Ok::<_, SdkError>(persona.id)
        })
        .unwrap();

        let lineage = Lineage::open(config).unwrap();
        let stats = lineage.stats().unwrap();
        assert_eq!(stats.entities, 1);
        assert_eq!(stats.agents, 1);
        assert_eq!(stats.relations, 3);
        let persona = lineage.store().get_entity(&persona_id).unwrap().unwrap();
        assert!(persona.generated_by.is_some());
        lineage.compact().unwrap();
        lineage.close().unwrap();
    }

    #[derive(Debug)]
    enum JobError {
        Sdk(SdkError),
        Aborted,
    }

    impl From<SdkError> for JobError {
        fn from(e: SdkError) -> Self {
            Self::Sdk(e)
        }
    }

    #[test]
    fn with_lineage_closes_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = LineageConfig::persistent(dir.path().join("lineage.journal"));

        let result: Result<(), JobError> = with_lineage(config.clone(), |lineage| {
            lineage
                .begin_activity("generate", "g", claude(), &[])
                .map_err(JobError::Sdk)?;
            Err(JobError::Aborted)
        });
        assert!(matches!(result, Err(JobError::Aborted)));

        // Work done before the failure was journaled and the file released.
        let lineage = Lineage::open(config).unwrap();
        assert_eq!(lineage.stats().unwrap().activities, 1);
    }
}
