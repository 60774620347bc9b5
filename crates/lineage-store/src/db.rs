use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info};

use lineage_types::{
    Activity, ActivityId, ActivityStatus, ActivityUpdate, Agent, AgentId, AgentUpdate,
    ContentHash, Entity, EntityId, EntityUpdate, NewActivity, NewAgent, NewEntity, NewRelation,
    NodeRef, Relation, RelationId,
};

use crate::error::{StoreError, StoreResult};
use crate::filter::{limited, ActivityFilter, AgentFilter, EntityFilter, RelationFilter};
use crate::journal::{Journal, JournalConfig};
use crate::state::{LineageState, Mutation};
use crate::traits::{LineageStore, LineageView, StoreStats};

/// Mutations per frame when compacting.
const SNAPSHOT_FRAME_LEN: usize = 512;

/// Indexed lineage store with an optional on-disk journal.
///
/// Records live in memory behind a `RwLock`. When opened with a path,
/// every mutation is appended to the journal before it is applied, and
/// the journal is replayed on open.
pub struct LineageDb {
    state: RwLock<LineageState>,
    journal: Option<Journal>,
}

impl LineageDb {
    /// A store that keeps records in memory only.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(LineageState::default()),
            journal: None,
        }
    }

    /// Open (or create) a journaled store at `path`, replaying its contents.
    pub fn open(path: impl AsRef<Path>, config: JournalConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        let journal = Journal::open(path, config)?;

        let mut state = LineageState::default();
        let frames = journal.recover()?;
        let frame_count = frames.len();
        for op in frames.into_iter().flatten() {
            state.apply(op);
        }

        let stats = state.stats();
        info!(
            path = %path.display(),
            frames = frame_count,
            entities = stats.entities,
            activities = stats.activities,
            agents = stats.agents,
            relations = stats.relations,
            "opened lineage store"
        );

        Ok(Self {
            state: RwLock::new(state),
            journal: Some(journal),
        })
    }

    /// Path of the backing journal, if any.
    pub fn path(&self) -> Option<&Path> {
        self.journal.as_ref().map(Journal::path)
    }

    pub fn is_persistent(&self) -> bool {
        self.journal.is_some()
    }

    /// Rewrite the journal as a snapshot of the current state.
    ///
    /// Deleted records and superseded writes are dropped. A no-op for
    /// in-memory stores.
    pub fn compact(&self) -> StoreResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let state = self.write()?;
        let before = journal.offset()?;
        let frames: Vec<Vec<Mutation>> = state
            .snapshot()
            .chunks(SNAPSHOT_FRAME_LEN)
            .map(<[Mutation]>::to_vec)
            .collect();
        journal.rewrite(&frames)?;
        info!(
            path = %journal.path().display(),
            before,
            after = journal.offset()?,
            "compacted lineage journal"
        );
        Ok(())
    }

    /// Flush and `fsync` the journal.
    pub fn sync(&self) -> StoreResult<()> {
        match &self.journal {
            Some(journal) => journal.sync(),
            None => Ok(()),
        }
    }

    /// Flush the journal and release the store.
    pub fn close(self) -> StoreResult<()> {
        self.sync()?;
        if let Some(path) = self.path() {
            info!(path = %path.display(), "closed lineage store");
        }
        Ok(())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, LineageState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, LineageState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run a mutation under the write lock.
    ///
    /// `plan` validates against the current state and returns the
    /// mutations to perform. They are journaled as one frame and then
    /// applied; if `plan` or the journal write fails nothing changes.
    fn mutate<T>(
        &self,
        plan: impl FnOnce(&LineageState) -> StoreResult<(Vec<Mutation>, T)>,
    ) -> StoreResult<T> {
        let mut state = self.write()?;
        let (ops, value) = plan(&state)?;
        if !ops.is_empty() {
            if let Some(journal) = &self.journal {
                journal.append(&ops)?;
            }
            for op in ops {
                state.apply(op);
            }
        }
        Ok(value)
    }
}

impl Default for LineageDb {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for LineageDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineageDb")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn require_text(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn parse_hash(value: &str) -> StoreResult<ContentHash> {
    ContentHash::parse(value).map_err(|e| StoreError::Validation(e.to_string()))
}

fn require_entity(state: &LineageState, id: &EntityId) -> StoreResult<()> {
    if state.entity(id).is_none() {
        return Err(StoreError::Validation(format!("unknown entity {id}")));
    }
    Ok(())
}

fn require_activity(state: &LineageState, id: &ActivityId) -> StoreResult<()> {
    if state.activity(id).is_none() {
        return Err(StoreError::Validation(format!("unknown activity {id}")));
    }
    Ok(())
}

fn require_agent(state: &LineageState, id: &AgentId) -> StoreResult<()> {
    if state.agent(id).is_none() {
        return Err(StoreError::Validation(format!("unknown agent {id}")));
    }
    Ok(())
}

fn require_running(activity: &Activity) -> StoreResult<()> {
    if activity.status.is_terminal() {
        return Err(StoreError::ActivityFinalized {
            id: activity.id,
            status: activity.status,
        });
    }
    Ok(())
}

fn build_agent(request: NewAgent) -> StoreResult<Agent> {
    require_text("agent type", &request.agent_type)?;
    require_text("agent name", &request.name)?;
    Ok(Agent {
        id: AgentId::new(),
        agent_type: request.agent_type,
        name: request.name,
        version: request.version,
        provider: request.provider,
        metadata: request.metadata,
        created_at: Utc::now(),
    })
}

/// Validate a creation request against `state` and build the running
/// activity it describes.
fn build_activity(state: &LineageState, request: NewActivity) -> StoreResult<Activity> {
    require_agent(state, &request.agent_id)?;
    for entity in &request.used {
        require_entity(state, entity)?;
    }

    let mut activity = Activity {
        id: ActivityId::new(),
        activity_type: request.activity_type,
        name: request.name,
        agent_id: request.agent_id,
        run_id: request.run_id,
        used: Vec::new(),
        generated: Vec::new(),
        parameters: request.parameters,
        status: ActivityStatus::Running,
        started_at: Utc::now(),
        ended_at: None,
    };
    activity.add_used(request.used);
    Ok(activity)
}

/// A relation record for an already validated request.
fn build_relation(request: NewRelation) -> Relation {
    Relation {
        id: RelationId::new(),
        relation_type: request.relation_type,
        source: request.source,
        target: request.target,
        metadata: request.metadata,
        created_at: Utc::now(),
    }
}

/// Relation deletes for every edge touching `node`, followed by `delete`.
fn cascade(state: &LineageState, node: NodeRef, delete: Mutation) -> Vec<Mutation> {
    let mut ops: Vec<Mutation> = state
        .touching(&node)
        .into_iter()
        .map(Mutation::DeleteRelation)
        .collect();
    ops.push(delete);
    ops
}

impl LineageStore for LineageDb {
    // ---- Entities ----

    fn create_entity(&self, request: NewEntity) -> StoreResult<Entity> {
        require_text("entity type", &request.entity_type)?;
        require_text("entity name", &request.name)?;
        let hash = parse_hash(&request.hash)?;

        self.mutate(|state| {
            if let Some(activity) = &request.generated_by {
                require_activity(state, activity)?;
            }
            let entity = Entity {
                id: EntityId::new(),
                entity_type: request.entity_type,
                name: request.name,
                hash,
                path: request.path,
                size_bytes: request.size_bytes,
                metadata: request.metadata,
                generated_by: request.generated_by,
                created_at: Utc::now(),
            };
            debug!(entity = %entity.summary(), "create entity");
            Ok((vec![Mutation::PutEntity(entity.clone())], entity))
        })
    }

    fn get_entity(&self, id: &EntityId) -> StoreResult<Option<Entity>> {
        Ok(self.read()?.entity(id).cloned())
    }

    fn get_entity_by_hash(&self, hash: &ContentHash) -> StoreResult<Option<Entity>> {
        Ok(self.read()?.latest_by_hash(hash).cloned())
    }

    fn list_entities(&self, filter: &EntityFilter) -> StoreResult<Vec<Entity>> {
        let state = self.read()?;
        Ok(limited(
            state.entities().filter(|e| filter.matches(e)).cloned(),
            filter.limit,
        ))
    }

    fn update_entity(&self, id: &EntityId, update: EntityUpdate) -> StoreResult<bool> {
        self.mutate(|state| {
            let Some(current) = state.entity(id) else {
                return Ok((vec![], false));
            };
            let mut entity = current.clone();

            if let Some(activity) = update.generated_by {
                match entity.generated_by {
                    Some(existing) if existing != activity => {
                        return Err(StoreError::Validation(format!(
                            "entity {id} was already generated by {existing}"
                        )));
                    }
                    _ => {
                        require_activity(state, &activity)?;
                        entity.generated_by = Some(activity);
                    }
                }
            }
            entity.metadata.extend(update.metadata);

            if &entity == current {
                return Ok((vec![], true));
            }
            debug!(entity = %id, "update entity");
            Ok((vec![Mutation::PutEntity(entity)], true))
        })
    }

    fn delete_entity(&self, id: &EntityId) -> StoreResult<bool> {
        self.mutate(|state| {
            if state.entity(id).is_none() {
                return Ok((vec![], false));
            }
            let ops = cascade(state, NodeRef::Entity(*id), Mutation::DeleteEntity(*id));
            debug!(entity = %id, relations = ops.len() - 1, "delete entity");
            Ok((ops, true))
        })
    }

    // ---- Activities ----

    fn create_activity(&self, request: NewActivity) -> StoreResult<Activity> {
        require_text("activity type", &request.activity_type)?;
        require_text("activity name", &request.name)?;

        self.mutate(|state| {
            let activity = build_activity(state, request)?;
            debug!(activity = %activity.id, name = %activity.name, "create activity");
            Ok((vec![Mutation::PutActivity(activity.clone())], activity))
        })
    }

    fn get_activity(&self, id: &ActivityId) -> StoreResult<Option<Activity>> {
        Ok(self.read()?.activity(id).cloned())
    }

    fn list_activities(&self, filter: &ActivityFilter) -> StoreResult<Vec<Activity>> {
        let state = self.read()?;
        Ok(limited(
            state.activities().filter(|a| filter.matches(a)).cloned(),
            filter.limit,
        ))
    }

    fn update_activity(&self, id: &ActivityId, update: ActivityUpdate) -> StoreResult<bool> {
        self.mutate(|state| {
            let Some(current) = state.activity(id) else {
                return Ok((vec![], false));
            };
            require_running(current)?;
            for entity in update.used.iter().chain(&update.generated) {
                require_entity(state, entity)?;
            }

            let mut activity = current.clone();
            activity.add_used(update.used);
            activity.add_generated(update.generated);
            activity.parameters.extend(update.parameters);

            if &activity == current {
                return Ok((vec![], true));
            }
            debug!(activity = %id, "update activity");
            Ok((vec![Mutation::PutActivity(activity)], true))
        })
    }

    fn complete_activity(
        &self,
        id: &ActivityId,
        status: ActivityStatus,
        generated: &[EntityId],
    ) -> StoreResult<bool> {
        self.mutate(|state| {
            let Some(current) = state.activity(id) else {
                return Ok((vec![], false));
            };
            require_running(current)?;
            if !status.is_terminal() {
                return Err(StoreError::Validation(format!(
                    "cannot complete activity {id} with non-terminal status {status}"
                )));
            }
            for entity in generated {
                require_entity(state, entity)?;
            }

            let mut activity = current.clone();
            activity.status = status;
            activity.ended_at = Some(Utc::now());
            activity.add_generated(generated.iter().copied());

            let mut ops = Vec::with_capacity(generated.len() + 1);
            for entity_id in &activity.generated {
                if let Some(entity) = state.entity(entity_id) {
                    if entity.generated_by.is_none() {
                        let mut entity = entity.clone();
                        entity.generated_by = Some(*id);
                        ops.push(Mutation::PutEntity(entity));
                    }
                }
            }
            debug!(
                activity = %id,
                %status,
                generated = activity.generated.len(),
                backfilled = ops.len(),
                "complete activity"
            );
            ops.push(Mutation::PutActivity(activity));
            Ok((ops, true))
        })
    }

    fn delete_activity(&self, id: &ActivityId) -> StoreResult<bool> {
        self.mutate(|state| {
            if state.activity(id).is_none() {
                return Ok((vec![], false));
            }
            let ops = cascade(state, NodeRef::Activity(*id), Mutation::DeleteActivity(*id));
            debug!(activity = %id, relations = ops.len() - 1, "delete activity");
            Ok((ops, true))
        })
    }

    fn start_activity(&self, request: NewActivity) -> StoreResult<Activity> {
        require_text("activity type", &request.activity_type)?;
        require_text("activity name", &request.name)?;

        self.mutate(|state| {
            let activity = build_activity(state, request)?;
            let mut ops = vec![
                Mutation::PutActivity(activity.clone()),
                Mutation::PutRelation(build_relation(NewRelation::was_associated_with(
                    activity.id,
                    activity.agent_id,
                ))),
            ];
            for input in &activity.used {
                ops.push(Mutation::PutRelation(build_relation(NewRelation::used(
                    activity.id,
                    *input,
                ))));
            }
            debug!(
                activity = %activity.id,
                name = %activity.name,
                inputs = activity.used.len(),
                "start activity"
            );
            Ok((ops, activity))
        })
    }

    fn record_generation(
        &self,
        activity: &ActivityId,
        request: NewEntity,
    ) -> StoreResult<Entity> {
        require_text("entity type", &request.entity_type)?;
        require_text("entity name", &request.name)?;
        let hash = parse_hash(&request.hash)?;
        if let Some(other) = request.generated_by.filter(|other| other != activity) {
            return Err(StoreError::Validation(format!(
                "output of {activity} cannot be generated by {other}"
            )));
        }

        self.mutate(|state| {
            let current = state
                .activity(activity)
                .ok_or_else(|| StoreError::Validation(format!("unknown activity {activity}")))?;
            require_running(current)?;

            let entity = Entity {
                id: EntityId::new(),
                entity_type: request.entity_type,
                name: request.name,
                hash,
                path: request.path,
                size_bytes: request.size_bytes,
                metadata: request.metadata,
                generated_by: Some(current.id),
                created_at: Utc::now(),
            };

            let mut ops = vec![
                Mutation::PutEntity(entity.clone()),
                Mutation::PutRelation(build_relation(NewRelation::was_generated_by(
                    entity.id, current.id,
                ))),
            ];
            if state.agent(&current.agent_id).is_some() {
                ops.push(Mutation::PutRelation(build_relation(
                    NewRelation::was_attributed_to(entity.id, current.agent_id),
                )));
            }
            for input in current.used.iter().filter(|id| state.entity(id).is_some()) {
                ops.push(Mutation::PutRelation(build_relation(
                    NewRelation::was_derived_from(entity.id, *input),
                )));
            }

            let mut updated = current.clone();
            updated.add_generated([entity.id]);
            ops.push(Mutation::PutActivity(updated));

            debug!(entity = %entity.summary(), activity = %current.id, "record generation");
            Ok((ops, entity))
        })
    }

    // ---- Agents ----

    fn create_agent(&self, request: NewAgent) -> StoreResult<Agent> {
        let agent = build_agent(request)?;
        self.mutate(|_| {
            debug!(agent = %agent.id, name = %agent.name, "create agent");
            Ok((vec![Mutation::PutAgent(agent.clone())], agent))
        })
    }

    fn get_agent(&self, id: &AgentId) -> StoreResult<Option<Agent>> {
        Ok(self.read()?.agent(id).cloned())
    }

    fn get_or_create_agent(&self, request: NewAgent) -> StoreResult<Agent> {
        require_text("agent type", &request.agent_type)?;
        require_text("agent name", &request.name)?;

        self.mutate(|state| {
            if let Some(existing) = state.first_agent_by_key(&request.key()) {
                return Ok((vec![], existing.clone()));
            }
            let agent = build_agent(request)?;
            debug!(agent = %agent.id, name = %agent.name, "create agent");
            Ok((vec![Mutation::PutAgent(agent.clone())], agent))
        })
    }

    fn list_agents(&self, filter: &AgentFilter) -> StoreResult<Vec<Agent>> {
        let state = self.read()?;
        Ok(limited(
            state.agents().filter(|a| filter.matches(a)).cloned(),
            filter.limit,
        ))
    }

    fn update_agent(&self, id: &AgentId, update: AgentUpdate) -> StoreResult<bool> {
        self.mutate(|state| {
            let Some(current) = state.agent(id) else {
                return Ok((vec![], false));
            };
            let mut agent = current.clone();
            agent.metadata.extend(update.metadata);
            if &agent == current {
                return Ok((vec![], true));
            }
            debug!(agent = %id, "update agent");
            Ok((vec![Mutation::PutAgent(agent)], true))
        })
    }

    fn delete_agent(&self, id: &AgentId) -> StoreResult<bool> {
        self.mutate(|state| {
            if state.agent(id).is_none() {
                return Ok((vec![], false));
            }
            let ops = cascade(state, NodeRef::Agent(*id), Mutation::DeleteAgent(*id));
            debug!(agent = %id, relations = ops.len() - 1, "delete agent");
            Ok((ops, true))
        })
    }

    // ---- Relations ----

    fn add_relation(&self, request: NewRelation) -> StoreResult<Relation> {
        if !request.is_well_kinded() {
            return Err(StoreError::Validation(format!(
                "{} requires {} -> {}, got {} -> {}",
                request.relation_type,
                request.relation_type.source_kind(),
                request.relation_type.target_kind(),
                request.source.kind(),
                request.target.kind(),
            )));
        }

        self.mutate(|state| {
            for endpoint in [&request.source, &request.target] {
                if !state.contains(endpoint) {
                    return Err(StoreError::Validation(format!(
                        "unknown relation endpoint {endpoint}"
                    )));
                }
            }
            let relation = build_relation(request);
            debug!(relation = %relation.summary(), "add relation");
            Ok((vec![Mutation::PutRelation(relation.clone())], relation))
        })
    }

    fn get_relation(&self, id: &RelationId) -> StoreResult<Option<Relation>> {
        Ok(self.read()?.relation(id).cloned())
    }

    fn get_relations(&self, filter: &RelationFilter) -> StoreResult<Vec<Relation>> {
        let state = self.read()?;
        Ok(state.relations(filter).into_iter().cloned().collect())
    }

    fn delete_relation(&self, id: &RelationId) -> StoreResult<bool> {
        self.mutate(|state| {
            if state.relation(id).is_none() {
                return Ok((vec![], false));
            }
            debug!(relation = %id, "delete relation");
            Ok((vec![Mutation::DeleteRelation(*id)], true))
        })
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        Ok(self.read()?.stats())
    }

    fn read_view(&self, read: &mut dyn FnMut(&dyn LineageView)) -> StoreResult<()> {
        let state = self.read()?;
        read(&*state);
        Ok(())
    }
}
