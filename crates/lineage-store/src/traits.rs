use lineage_types::{
    Activity, ActivityId, ActivityStatus, ActivityUpdate, Agent, AgentId, AgentUpdate,
    ContentHash, Entity, EntityId, EntityUpdate, NewActivity, NewAgent, NewEntity, NewRelation,
    Relation, RelationId,
};

use crate::error::{StoreError, StoreResult};
use crate::filter::{ActivityFilter, AgentFilter, EntityFilter, RelationFilter};

/// Per-kind record counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entities: usize,
    pub activities: usize,
    pub agents: usize,
    pub relations: usize,
}

/// Read access to one consistent state of a store.
///
/// A view never changes while it is borrowed: every lookup made through
/// it observes the same completed mutations.
pub trait LineageView {
    fn entity(&self, id: &EntityId) -> Option<&Entity>;

    fn activity(&self, id: &ActivityId) -> Option<&Activity>;

    fn agent(&self, id: &AgentId) -> Option<&Agent>;

    /// Relations matching `filter`, in insertion order.
    fn relations(&self, filter: &RelationFilter) -> Vec<&Relation>;

    fn entities(&self) -> Box<dyn Iterator<Item = &Entity> + '_>;

    fn activities(&self) -> Box<dyn Iterator<Item = &Activity> + '_>;

    fn agents(&self) -> Box<dyn Iterator<Item = &Agent> + '_>;
}

/// Provenance record store.
///
/// All implementations must satisfy these invariants:
/// - `create_*` and `add_relation` validate every referenced id and the
///   hash format before persisting. A rejected request stores nothing.
/// - Unknown ids are not errors: `get_*` return `Ok(None)`, `update_*`
///   and `delete_*` return `Ok(false)`.
/// - Mutations are serialized; readers observe a state consistent with
///   some serial order of completed mutations.
/// - Deleting an entity, activity, or agent cascade-deletes every
///   relation whose source or target is that record.
/// - `list_*` and `get_relations` return records in insertion order.
pub trait LineageStore: Send + Sync {
    // ---- Entities ----

    fn create_entity(&self, request: NewEntity) -> StoreResult<Entity>;

    fn get_entity(&self, id: &EntityId) -> StoreResult<Option<Entity>>;

    /// The most recently created entity carrying `hash`.
    fn get_entity_by_hash(&self, hash: &ContentHash) -> StoreResult<Option<Entity>>;

    fn list_entities(&self, filter: &EntityFilter) -> StoreResult<Vec<Entity>>;

    /// Backfill `generated_by` and merge metadata. A conflicting
    /// `generated_by` is a validation error.
    fn update_entity(&self, id: &EntityId, update: EntityUpdate) -> StoreResult<bool>;

    fn delete_entity(&self, id: &EntityId) -> StoreResult<bool>;

    // ---- Activities ----

    fn create_activity(&self, request: NewActivity) -> StoreResult<Activity>;

    fn get_activity(&self, id: &ActivityId) -> StoreResult<Option<Activity>>;

    fn list_activities(&self, filter: &ActivityFilter) -> StoreResult<Vec<Activity>>;

    /// Append inputs/outputs and merge parameters of a running activity.
    fn update_activity(&self, id: &ActivityId, update: ActivityUpdate) -> StoreResult<bool>;

    /// Move a running activity to a terminal status.
    ///
    /// Appends `generated` to the activity outputs and backfills
    /// `generated_by` on generated entities that have none. Calling this
    /// on an activity that is already terminal returns
    /// [`StoreError::ActivityFinalized`](crate::StoreError::ActivityFinalized)
    /// every time and changes nothing.
    fn complete_activity(
        &self,
        id: &ActivityId,
        status: ActivityStatus,
        generated: &[EntityId],
    ) -> StoreResult<bool>;

    fn delete_activity(&self, id: &ActivityId) -> StoreResult<bool>;

    /// Create a running activity together with its `wasAssociatedWith`
    /// relation and one `used` relation per input, as one mutation.
    fn start_activity(&self, request: NewActivity) -> StoreResult<Activity>;

    /// Record an output of a running activity as one mutation.
    ///
    /// Stores the entity with `generated_by` set to `activity`, the
    /// `wasGeneratedBy` relation, `wasAttributedTo` the activity's agent,
    /// `wasDerivedFrom` each of the activity's inputs, and appends the
    /// entity to the activity outputs. A terminal activity yields
    /// [`StoreError::ActivityFinalized`] and nothing is stored.
    fn record_generation(&self, activity: &ActivityId, request: NewEntity)
        -> StoreResult<Entity>;

    // ---- Agents ----

    fn create_agent(&self, request: NewAgent) -> StoreResult<Agent>;

    fn get_agent(&self, id: &AgentId) -> StoreResult<Option<Agent>>;

    /// Return the first agent with the request's type, name, and version,
    /// creating it when none exists.
    fn get_or_create_agent(&self, request: NewAgent) -> StoreResult<Agent>;

    fn list_agents(&self, filter: &AgentFilter) -> StoreResult<Vec<Agent>>;

    fn update_agent(&self, id: &AgentId, update: AgentUpdate) -> StoreResult<bool>;

    fn delete_agent(&self, id: &AgentId) -> StoreResult<bool>;

    // ---- Relations ----

    fn add_relation(&self, request: NewRelation) -> StoreResult<Relation>;

    fn get_relation(&self, id: &RelationId) -> StoreResult<Option<Relation>>;

    fn get_relations(&self, filter: &RelationFilter) -> StoreResult<Vec<Relation>>;

    fn delete_relation(&self, id: &RelationId) -> StoreResult<bool>;

    // ---- Introspection ----

    fn stats(&self) -> StoreResult<StoreStats>;

    /// Run `read` once against a single consistent state. No mutation is
    /// applied while it runs, so `read` must not call back into the store.
    fn read_view(&self, read: &mut dyn FnMut(&dyn LineageView)) -> StoreResult<()>;
}

/// Evaluate `read` against one consistent view of `store`.
pub fn with_view<S, T>(store: &S, read: impl FnOnce(&dyn LineageView) -> T) -> StoreResult<T>
where
    S: LineageStore + ?Sized,
{
    let mut read = Some(read);
    let mut output = None;
    store.read_view(&mut |view| {
        if let Some(read) = read.take() {
            output = Some(read(view));
        }
    })?;
    output.ok_or_else(|| StoreError::Validation("store did not provide a read view".to_string()))
}
