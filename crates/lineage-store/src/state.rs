//! Indexed in-memory state and the mutations that change it.
//!
//! Every change to the store is expressed as a list of [`Mutation`]s.
//! The same [`LineageState::apply`] path is used for live writes and for
//! journal replay, so a reopened store always rebuilds the exact state
//! the journal describes.
//!
//! Records of each kind live in a `BTreeMap` keyed by a global insertion
//! sequence number, which gives insertion-ordered listing. Side indices
//! map ids to sequence numbers, hashes to entities, agent keys to agents,
//! and nodes to their outgoing/incoming relations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use lineage_types::{
    Activity, ActivityId, Agent, AgentId, AgentKey, ContentHash, Entity, EntityId, NodeRef,
    Relation, RelationId,
};

use crate::filter::{limited, RelationFilter};
use crate::traits::{LineageView, StoreStats};

/// A single record write or delete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "record", rename_all = "snake_case")]
pub enum Mutation {
    PutEntity(Entity),
    PutActivity(Activity),
    PutAgent(Agent),
    PutRelation(Relation),
    DeleteEntity(EntityId),
    DeleteActivity(ActivityId),
    DeleteAgent(AgentId),
    DeleteRelation(RelationId),
}

#[derive(Debug, Default)]
pub(crate) struct LineageState {
    next_seq: u64,

    entities: BTreeMap<u64, Entity>,
    entity_seq: HashMap<EntityId, u64>,
    hash_index: HashMap<ContentHash, BTreeSet<u64>>,

    activities: BTreeMap<u64, Activity>,
    activity_seq: HashMap<ActivityId, u64>,

    agents: BTreeMap<u64, Agent>,
    agent_seq: HashMap<AgentId, u64>,
    agent_keys: HashMap<AgentKey, BTreeSet<u64>>,

    relations: BTreeMap<u64, Relation>,
    relation_seq: HashMap<RelationId, u64>,
    outgoing: HashMap<NodeRef, BTreeSet<u64>>,
    incoming: HashMap<NodeRef, BTreeSet<u64>>,
}

impl LineageState {
    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entity_seq.get(id).and_then(|seq| self.entities.get(seq))
    }

    pub fn activity(&self, id: &ActivityId) -> Option<&Activity> {
        self.activity_seq
            .get(id)
            .and_then(|seq| self.activities.get(seq))
    }

    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agent_seq.get(id).and_then(|seq| self.agents.get(seq))
    }

    pub fn relation(&self, id: &RelationId) -> Option<&Relation> {
        self.relation_seq
            .get(id)
            .and_then(|seq| self.relations.get(seq))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Returns `true` if the referenced record exists.
    pub fn contains(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Entity(id) => self.entity_seq.contains_key(id),
            NodeRef::Activity(id) => self.activity_seq.contains_key(id),
            NodeRef::Agent(id) => self.agent_seq.contains_key(id),
        }
    }

    /// The most recently inserted entity with the given hash.
    pub fn latest_by_hash(&self, hash: &ContentHash) -> Option<&Entity> {
        self.hash_index
            .get(hash)
            .and_then(|seqs| seqs.last())
            .and_then(|seq| self.entities.get(seq))
    }

    /// The earliest inserted agent with the given key.
    pub fn first_agent_by_key(&self, key: &AgentKey) -> Option<&Agent> {
        self.agent_keys
            .get(key)
            .and_then(|seqs| seqs.first())
            .and_then(|seq| self.agents.get(seq))
    }

    /// Relations matching the filter, in insertion order.
    ///
    /// Endpoint-constrained filters are answered from the adjacency
    /// indices instead of scanning every relation.
    pub fn relations(&self, filter: &RelationFilter) -> Vec<&Relation> {
        let candidates: Box<dyn Iterator<Item = &Relation> + '_> =
            match (filter.source, filter.target, filter.involving) {
                (Some(source), _, _) => Box::new(self.indexed(&self.outgoing, &source)),
                (None, Some(target), _) => Box::new(self.indexed(&self.incoming, &target)),
                (None, None, Some(node)) => {
                    let seqs = self.touching_seqs(&node);
                    Box::new(seqs.into_iter().filter_map(|seq| self.relations.get(&seq)))
                }
                (None, None, None) => Box::new(self.relations.values()),
            };
        limited(candidates.filter(|r| filter.matches(r)), filter.limit)
    }

    /// Ids of every relation with `node` at either end, in insertion order.
    pub fn touching(&self, node: &NodeRef) -> Vec<RelationId> {
        self.touching_seqs(node)
            .into_iter()
            .filter_map(|seq| self.relations.get(&seq).map(|r| r.id))
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entities: self.entities.len(),
            activities: self.activities.len(),
            agents: self.agents.len(),
            relations: self.relations.len(),
        }
    }

    /// The whole state as `Put` mutations in global insertion order.
    ///
    /// Replaying the result into an empty state reproduces this state.
    pub fn snapshot(&self) -> Vec<Mutation> {
        let mut records: Vec<(u64, Mutation)> = Vec::with_capacity(
            self.entities.len() + self.activities.len() + self.agents.len() + self.relations.len(),
        );
        records.extend(self.entities.iter().map(|(s, e)| (*s, Mutation::PutEntity(e.clone()))));
        records.extend(self.activities.iter().map(|(s, a)| (*s, Mutation::PutActivity(a.clone()))));
        records.extend(self.agents.iter().map(|(s, a)| (*s, Mutation::PutAgent(a.clone()))));
        records.extend(self.relations.iter().map(|(s, r)| (*s, Mutation::PutRelation(r.clone()))));
        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, m)| m).collect()
    }

    fn indexed<'a>(
        &'a self,
        index: &'a HashMap<NodeRef, BTreeSet<u64>>,
        node: &NodeRef,
    ) -> impl Iterator<Item = &'a Relation> + 'a {
        index
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(move |seq| self.relations.get(seq))
    }

    fn touching_seqs(&self, node: &NodeRef) -> BTreeSet<u64> {
        let mut seqs = BTreeSet::new();
        if let Some(out) = self.outgoing.get(node) {
            seqs.extend(out.iter().copied());
        }
        if let Some(inc) = self.incoming.get(node) {
            seqs.extend(inc.iter().copied());
        }
        seqs
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Apply one mutation. Puts upsert by id and keep the original
    /// insertion position; deletes of unknown ids are no-ops.
    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::PutEntity(entity) => self.put_entity(entity),
            Mutation::PutActivity(activity) => self.put_activity(activity),
            Mutation::PutAgent(agent) => self.put_agent(agent),
            Mutation::PutRelation(relation) => self.put_relation(relation),
            Mutation::DeleteEntity(id) => {
                if let Some(seq) = self.entity_seq.remove(&id) {
                    if let Some(entity) = self.entities.remove(&seq) {
                        remove_from_index(&mut self.hash_index, &entity.hash, seq);
                    }
                    self.cascade(&NodeRef::Entity(id));
                }
            }
            Mutation::DeleteActivity(id) => {
                if let Some(seq) = self.activity_seq.remove(&id) {
                    self.activities.remove(&seq);
                    self.cascade(&NodeRef::Activity(id));
                }
            }
            Mutation::DeleteAgent(id) => {
                if let Some(seq) = self.agent_seq.remove(&id) {
                    if let Some(agent) = self.agents.remove(&seq) {
                        remove_from_index(&mut self.agent_keys, &agent.key(), seq);
                    }
                    self.cascade(&NodeRef::Agent(id));
                }
            }
            Mutation::DeleteRelation(id) => self.remove_relation(&id),
        }
    }

    fn seq_for<K: std::hash::Hash + Eq + Copy>(
        next_seq: &mut u64,
        index: &mut HashMap<K, u64>,
        id: K,
    ) -> (u64, bool) {
        if let Some(seq) = index.get(&id) {
            return (*seq, false);
        }
        let seq = *next_seq;
        *next_seq += 1;
        index.insert(id, seq);
        (seq, true)
    }

    fn put_entity(&mut self, entity: Entity) {
        let (seq, _) = Self::seq_for(&mut self.next_seq, &mut self.entity_seq, entity.id);
        if let Some(previous) = self.entities.get(&seq) {
            let old_hash = previous.hash.clone();
            remove_from_index(&mut self.hash_index, &old_hash, seq);
        }
        self.hash_index
            .entry(entity.hash.clone())
            .or_default()
            .insert(seq);
        self.entities.insert(seq, entity);
    }

    fn put_activity(&mut self, activity: Activity) {
        let (seq, _) = Self::seq_for(&mut self.next_seq, &mut self.activity_seq, activity.id);
        self.activities.insert(seq, activity);
    }

    fn put_agent(&mut self, agent: Agent) {
        let (seq, _) = Self::seq_for(&mut self.next_seq, &mut self.agent_seq, agent.id);
        if let Some(previous) = self.agents.get(&seq) {
            let old_key = previous.key();
            remove_from_index(&mut self.agent_keys, &old_key, seq);
        }
        self.agent_keys.entry(agent.key()).or_default().insert(seq);
        self.agents.insert(seq, agent);
    }

    fn put_relation(&mut self, relation: Relation) {
        let (seq, fresh) =
            Self::seq_for(&mut self.next_seq, &mut self.relation_seq, relation.id);
        if !fresh {
            if let Some(previous) = self.relations.get(&seq) {
                let (source, target) = (previous.source, previous.target);
                remove_from_index(&mut self.outgoing, &source, seq);
                remove_from_index(&mut self.incoming, &target, seq);
            }
        }
        self.outgoing.entry(relation.source).or_default().insert(seq);
        self.incoming.entry(relation.target).or_default().insert(seq);
        self.relations.insert(seq, relation);
    }

    fn remove_relation(&mut self, id: &RelationId) {
        let Some(seq) = self.relation_seq.remove(id) else {
            return;
        };
        if let Some(relation) = self.relations.remove(&seq) {
            remove_from_index(&mut self.outgoing, &relation.source, seq);
            remove_from_index(&mut self.incoming, &relation.target, seq);
        }
    }

    /// Remove every relation touching a deleted node.
    fn cascade(&mut self, node: &NodeRef) {
        for id in self.touching(node) {
            self.remove_relation(&id);
        }
        self.outgoing.remove(node);
        self.incoming.remove(node);
    }
}

fn remove_from_index<K: std::hash::Hash + Eq>(
    index: &mut HashMap<K, BTreeSet<u64>>,
    key: &K,
    seq: u64,
) {
    if let Some(seqs) = index.get_mut(key) {
        seqs.remove(&seq);
        if seqs.is_empty() {
            index.remove(key);
        }
    }
}

impl LineageView for LineageState {
    fn entity(&self, id: &EntityId) -> Option<&Entity> {
        LineageState::entity(self, id)
    }

    fn activity(&self, id: &ActivityId) -> Option<&Activity> {
        LineageState::activity(self, id)
    }

    fn agent(&self, id: &AgentId) -> Option<&Agent> {
        LineageState::agent(self, id)
    }

    fn relations(&self, filter: &RelationFilter) -> Vec<&Relation> {
        LineageState::relations(self, filter)
    }

    fn entities(&self) -> Box<dyn Iterator<Item = &Entity> + '_> {
        Box::new(LineageState::entities(self))
    }

    fn activities(&self) -> Box<dyn Iterator<Item = &Activity> + '_> {
        Box::new(LineageState::activities(self))
    }

    fn agents(&self) -> Box<dyn Iterator<Item = &Agent> + '_> {
        Box::new(LineageState::agents(self))
    }
}
