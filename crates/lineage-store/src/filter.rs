//! Filter predicates for the `list_*` and `get_relations` queries.
//!
//! Every filter field is optional; unset fields match everything. Results
//! are returned in insertion order and cut off after `limit` matches.

use lineage_types::{
    Activity, ActivityId, ActivityStatus, Agent, AgentId, Entity, NodeRef, Relation, RelationType,
};

/// Apply an optional limit to an iterator.
pub(crate) fn limited<T>(iter: impl Iterator<Item = T>, limit: Option<usize>) -> Vec<T> {
    match limit {
        Some(n) => iter.take(n).collect(),
        None => iter.collect(),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub entity_type: Option<String>,
    pub generated_by: Option<ActivityId>,
    pub limit: Option<usize>,
}

impl EntityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn generated_by(mut self, activity: ActivityId) -> Self {
        self.generated_by = Some(activity);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.entity_type
            .as_ref()
            .map_or(true, |t| &entity.entity_type == t)
            && self
                .generated_by
                .map_or(true, |a| entity.generated_by == Some(a))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub activity_type: Option<String>,
    pub agent_id: Option<AgentId>,
    pub run_id: Option<String>,
    pub status: Option<ActivityStatus>,
    pub limit: Option<usize>,
}

impl ActivityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, activity_type: impl Into<String>) -> Self {
        self.activity_type = Some(activity_type.into());
        self
    }

    pub fn by_agent(mut self, agent: AgentId) -> Self {
        self.agent_id = Some(agent);
        self
    }

    pub fn in_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_status(mut self, status: ActivityStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        self.activity_type
            .as_ref()
            .map_or(true, |t| &activity.activity_type == t)
            && self.agent_id.map_or(true, |a| activity.agent_id == a)
            && self
                .run_id
                .as_ref()
                .map_or(true, |r| activity.run_id.as_ref() == Some(r))
            && self.status.map_or(true, |s| activity.status == s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentFilter {
    pub agent_type: Option<String>,
    pub name: Option<String>,
    pub limit: Option<usize>,
}

impl AgentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, agent: &Agent) -> bool {
        self.agent_type
            .as_ref()
            .map_or(true, |t| &agent.agent_type == t)
            && self.name.as_ref().map_or(true, |n| &agent.name == n)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationFilter {
    pub relation_type: Option<RelationType>,
    pub source: Option<NodeRef>,
    pub target: Option<NodeRef>,
    /// Matches relations with this node at either end.
    pub involving: Option<NodeRef>,
    pub limit: Option<usize>,
}

impl RelationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relations whose source is `node` (outgoing edges).
    pub fn from_source(node: impl Into<NodeRef>) -> Self {
        Self {
            source: Some(node.into()),
            ..Self::default()
        }
    }

    /// Relations whose target is `node` (incoming edges).
    pub fn to_target(node: impl Into<NodeRef>) -> Self {
        Self {
            target: Some(node.into()),
            ..Self::default()
        }
    }

    pub fn involving(node: impl Into<NodeRef>) -> Self {
        Self {
            involving: Some(node.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, relation_type: RelationType) -> Self {
        self.relation_type = Some(relation_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, relation: &Relation) -> bool {
        self.relation_type.map_or(true, |t| relation.relation_type == t)
            && self.source.map_or(true, |s| relation.source == s)
            && self.target.map_or(true, |t| relation.target == t)
            && self.involving.map_or(true, |n| relation.touches(&n))
    }
}
