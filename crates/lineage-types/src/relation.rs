//! Typed provenance relations.
//!
//! [`RelationType`] is the closed set of PROV relations the recorder
//! understands. Each type fixes the node kinds at both of its endpoints,
//! and edges point from the dependent record (source) to the record it
//! depends on (target), following PROV's direction convention.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::{ActivityId, AgentId, EntityId, NodeKind, NodeRef, RelationId};
use crate::Metadata;

/// The kind of provenance relationship between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationType {
    /// Entity was produced by an activity.
    WasGeneratedBy,
    /// Activity consumed an entity.
    Used,
    /// Entity is ascribed to an agent.
    WasAttributedTo,
    /// Activity was carried out by an agent.
    WasAssociatedWith,
    /// Entity was derived from another entity.
    WasDerivedFrom,
}

impl RelationType {
    /// Every relation type, in PROV document order.
    pub const ALL: [RelationType; 5] = [
        Self::WasGeneratedBy,
        Self::Used,
        Self::WasAttributedTo,
        Self::WasAssociatedWith,
        Self::WasDerivedFrom,
    ];

    /// The PROV term naming this relation.
    pub fn prov_term(&self) -> &'static str {
        match self {
            Self::WasGeneratedBy => "wasGeneratedBy",
            Self::Used => "used",
            Self::WasAttributedTo => "wasAttributedTo",
            Self::WasAssociatedWith => "wasAssociatedWith",
            Self::WasDerivedFrom => "wasDerivedFrom",
        }
    }

    /// Node kind required at the source end.
    pub fn source_kind(&self) -> NodeKind {
        match self {
            Self::WasGeneratedBy | Self::WasAttributedTo | Self::WasDerivedFrom => NodeKind::Entity,
            Self::Used | Self::WasAssociatedWith => NodeKind::Activity,
        }
    }

    /// Node kind required at the target end.
    pub fn target_kind(&self) -> NodeKind {
        match self {
            Self::WasGeneratedBy => NodeKind::Activity,
            Self::Used | Self::WasDerivedFrom => NodeKind::Entity,
            Self::WasAttributedTo | Self::WasAssociatedWith => NodeKind::Agent,
        }
    }

    /// Returns `true` for the data-flow relations followed by lineage
    /// traversal (`used`, `wasDerivedFrom`, `wasGeneratedBy`).
    pub fn is_lineage_edge(&self) -> bool {
        matches!(self, Self::Used | Self::WasDerivedFrom | Self::WasGeneratedBy)
    }

    /// Returns `true` if the given endpoints have the kinds this type requires.
    pub fn accepts(&self, source: &NodeRef, target: &NodeRef) -> bool {
        source.kind() == self.source_kind() && target.kind() == self.target_kind()
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prov_term())
    }
}

impl FromStr for RelationType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.prov_term() == s)
            .ok_or_else(|| TypeError::UnknownRelationType(s.to_string()))
    }
}

/// A stored, typed edge of the provenance graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub relation_type: RelationType,
    pub source: NodeRef,
    pub target: NodeRef,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    /// Returns `true` if either endpoint is `node`.
    pub fn touches(&self, node: &NodeRef) -> bool {
        &self.source == node || &self.target == node
    }

    /// Returns a human-readable summary of this relation.
    pub fn summary(&self) -> String {
        format!("{} {} {}", self.source, self.relation_type, self.target)
    }
}

/// Request to add a [`Relation`].
///
/// The generic constructor accepts any endpoints; the store rejects
/// endpoint kinds that do not match the relation type. The named
/// constructors can only build well-kinded requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRelation {
    pub relation_type: RelationType,
    pub source: NodeRef,
    pub target: NodeRef,
    pub metadata: Metadata,
}

impl NewRelation {
    pub fn new(
        relation_type: RelationType,
        source: impl Into<NodeRef>,
        target: impl Into<NodeRef>,
    ) -> Self {
        Self {
            relation_type,
            source: source.into(),
            target: target.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn was_generated_by(entity: EntityId, activity: ActivityId) -> Self {
        Self::new(RelationType::WasGeneratedBy, entity, activity)
    }

    pub fn used(activity: ActivityId, entity: EntityId) -> Self {
        Self::new(RelationType::Used, activity, entity)
    }

    pub fn was_attributed_to(entity: EntityId, agent: AgentId) -> Self {
        Self::new(RelationType::WasAttributedTo, entity, agent)
    }

    pub fn was_associated_with(activity: ActivityId, agent: AgentId) -> Self {
        Self::new(RelationType::WasAssociatedWith, activity, agent)
    }

    pub fn was_derived_from(derived: EntityId, source: EntityId) -> Self {
        Self::new(RelationType::WasDerivedFrom, derived, source)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns `true` if the endpoint kinds match the relation type.
    pub fn is_well_kinded(&self) -> bool {
        self.relation_type.accepts(&self.source, &self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prov_terms_round_trip() {
        for relation in RelationType::ALL {
            assert_eq!(relation.prov_term().parse::<RelationType>().unwrap(), relation);
        }
    }

    #[test]
    fn unknown_term_is_rejected() {
        let result = "wasInformedBy".parse::<RelationType>();
        assert!(matches!(result, Err(TypeError::UnknownRelationType(_))));
    }

    #[test]
    fn serde_uses_prov_terms() {
        let json = serde_json::to_string(&RelationType::WasDerivedFrom).unwrap();
        assert_eq!(json, "\"wasDerivedFrom\"");
        let parsed: RelationType = serde_json::from_str("\"used\"").unwrap();
        assert_eq!(parsed, RelationType::Used);
        assert!(serde_json::from_str::<RelationType>("\"dependsOn\"").is_err());
    }

    #[test]
    fn lineage_edges() {
        assert!(RelationType::Used.is_lineage_edge());
        assert!(RelationType::WasDerivedFrom.is_lineage_edge());
        assert!(RelationType::WasGeneratedBy.is_lineage_edge());
        assert!(!RelationType::WasAttributedTo.is_lineage_edge());
        assert!(!RelationType::WasAssociatedWith.is_lineage_edge());
    }

    #[test]
    fn named_constructors_are_well_kinded() {
        let (e1, e2) = (EntityId::new(), EntityId::new());
        let activity = ActivityId::new();
        let agent = AgentId::new();
        let requests = [
            NewRelation::was_generated_by(e1, activity),
            NewRelation::used(activity, e1),
            NewRelation::was_attributed_to(e1, agent),
            NewRelation::was_associated_with(activity, agent),
            NewRelation::was_derived_from(e2, e1),
        ];
        assert!(requests.iter().all(NewRelation::is_well_kinded));
    }

    #[test]
    fn mismatched_endpoints_are_detected() {
        let request = NewRelation::new(RelationType::Used, EntityId::new(), ActivityId::new());
        assert!(!request.is_well_kinded());
    }
}
