//! Lineage graph results.
//!
//! A [`Graph`] is the read-only outcome of a traversal. Nodes are
//! deduplicated by [`NodeRef`] and kept in discovery order; edges are
//! deduplicated by relation id only, so parallel relations between the
//! same pair of nodes all survive. Graphs are assembled with a
//! [`GraphBuilder`].

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::activity::Activity;
use crate::agent::Agent;
use crate::entity::Entity;
use crate::id::{NodeKind, NodeRef, RelationId};
use crate::relation::Relation;

/// One node of a lineage graph.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Node {
    Entity(Entity),
    Activity(Activity),
    Agent(Agent),
}

impl Node {
    pub fn node_ref(&self) -> NodeRef {
        match self {
            Self::Entity(e) => NodeRef::Entity(e.id),
            Self::Activity(a) => NodeRef::Activity(a.id),
            Self::Agent(a) => NodeRef::Agent(a.id),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.node_ref().kind()
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Entity(e) => &e.name,
            Self::Activity(a) => &a.name,
            Self::Agent(a) => &a.name,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            Self::Activity(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_agent(&self) -> Option<&Agent> {
        match self {
            Self::Agent(a) => Some(a),
            _ => None,
        }
    }
}

/// Read-only bundle of nodes and edges produced by a traversal.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Graph {
    root: Option<NodeRef>,
    nodes: Vec<Node>,
    edges: Vec<Relation>,
    /// References met during the walk whose records no longer exist.
    dangling: Vec<NodeRef>,
    /// Set when the walk stopped early at the visited-node ceiling.
    truncated: bool,
    #[serde(skip)]
    index: HashMap<NodeRef, usize>,
}

impl Graph {
    /// A graph with no nodes, e.g. for an unknown starting id.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The node the traversal started from.
    pub fn root(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Relation] {
        &self.edges
    }

    pub fn dangling(&self) -> &[NodeRef] {
        &self.dangling
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.index.contains_key(node)
    }

    pub fn node(&self, node: &NodeRef) -> Option<&Node> {
        self.index.get(node).map(|&i| &self.nodes[i])
    }

    pub fn node_refs(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.nodes.iter().map(Node::node_ref)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.nodes.iter().filter_map(Node::as_entity)
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.nodes.iter().filter_map(Node::as_activity)
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.nodes.iter().filter_map(Node::as_agent)
    }
}

/// Incremental, deduplicating constructor for [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
    edge_ids: HashSet<RelationId>,
}

impl GraphBuilder {
    pub fn new(root: Option<NodeRef>) -> Self {
        Self {
            graph: Graph {
                root,
                ..Graph::default()
            },
            edge_ids: HashSet::new(),
        }
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.graph.contains(node)
    }

    pub fn node_count(&self) -> usize {
        self.graph.nodes.len()
    }

    /// Add a node. Returns `false` if it was already present.
    pub fn insert_node(&mut self, node: Node) -> bool {
        let node_ref = node.node_ref();
        if self.graph.index.contains_key(&node_ref) {
            return false;
        }
        self.graph.index.insert(node_ref, self.graph.nodes.len());
        self.graph.nodes.push(node);
        true
    }

    /// Add an edge. Returns `false` if a relation with the same id was
    /// already present.
    pub fn insert_edge(&mut self, relation: Relation) -> bool {
        if !self.edge_ids.insert(relation.id) {
            return false;
        }
        self.graph.edges.push(relation);
        true
    }

    pub fn mark_dangling(&mut self, node: NodeRef) {
        if !self.graph.dangling.contains(&node) {
            self.graph.dangling.push(node);
        }
    }

    pub fn mark_truncated(&mut self) {
        self.graph.truncated = true;
    }

    /// Union another graph into this one.
    pub fn merge(&mut self, other: Graph) {
        for node in other.nodes {
            self.insert_node(node);
        }
        for edge in other.edges {
            self.insert_edge(edge);
        }
        for node in other.dangling {
            self.mark_dangling(node);
        }
        self.graph.truncated |= other.truncated;
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}
