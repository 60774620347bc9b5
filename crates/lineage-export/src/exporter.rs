use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info};

use lineage_graph::{full_lineage_in, TraversalLimits};
use lineage_store::{with_view, LineageStore, LineageView, RelationFilter};
use lineage_types::{AgentId, EntityId, Node, NodeRef, RelationId, RelationType};

use crate::document::ProvDocument;
use crate::error::{ExportError, ExportResult};

/// Serializes recorded provenance as PROV-JSON.
pub struct ProvJsonExporter<'a, S: LineageStore + ?Sized> {
    store: &'a S,
    limits: TraversalLimits,
}

impl<'a, S: LineageStore + ?Sized> ProvJsonExporter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            limits: TraversalLimits::default(),
        }
    }

    pub fn with_traversal_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Build the document for the full lineage of `root`, or for the whole
    /// store when `root` is `None`.
    ///
    /// A lineage export also carries the agents of exported activities and
    /// every attribution/association relation whose source is exported.
    /// An unknown root yields a document with empty dictionaries. The
    /// document is built from a single consistent view of the store.
    pub fn export(&self, root: Option<&EntityId>) -> ExportResult<ProvDocument> {
        let doc = with_view(self.store, |view| match root {
            Some(id) => export_lineage(view, &self.limits, id),
            None => export_all(view),
        })?;
        info!(
            root = ?root.map(ToString::to_string),
            entities = doc.entity.len(),
            activities = doc.activity.len(),
            agents = doc.agent.len(),
            relations = doc.relation_count(),
            "exported PROV-JSON"
        );
        Ok(doc)
    }

    /// [`export`](Self::export) as a JSON value.
    pub fn export_prov_json(&self, root: Option<&EntityId>) -> ExportResult<Value> {
        self.export(root)?
            .to_value()
            .map_err(|e| ExportError::Serialization(e.to_string()))
    }

    /// [`export`](Self::export) as pretty-printed JSON text.
    pub fn export_string(&self, root: Option<&EntityId>) -> ExportResult<String> {
        serde_json::to_string_pretty(&self.export(root)?)
            .map_err(|e| ExportError::Serialization(e.to_string()))
    }
}

fn export_all(view: &dyn LineageView) -> ProvDocument {
    let mut doc = ProvDocument::new();
    for entity in view.entities() {
        doc.insert_entity(entity);
    }
    for activity in view.activities() {
        doc.insert_activity(activity);
    }
    for agent in view.agents() {
        doc.insert_agent(agent);
    }
    for relation in view.relations(&RelationFilter::new()) {
        doc.insert_relation(relation);
    }
    doc
}

fn export_lineage(view: &dyn LineageView, limits: &TraversalLimits, root: &EntityId) -> ProvDocument {
    let graph = full_lineage_in(view, limits, root);
    let mut scope = Scope::default();
    let mut doc = ProvDocument::new();
    if graph.is_empty() {
        debug!(%root, "export root not found");
        return doc;
    }

    let mut agents: Vec<AgentId> = Vec::new();
    for node in graph.nodes() {
        scope.nodes.insert(node.node_ref());
        match node {
            Node::Entity(entity) => doc.insert_entity(entity),
            Node::Activity(activity) => {
                agents.push(activity.agent_id);
                doc.insert_activity(activity);
            }
            Node::Agent(agent) => doc.insert_agent(agent),
        }
    }
    for edge in graph.edges() {
        if scope.relations.insert(edge.id) {
            doc.insert_relation(edge);
        }
    }

    let sources: Vec<NodeRef> = scope.nodes.iter().copied().collect();
    for source in sources {
        for relation in view.relations(&RelationFilter::from_source(source)) {
            if !matches!(
                relation.relation_type,
                RelationType::WasAttributedTo | RelationType::WasAssociatedWith
            ) || scope.relations.contains(&relation.id)
            {
                continue;
            }
            let NodeRef::Agent(agent_id) = relation.target else {
                continue;
            };
            if include_agent(view, &mut scope, &mut doc, agent_id) {
                scope.relations.insert(relation.id);
                doc.insert_relation(relation);
            }
        }
    }
    for agent_id in agents {
        include_agent(view, &mut scope, &mut doc, agent_id);
    }

    doc
}

/// Add an agent record once. Returns `false` if it does not exist.
fn include_agent(
    view: &dyn LineageView,
    scope: &mut Scope,
    doc: &mut ProvDocument,
    id: AgentId,
) -> bool {
    let node = NodeRef::Agent(id);
    if scope.nodes.contains(&node) {
        return true;
    }
    match view.agent(&id) {
        Some(agent) => {
            scope.nodes.insert(node);
            doc.insert_agent(agent);
            true
        }
        None => false,
    }
}

#[derive(Default)]
struct Scope {
    nodes: HashSet<NodeRef>,
    relations: HashSet<RelationId>,
}
