use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lineage_store::{with_view, LineageStore, LineageView, RelationFilter, StoreResult};
use lineage_types::{EntityId, Graph, GraphBuilder, Node, NodeRef, Relation};

/// Bounds applied to every traversal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalLimits {
    /// Most nodes a single walk will visit (default: 10 000).
    pub max_nodes: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self { max_nodes: 10_000 }
    }
}

/// Which way a walk follows lineage edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// From a record to what it was made from (edge source to target).
    Ancestors,
    /// From a record to what was made from it (edge target to source).
    Descendants,
}

impl Direction {
    fn filter(self, node: NodeRef) -> RelationFilter {
        match self {
            Self::Ancestors => RelationFilter::from_source(node),
            Self::Descendants => RelationFilter::to_target(node),
        }
    }

    fn next(self, relation: &Relation) -> NodeRef {
        match self {
            Self::Ancestors => relation.target,
            Self::Descendants => relation.source,
        }
    }
}

/// Breadth-first lineage queries over a store.
///
/// Each query runs against one consistent view of the store, so a walk
/// never mixes states from before and after a concurrent mutation.
pub struct LineageTraversal<'a, S: LineageStore + ?Sized> {
    store: &'a S,
    limits: TraversalLimits,
}

impl<'a, S: LineageStore + ?Sized> LineageTraversal<'a, S> {
    pub fn new(store: &'a S, limits: TraversalLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &TraversalLimits {
        &self.limits
    }

    /// Everything `entity` was derived from, including `entity` itself.
    ///
    /// `max_depth` counts hops; `Some(0)` returns only the start node and
    /// `None` walks until exhausted or the node ceiling is hit. An unknown
    /// id yields an empty graph.
    pub fn ancestors(&self, entity: &EntityId, max_depth: Option<usize>) -> StoreResult<Graph> {
        self.walk(NodeRef::Entity(*entity), Direction::Ancestors, max_depth)
    }

    /// Everything derived from `entity`, including `entity` itself.
    pub fn descendants(&self, entity: &EntityId, max_depth: Option<usize>) -> StoreResult<Graph> {
        self.walk(NodeRef::Entity(*entity), Direction::Descendants, max_depth)
    }

    /// Union of the unbounded ancestor and descendant walks.
    pub fn full_lineage(&self, entity: &EntityId) -> StoreResult<Graph> {
        with_view(self.store, |view| full_lineage_in(view, &self.limits, entity))
    }

    /// Walk lineage edges from any node in one direction.
    pub fn walk(
        &self,
        root: NodeRef,
        direction: Direction,
        max_depth: Option<usize>,
    ) -> StoreResult<Graph> {
        with_view(self.store, |view| {
            walk_in(view, &self.limits, root, direction, max_depth)
        })
    }

    /// Shortest chain of lineage edges connecting two nodes, followed in
    /// either direction. Returns `None` if either node is unknown or they
    /// are not connected within the node ceiling.
    pub fn causal_path(&self, from: NodeRef, to: NodeRef) -> StoreResult<Option<Vec<NodeRef>>> {
        with_view(self.store, |view| causal_path_in(view, &self.limits, from, to))
    }
}

/// [`LineageTraversal::walk`] over an already acquired view.
pub fn walk_in(
    view: &dyn LineageView,
    limits: &TraversalLimits,
    root: NodeRef,
    direction: Direction,
    max_depth: Option<usize>,
) -> Graph {
    let Some(start) = load(view, &root) else {
        debug!(%root, "traversal start not found");
        return Graph::empty();
    };

    let mut builder = GraphBuilder::new(Some(root));
    builder.insert_node(start);

    let mut visited = HashSet::new();
    visited.insert(root);
    let mut queue: VecDeque<(NodeRef, usize)> = VecDeque::new();
    queue.push_back((root, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }

        for relation in view.relations(&direction.filter(current)) {
            if !relation.relation_type.is_lineage_edge() {
                continue;
            }
            let next = direction.next(relation);

            if visited.contains(&next) {
                builder.insert_edge(relation.clone());
                continue;
            }
            if builder.node_count() >= limits.max_nodes {
                builder.mark_truncated();
                continue;
            }

            match load(view, &next) {
                Some(node) => {
                    visited.insert(next);
                    builder.insert_node(node);
                    builder.insert_edge(relation.clone());
                    queue.push_back((next, depth + 1));
                }
                None => {
                    warn!(from = %current, missing = %next, relation = %relation.id, "dangling lineage reference");
                    builder.mark_dangling(next);
                }
            }
        }
    }

    let graph = builder.build();
    debug!(
        %root,
        ?direction,
        nodes = graph.len(),
        edges = graph.edges().len(),
        truncated = graph.is_truncated(),
        "lineage walk complete"
    );
    graph
}

/// [`LineageTraversal::full_lineage`] over an already acquired view.
pub fn full_lineage_in(view: &dyn LineageView, limits: &TraversalLimits, entity: &EntityId) -> Graph {
    let root = NodeRef::Entity(*entity);
    let ancestors = walk_in(view, limits, root, Direction::Ancestors, None);
    if ancestors.is_empty() {
        return ancestors;
    }
    let descendants = walk_in(view, limits, root, Direction::Descendants, None);

    let mut builder = GraphBuilder::new(Some(root));
    builder.merge(ancestors);
    builder.merge(descendants);
    builder.build()
}

fn causal_path_in(
    view: &dyn LineageView,
    limits: &TraversalLimits,
    from: NodeRef,
    to: NodeRef,
) -> Option<Vec<NodeRef>> {
    if load(view, &from).is_none() || load(view, &to).is_none() {
        return None;
    }
    if from == to {
        return Some(vec![from]);
    }

    let mut predecessors: HashMap<NodeRef, Option<NodeRef>> = HashMap::new();
    predecessors.insert(from, None);
    let mut queue: VecDeque<NodeRef> = VecDeque::new();
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        if current == to {
            return Some(reconstruct_path(&predecessors, to));
        }

        for relation in view.relations(&RelationFilter::involving(current)) {
            if !relation.relation_type.is_lineage_edge() {
                continue;
            }
            let next = if relation.source == current {
                relation.target
            } else {
                relation.source
            };
            if predecessors.contains_key(&next) {
                continue;
            }
            if predecessors.len() >= limits.max_nodes {
                debug!(%from, %to, "causal path search hit node ceiling");
                return None;
            }
            predecessors.insert(next, Some(current));
            queue.push_back(next);
        }
    }

    None
}

fn load(view: &dyn LineageView, node: &NodeRef) -> Option<Node> {
    match node {
        NodeRef::Entity(id) => view.entity(id).cloned().map(Node::Entity),
        NodeRef::Activity(id) => view.activity(id).cloned().map(Node::Activity),
        NodeRef::Agent(id) => view.agent(id).cloned().map(Node::Agent),
    }
}

fn reconstruct_path(predecessors: &HashMap<NodeRef, Option<NodeRef>>, to: NodeRef) -> Vec<NodeRef> {
    let mut path = vec![to];
    let mut current = to;
    while let Some(Some(prev)) = predecessors.get(&current) {
        path.push(*prev);
        current = *prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_store::{
        ActivityFilter, AgentFilter, EntityFilter, LineageDb, StoreStats,
    };
    use lineage_types::{
        Activity, ActivityId, ActivityStatus, ActivityUpdate, Agent, AgentId, AgentUpdate,
        ContentHash, Entity, EntityUpdate, NewActivity, NewAgent, NewEntity, NewRelation,
        NodeKind, RelationId,
    };

    fn hash(byte: u8) -> String {
        ContentHash::from_digest([byte; 32]).to_string()
    }

    fn entity(db: &LineageDb, name: &str, byte: u8) -> Entity {
        db.create_entity(NewEntity::new("file", name, hash(byte)))
            .unwrap()
    }

    struct Pipeline {
        input: Entity,
        agent: Agent,
        activity: Activity,
        persona: Entity,
    }

    fn pipeline(db: &LineageDb) -> Pipeline {
        let input = entity(db, "input.csv", 1);
        let agent = db
            .get_or_create_agent(NewAgent::new("llm", "claude-sonnet"))
            .unwrap();
        let activity = db
            .create_activity(NewActivity::new("generate", "generate", agent.id).using(input.id))
            .unwrap();
        let persona = entity(db, "persona_1", 2);
        db.add_relation(NewRelation::used(activity.id, input.id)).unwrap();
        db.add_relation(NewRelation::was_associated_with(activity.id, agent.id))
            .unwrap();
        db.add_relation(NewRelation::was_generated_by(persona.id, activity.id))
            .unwrap();
        db.add_relation(NewRelation::was_attributed_to(persona.id, agent.id))
            .unwrap();
        db.complete_activity(&activity.id, ActivityStatus::Completed, &[persona.id])
            .unwrap();
        Pipeline {
            input,
            agent,
            activity,
            persona,
        }
    }

    fn refs(graph: &Graph) -> HashSet<NodeRef> {
        graph.node_refs().collect()
    }

    /// a0 <- a1 <- ... <- a(n-1), each derived from the previous one.
    fn chain(db: &LineageDb, n: u8) -> Vec<Entity> {
        let nodes: Vec<Entity> = (0..n).map(|i| entity(db, &format!("a{i}"), i)).collect();
        for pair in nodes.windows(2) {
            db.add_relation(NewRelation::was_derived_from(pair[1].id, pair[0].id))
                .unwrap();
        }
        nodes
    }

    #[test]
    fn ancestors_of_generated_output() {
        let db = LineageDb::in_memory();
        let p = pipeline(&db);
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());

        let graph = traversal.ancestors(&p.persona.id, None).unwrap();
        let expected: HashSet<NodeRef> = [
            NodeRef::Entity(p.input.id),
            NodeRef::Activity(p.activity.id),
            NodeRef::Entity(p.persona.id),
        ]
        .into_iter()
        .collect();
        assert_eq!(refs(&graph), expected);
        assert_eq!(graph.root(), Some(&NodeRef::Entity(p.persona.id)));
        assert_eq!(graph.agents().count(), 0);
        // wasGeneratedBy and used; attribution is not a lineage edge.
        assert_eq!(graph.edges().len(), 2);
        assert!(!graph.contains(&NodeRef::Agent(p.agent.id)));
    }

    #[test]
    fn ancestors_of_minimal_generation() {
        let db = LineageDb::in_memory();
        let input = db
            .create_entity(NewEntity::new(
                "input_file",
                "input.csv",
                format!("sha256:{}", "a".repeat(64)),
            ))
            .unwrap();
        let agent = db.create_agent(NewAgent::new("llm", "claude-sonnet")).unwrap();
        let activity = db
            .create_activity(NewActivity::new("generate", "generate", agent.id).using(input.id))
            .unwrap();
        let persona = db
            .create_entity(
                NewEntity::new("persona", "persona_1", format!("sha256:{}", "b".repeat(64)))
                    .generated_by(activity.id),
            )
            .unwrap();
        db.add_relation(NewRelation::was_generated_by(persona.id, activity.id))
            .unwrap();
        db.add_relation(NewRelation::used(activity.id, input.id)).unwrap();

        let graph = LineageTraversal::new(&db, TraversalLimits::default())
            .ancestors(&persona.id, None)
            .unwrap();
        let expected: HashSet<NodeRef> = [
            NodeRef::Entity(input.id),
            NodeRef::Activity(activity.id),
            NodeRef::Entity(persona.id),
        ]
        .into_iter()
        .collect();
        assert_eq!(refs(&graph), expected);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edges().len(), 2);
        assert!(graph.dangling().is_empty());
    }

    #[test]
    fn descendants_mirror_ancestors() {
        let db = LineageDb::in_memory();
        let p = pipeline(&db);
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());

        let graph = traversal.descendants(&p.input.id, None).unwrap();
        assert!(graph.contains(&NodeRef::Activity(p.activity.id)));
        assert!(graph.contains(&NodeRef::Entity(p.persona.id)));
        assert_eq!(graph.len(), 3);

        let leaf = traversal.descendants(&p.persona.id, None).unwrap();
        assert_eq!(leaf.len(), 1);
    }

    #[test]
    fn depth_zero_returns_only_start() {
        let db = LineageDb::in_memory();
        let p = pipeline(&db);
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());

        let graph = traversal.ancestors(&p.persona.id, Some(0)).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.edges().is_empty());
        assert_eq!(graph.nodes()[0].kind(), NodeKind::Entity);
    }

    #[test]
    fn depth_limits_hops() {
        let db = LineageDb::in_memory();
        let nodes = chain(&db, 6);
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());

        let graph = traversal.ancestors(&nodes[5].id, Some(2)).unwrap();
        let names: Vec<&str> = graph.nodes().iter().map(Node::name).collect();
        assert_eq!(names, vec!["a5", "a4", "a3"]);
        assert!(!graph.is_truncated());
    }

    #[test]
    fn unknown_start_yields_empty_graph() {
        let db = LineageDb::in_memory();
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());
        let graph = traversal.ancestors(&EntityId::new(), None).unwrap();
        assert!(graph.is_empty());
        assert!(graph.root().is_none());
        assert!(traversal.full_lineage(&EntityId::new()).unwrap().is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let db = LineageDb::in_memory();
        let a = entity(&db, "a", 1);
        let b = entity(&db, "b", 2);
        db.add_relation(NewRelation::was_derived_from(a.id, b.id)).unwrap();
        db.add_relation(NewRelation::was_derived_from(b.id, a.id)).unwrap();
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());

        let up = traversal.ancestors(&a.id, None).unwrap();
        assert_eq!(up.len(), 2);
        assert_eq!(up.edges().len(), 2);

        let down = traversal.descendants(&a.id, None).unwrap();
        assert_eq!(down.len(), 2);
    }

    #[test]
    fn parallel_relations_are_distinct_edges() {
        let db = LineageDb::in_memory();
        let a = entity(&db, "a", 1);
        let b = entity(&db, "b", 2);
        db.add_relation(NewRelation::was_derived_from(b.id, a.id)).unwrap();
        db.add_relation(NewRelation::was_derived_from(b.id, a.id)).unwrap();
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());

        let graph = traversal.ancestors(&b.id, None).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn node_ceiling_truncates() {
        let db = LineageDb::in_memory();
        let nodes = chain(&db, 10);
        let traversal = LineageTraversal::new(&db, TraversalLimits { max_nodes: 3 });

        let graph = traversal.ancestors(&nodes[9].id, None).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.is_truncated());
        for edge in graph.edges() {
            assert!(graph.contains(&edge.source) && graph.contains(&edge.target));
        }
    }

    #[test]
    fn full_lineage_unions_both_directions() {
        let db = LineageDb::in_memory();
        let nodes = chain(&db, 5);
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());

        let graph = traversal.full_lineage(&nodes[2].id).unwrap();
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.edges().len(), 4);
        assert_eq!(graph.root(), Some(&NodeRef::Entity(nodes[2].id)));
    }

    #[test]
    fn causal_path_crosses_directions() {
        let db = LineageDb::in_memory();
        let p = pipeline(&db);
        let sibling = entity(&db, "persona_2", 3);
        db.add_relation(NewRelation::was_generated_by(sibling.id, p.activity.id))
            .unwrap();
        let traversal = LineageTraversal::new(&db, TraversalLimits::default());

        let path = traversal
            .causal_path(NodeRef::Entity(p.persona.id), NodeRef::Entity(sibling.id))
            .unwrap()
            .unwrap();
        assert_eq!(
            path,
            vec![
                NodeRef::Entity(p.persona.id),
                NodeRef::Activity(p.activity.id),
                NodeRef::Entity(sibling.id),
            ]
        );

        let lonely = entity(&db, "lonely", 4);
        assert!(traversal
            .causal_path(NodeRef::Entity(p.input.id), NodeRef::Entity(lonely.id))
            .unwrap()
            .is_none());
        assert!(traversal
            .causal_path(NodeRef::Entity(p.input.id), NodeRef::Entity(EntityId::new()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn walks_never_observe_half_applied_deletes() {
        let db = std::sync::Arc::new(LineageDb::in_memory());
        let nodes = chain(&db, 40);
        let leaf = nodes[39].id;

        let deleter = {
            let db = std::sync::Arc::clone(&db);
            let ids: Vec<EntityId> = nodes[..39].iter().map(|e| e.id).collect();
            std::thread::spawn(move || {
                for id in ids {
                    assert!(db.delete_entity(&id).unwrap());
                }
            })
        };

        let traversal = LineageTraversal::new(&*db, TraversalLimits::default());
        loop {
            let graph = traversal.ancestors(&leaf, None).unwrap();
            assert!(graph.dangling().is_empty(), "{:?}", graph.dangling());
            for edge in graph.edges() {
                assert!(graph.contains(&edge.source) && graph.contains(&edge.target));
            }
            if graph.len() == 1 {
                break;
            }
        }
        deleter.join().unwrap();
        assert_eq!(traversal.ancestors(&leaf, None).unwrap().len(), 1);
    }

    #[test]
    fn limits_deserialize_with_defaults() {
        let limits: TraversalLimits = toml::from_str("").unwrap();
        assert_eq!(limits, TraversalLimits::default());
        let limits: TraversalLimits = toml::from_str("max_nodes = 5").unwrap();
        assert_eq!(limits.max_nodes, 5);
    }

    /// Store view that pretends one activity record is gone while its
    /// relations remain.
    struct Hiding {
        inner: LineageDb,
        hidden: ActivityId,
    }

    impl LineageStore for Hiding {
        fn create_entity(&self, r: NewEntity) -> StoreResult<Entity> {
            self.inner.create_entity(r)
        }
        fn get_entity(&self, id: &EntityId) -> StoreResult<Option<Entity>> {
            self.inner.get_entity(id)
        }
        fn get_entity_by_hash(&self, h: &ContentHash) -> StoreResult<Option<Entity>> {
            self.inner.get_entity_by_hash(h)
        }
        fn list_entities(&self, f: &EntityFilter) -> StoreResult<Vec<Entity>> {
            self.inner.list_entities(f)
        }
        fn update_entity(&self, id: &EntityId, u: EntityUpdate) -> StoreResult<bool> {
            self.inner.update_entity(id, u)
        }
        fn delete_entity(&self, id: &EntityId) -> StoreResult<bool> {
            self.inner.delete_entity(id)
        }
        fn create_activity(&self, r: NewActivity) -> StoreResult<Activity> {
            self.inner.create_activity(r)
        }
        fn get_activity(&self, id: &ActivityId) -> StoreResult<Option<Activity>> {
            if *id == self.hidden {
                return Ok(None);
            }
            self.inner.get_activity(id)
        }
        fn list_activities(&self, f: &ActivityFilter) -> StoreResult<Vec<Activity>> {
            self.inner.list_activities(f)
        }
        fn update_activity(&self, id: &ActivityId, u: ActivityUpdate) -> StoreResult<bool> {
            self.inner.update_activity(id, u)
        }
        fn complete_activity(
            &self,
            id: &ActivityId,
            s: ActivityStatus,
            g: &[EntityId],
        ) -> StoreResult<bool> {
            self.inner.complete_activity(id, s, g)
        }
        fn delete_activity(&self, id: &ActivityId) -> StoreResult<bool> {
            self.inner.delete_activity(id)
        }
        fn start_activity(&self, r: NewActivity) -> StoreResult<Activity> {
            self.inner.start_activity(r)
        }
        fn record_generation(&self, id: &ActivityId, r: NewEntity) -> StoreResult<Entity> {
            self.inner.record_generation(id, r)
        }
        fn create_agent(&self, r: NewAgent) -> StoreResult<Agent> {
            self.inner.create_agent(r)
        }
        fn get_agent(&self, id: &AgentId) -> StoreResult<Option<Agent>> {
            self.inner.get_agent(id)
        }
        fn get_or_create_agent(&self, r: NewAgent) -> StoreResult<Agent> {
            self.inner.get_or_create_agent(r)
        }
        fn list_agents(&self, f: &AgentFilter) -> StoreResult<Vec<Agent>> {
            self.inner.list_agents(f)
        }
        fn update_agent(&self, id: &AgentId, u: AgentUpdate) -> StoreResult<bool> {
            self.inner.update_agent(id, u)
        }
        fn delete_agent(&self, id: &AgentId) -> StoreResult<bool> {
            self.inner.delete_agent(id)
        }
        fn add_relation(&self, r: NewRelation) -> StoreResult<Relation> {
            self.inner.add_relation(r)
        }
        fn get_relation(&self, id: &RelationId) -> StoreResult<Option<Relation>> {
            self.inner.get_relation(id)
        }
        fn get_relations(&self, f: &RelationFilter) -> StoreResult<Vec<Relation>> {
            self.inner.get_relations(f)
        }
        fn delete_relation(&self, id: &RelationId) -> StoreResult<bool> {
            self.inner.delete_relation(id)
        }
        fn stats(&self) -> StoreResult<StoreStats> {
            self.inner.stats()
        }
        fn read_view(&self, read: &mut dyn FnMut(&dyn LineageView)) -> StoreResult<()> {
            let hidden = self.hidden;
            self.inner.read_view(&mut |view| read(&HidingView { inner: view, hidden }))
        }
    }

    struct HidingView<'v> {
        inner: &'v dyn LineageView,
        hidden: ActivityId,
    }

    impl LineageView for HidingView<'_> {
        fn entity(&self, id: &EntityId) -> Option<&Entity> {
            self.inner.entity(id)
        }
        fn activity(&self, id: &ActivityId) -> Option<&Activity> {
            if *id == self.hidden {
                return None;
            }
            self.inner.activity(id)
        }
        fn agent(&self, id: &AgentId) -> Option<&Agent> {
            self.inner.agent(id)
        }
        fn relations(&self, f: &RelationFilter) -> Vec<&Relation> {
            self.inner.relations(f)
        }
        fn entities(&self) -> Box<dyn Iterator<Item = &Entity> + '_> {
            self.inner.entities()
        }
        fn activities(&self) -> Box<dyn Iterator<Item = &Activity> + '_> {
            Box::new(self.inner.activities().filter(|a| a.id != self.hidden))
        }
        fn agents(&self) -> Box<dyn Iterator<Item = &Agent> + '_> {
            self.inner.agents()
        }
    }

    #[test]
    fn dangling_references_are_listed_not_followed() {
        let db = LineageDb::in_memory();
        let p = pipeline(&db);
        let store = Hiding {
            inner: db,
            hidden: p.activity.id,
        };
        let traversal = LineageTraversal::new(&store, TraversalLimits::default());

        let graph = traversal.ancestors(&p.persona.id, None).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.dangling(), &[NodeRef::Activity(p.activity.id)]);
        assert!(graph.edges().is_empty());
    }
}
