use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;
use serde_json::{json, Map, Value};

use lineage_types::{Activity, Agent, Entity, Metadata, NodeRef, Relation, RelationType};

/// Namespace prefixes declared by every exported document.
pub const NAMESPACES: [(&str, &str); 3] = [
    ("lineage", "urn:lineage:"),
    ("meta", "urn:lineage:meta:"),
    ("param", "urn:lineage:param:"),
];

/// Datatype tag of literals holding structured JSON values.
pub const JSON_LITERAL_TYPE: &str = "lineage:json";

/// Qualified PROV identifier of a record, e.g. `lineage:0190...`.
pub fn qualified_id(id: impl Display) -> String {
    format!("lineage:{id}")
}

/// A PROV-JSON document.
///
/// Each record and relation appears at most once; inserting the same id
/// twice overwrites the earlier entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProvDocument {
    pub prefix: BTreeMap<String, String>,
    pub entity: Map<String, Value>,
    pub activity: Map<String, Value>,
    pub agent: Map<String, Value>,
    #[serde(rename = "wasGeneratedBy")]
    pub was_generated_by: Map<String, Value>,
    pub used: Map<String, Value>,
    #[serde(rename = "wasAttributedTo")]
    pub was_attributed_to: Map<String, Value>,
    #[serde(rename = "wasAssociatedWith")]
    pub was_associated_with: Map<String, Value>,
    #[serde(rename = "wasDerivedFrom")]
    pub was_derived_from: Map<String, Value>,
}

impl ProvDocument {
    /// An empty document with the namespace block filled in.
    pub fn new() -> Self {
        Self {
            prefix: NAMESPACES
                .iter()
                .map(|(name, uri)| (name.to_string(), uri.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    /// The dictionary holding relations of the given type.
    pub fn relations(&self, relation_type: RelationType) -> &Map<String, Value> {
        match relation_type {
            RelationType::WasGeneratedBy => &self.was_generated_by,
            RelationType::Used => &self.used,
            RelationType::WasAttributedTo => &self.was_attributed_to,
            RelationType::WasAssociatedWith => &self.was_associated_with,
            RelationType::WasDerivedFrom => &self.was_derived_from,
        }
    }

    fn relations_mut(&mut self, relation_type: RelationType) -> &mut Map<String, Value> {
        match relation_type {
            RelationType::WasGeneratedBy => &mut self.was_generated_by,
            RelationType::Used => &mut self.used,
            RelationType::WasAttributedTo => &mut self.was_attributed_to,
            RelationType::WasAssociatedWith => &mut self.was_associated_with,
            RelationType::WasDerivedFrom => &mut self.was_derived_from,
        }
    }

    /// Total number of relation entries across all kinds.
    pub fn relation_count(&self) -> usize {
        RelationType::ALL
            .iter()
            .map(|t| self.relations(*t).len())
            .sum()
    }

    pub fn insert_entity(&mut self, entity: &Entity) {
        let mut attrs = Map::new();
        attrs.insert("prov:type".into(), json!(entity.entity_type));
        attrs.insert("prov:label".into(), json!(entity.name));
        attrs.insert("lineage:hash".into(), json!(entity.hash.as_str()));
        if let Some(path) = &entity.path {
            attrs.insert("lineage:path".into(), json!(path.display().to_string()));
        }
        if let Some(size) = entity.size_bytes {
            attrs.insert("lineage:sizeBytes".into(), json!(size));
        }
        attrs.insert("lineage:createdAt".into(), json!(entity.created_at.to_rfc3339()));
        extend_namespaced(&mut attrs, "meta", &entity.metadata);
        self.entity.insert(qualified_id(entity.id), Value::Object(attrs));
    }

    pub fn insert_activity(&mut self, activity: &Activity) {
        let mut attrs = Map::new();
        attrs.insert("prov:type".into(), json!(activity.activity_type));
        attrs.insert("prov:label".into(), json!(activity.name));
        attrs.insert("prov:startTime".into(), json!(activity.started_at.to_rfc3339()));
        if let Some(ended) = activity.ended_at {
            attrs.insert("prov:endTime".into(), json!(ended.to_rfc3339()));
        }
        attrs.insert("lineage:status".into(), json!(activity.status.as_str()));
        if let Some(run_id) = &activity.run_id {
            attrs.insert("lineage:runId".into(), json!(run_id));
        }
        extend_namespaced(&mut attrs, "param", &activity.parameters);
        self.activity.insert(qualified_id(activity.id), Value::Object(attrs));
    }

    pub fn insert_agent(&mut self, agent: &Agent) {
        let mut attrs = Map::new();
        attrs.insert("prov:type".into(), json!(agent.agent_type));
        attrs.insert("prov:label".into(), json!(agent.name));
        if let Some(version) = &agent.version {
            attrs.insert("lineage:version".into(), json!(version));
        }
        if let Some(provider) = &agent.provider {
            attrs.insert("lineage:provider".into(), json!(provider));
        }
        attrs.insert("lineage:createdAt".into(), json!(agent.created_at.to_rfc3339()));
        extend_namespaced(&mut attrs, "meta", &agent.metadata);
        self.agent.insert(qualified_id(agent.id), Value::Object(attrs));
    }

    pub fn insert_relation(&mut self, relation: &Relation) {
        let (source_attr, target_attr) = endpoint_attributes(relation.relation_type);
        let mut attrs = Map::new();
        attrs.insert(source_attr.into(), json!(node_id(&relation.source)));
        attrs.insert(target_attr.into(), json!(node_id(&relation.target)));
        attrs.insert("lineage:createdAt".into(), json!(relation.created_at.to_rfc3339()));
        extend_namespaced(&mut attrs, "meta", &relation.metadata);
        self.relations_mut(relation.relation_type)
            .insert(format!("_:{}", relation.id), Value::Object(attrs));
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// PROV attribute names of a relation's source and target.
pub fn endpoint_attributes(relation_type: RelationType) -> (&'static str, &'static str) {
    match relation_type {
        RelationType::WasGeneratedBy => ("prov:entity", "prov:activity"),
        RelationType::Used => ("prov:activity", "prov:entity"),
        RelationType::WasAttributedTo => ("prov:entity", "prov:agent"),
        RelationType::WasAssociatedWith => ("prov:activity", "prov:agent"),
        RelationType::WasDerivedFrom => ("prov:generatedEntity", "prov:usedEntity"),
    }
}

fn node_id(node: &NodeRef) -> String {
    qualified_id(node.uuid())
}

fn extend_namespaced(attrs: &mut Map<String, Value>, prefix: &str, values: &Metadata) {
    for (key, value) in values {
        attrs.insert(format!("{prefix}:{}", local_name(key)), literal(value));
    }
}

/// Percent-encode a free-form key into a valid qualified-name local part.
///
/// Only ASCII alphanumerics and `-_.~` survive unescaped, and a local part
/// may not start with `-` or `.` nor end with `.`.
pub fn local_name(key: &str) -> String {
    let mut name = urlencoding::encode(key).into_owned();
    if name.ends_with('.') {
        name.pop();
        name.push_str("%2E");
    }
    match name.as_bytes().first() {
        Some(b'-') => name.replace_range(..1, "%2D"),
        Some(b'.') => name.replace_range(..1, "%2E"),
        _ => {}
    }
    name
}

/// Scalars pass through; objects, arrays, and null become typed literals.
fn literal(value: &Value) -> Value {
    match value {
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Null | Value::Array(_) | Value::Object(_) => json!({
            "$": value.to_string(),
            "type": JSON_LITERAL_TYPE,
        }),
    }
}
