//! Foundation types for the lineage recorder.
//!
//! This crate provides the provenance data model shared by every other
//! lineage crate. It follows the W3C PROV core: entities are data
//! artifacts, activities are process executions, agents are the actors
//! responsible for them, and relations connect the three.
//!
//! # Key Types
//!
//! - [`Entity`]: Data artifact identified by a [`ContentHash`]
//! - [`Activity`]: Process execution with an [`ActivityStatus`] state machine
//! - [`Agent`]: Human, model, or tool responsible for activities
//! - [`Relation`]: Typed edge drawn from the closed [`RelationType`] set
//! - [`Graph`]: Read-only traversal result built by [`GraphBuilder`]

pub mod activity;
pub mod agent;
pub mod entity;
pub mod error;
pub mod graph;
pub mod hash;
pub mod id;
pub mod relation;

use std::collections::BTreeMap;

pub use activity::{Activity, ActivityStatus, ActivityUpdate, NewActivity};
pub use agent::{Agent, AgentKey, AgentUpdate, NewAgent};
pub use entity::{Entity, EntityUpdate, NewEntity};
pub use error::TypeError;
pub use graph::{Graph, GraphBuilder, Node};
pub use hash::ContentHash;
pub use id::{ActivityId, AgentId, EntityId, NodeKind, NodeRef, RelationId};
pub use relation::{NewRelation, Relation, RelationType};

/// Free-form annotations attached to records.
pub type Metadata = BTreeMap<String, serde_json::Value>;
