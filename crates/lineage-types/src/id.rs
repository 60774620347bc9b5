use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! record_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered identifier (UUID v7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Short representation (first 8 characters of the UUID).
            pub fn short_id(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| TypeError::InvalidId(format!("{s}: {e}")))
            }
        }
    };
}

record_id! {
    /// Identifier of an [`Entity`](crate::Entity).
    EntityId
}

record_id! {
    /// Identifier of an [`Activity`](crate::Activity).
    ActivityId
}

record_id! {
    /// Identifier of an [`Agent`](crate::Agent).
    AgentId
}

record_id! {
    /// Identifier of a [`Relation`](crate::Relation).
    RelationId
}

/// The three node kinds of the provenance graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Entity,
    Activity,
    Agent,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Activity => "activity",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity" => Ok(Self::Entity),
            "activity" => Ok(Self::Activity),
            "agent" => Ok(Self::Agent),
            other => Err(TypeError::UnknownNodeKind(other.to_string())),
        }
    }
}

/// A reference to one node of the provenance graph, tagged with its kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    Entity(EntityId),
    Activity(ActivityId),
    Agent(AgentId),
}

impl NodeRef {
    /// The kind of node referenced.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Entity(_) => NodeKind::Entity,
            Self::Activity(_) => NodeKind::Activity,
            Self::Agent(_) => NodeKind::Agent,
        }
    }

    /// The referenced id's UUID, regardless of kind.
    pub fn uuid(&self) -> &uuid::Uuid {
        match self {
            Self::Entity(id) => id.as_uuid(),
            Self::Activity(id) => id.as_uuid(),
            Self::Agent(id) => id.as_uuid(),
        }
    }

    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_activity(&self) -> Option<ActivityId> {
        match self {
            Self::Activity(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_agent(&self) -> Option<AgentId> {
        match self {
            Self::Agent(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.uuid())
    }
}

impl From<EntityId> for NodeRef {
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

impl From<ActivityId> for NodeRef {
    fn from(id: ActivityId) -> Self {
        Self::Activity(id)
    }
}

impl From<AgentId> for NodeRef {
    fn from(id: AgentId) -> Self {
        Self::Agent(id)
    }
}
