use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::AgentId;
use crate::Metadata;

/// The actor (human, model, or tool) responsible for an activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Actor category, e.g. `"llm"`, `"human"`, `"tool"`.
    pub agent_type: String,
    pub name: String,
    pub version: Option<String>,
    pub provider: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// The identity used for idempotent agent lookup.
    pub fn key(&self) -> AgentKey {
        AgentKey {
            agent_type: self.agent_type.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Lookup key for `get_or_create_agent`: type, name, and version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentKey {
    pub agent_type: String,
    pub name: String,
    pub version: Option<String>,
}

/// Request to create an [`Agent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewAgent {
    pub agent_type: String,
    pub name: String,
    pub version: Option<String>,
    pub provider: Option<String>,
    pub metadata: Metadata,
}

impl NewAgent {
    pub fn new(agent_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            name: name.into(),
            version: None,
            provider: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn key(&self) -> AgentKey {
        AgentKey {
            agent_type: self.agent_type.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Metadata keys merged into an existing agent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub metadata: Metadata,
}

impl AgentUpdate {
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
