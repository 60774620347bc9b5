//! Activity records and their `running -> completed | failed` state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::{ActivityId, AgentId, EntityId};
use crate::Metadata;

/// Lifecycle state of an activity.
///
/// Every activity starts `Running`. `Completed` and `Failed` are terminal:
/// no transition leaves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Running,
    Completed,
    Failed,
}

impl ActivityStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

/// A record of a process execution that consumes and produces entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub activity_type: String,
    pub name: String,
    /// The agent responsible for this activity.
    pub agent_id: AgentId,
    /// External grouping key (e.g. one generation run).
    pub run_id: Option<String>,
    /// Input entities, without duplicates, in insertion order.
    pub used: Vec<EntityId>,
    /// Output entities, without duplicates, in insertion order.
    pub generated: Vec<EntityId>,
    pub parameters: Metadata,
    pub status: ActivityStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn is_running(&self) -> bool {
        self.status == ActivityStatus::Running
    }

    /// Append input ids, skipping ones already recorded.
    pub fn add_used(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        push_unique(&mut self.used, ids);
    }

    /// Append output ids, skipping ones already recorded.
    pub fn add_generated(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        push_unique(&mut self.generated, ids);
    }
}

fn push_unique(target: &mut Vec<EntityId>, ids: impl IntoIterator<Item = EntityId>) {
    for id in ids {
        if !target.contains(&id) {
            target.push(id);
        }
    }
}

/// Request to create an [`Activity`]. New activities always start `Running`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub activity_type: String,
    pub name: String,
    pub agent_id: AgentId,
    pub run_id: Option<String>,
    pub used: Vec<EntityId>,
    pub parameters: Metadata,
}

impl NewActivity {
    pub fn new(activity_type: impl Into<String>, name: impl Into<String>, agent_id: AgentId) -> Self {
        Self {
            activity_type: activity_type.into(),
            name: name.into(),
            agent_id,
            run_id: None,
            used: Vec::new(),
            parameters: Metadata::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn using(mut self, entity: EntityId) -> Self {
        push_unique(&mut self.used, [entity]);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Additive changes to a running activity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityUpdate {
    pub used: Vec<EntityId>,
    pub generated: Vec<EntityId>,
    pub parameters: Metadata,
}

impl ActivityUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn using(mut self, entity: EntityId) -> Self {
        self.used.push(entity);
        self
    }

    pub fn generating(mut self, entity: EntityId) -> Self {
        self.generated.push(entity);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}
