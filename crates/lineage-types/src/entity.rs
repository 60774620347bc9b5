//! Entity records: data artifacts identified by their content hash.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::id::{ActivityId, EntityId};
use crate::Metadata;

/// An immutable record of a data artifact (input file or generated output).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Artifact category, e.g. `"input_file"` or `"persona"`.
    pub entity_type: String,
    pub name: String,
    pub hash: ContentHash,
    /// Backing file, if the artifact lives on disk.
    pub path: Option<PathBuf>,
    pub size_bytes: Option<u64>,
    pub metadata: Metadata,
    /// The activity that produced this entity, if known.
    pub generated_by: Option<ActivityId>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Returns `true` if the entity has a backing file that can be re-hashed.
    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }

    /// Returns a human-readable summary of this entity.
    pub fn summary(&self) -> String {
        format!(
            "{} '{}' ({}, {})",
            self.entity_type,
            self.name,
            self.hash.short_hex(),
            self.id.short_id()
        )
    }
}

/// Request to create an [`Entity`].
///
/// The hash is carried as a raw string; the store validates it together
/// with every other field before anything is persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub entity_type: String,
    pub name: String,
    pub hash: String,
    pub path: Option<PathBuf>,
    pub size_bytes: Option<u64>,
    pub metadata: Metadata,
    pub generated_by: Option<ActivityId>,
}

impl NewEntity {
    pub fn new(
        entity_type: impl Into<String>,
        name: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            hash: hash.into(),
            path: None,
            size_bytes: None,
            metadata: Metadata::new(),
            generated_by: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn generated_by(mut self, activity: ActivityId) -> Self {
        self.generated_by = Some(activity);
        self
    }
}

/// Mutable parts of an entity: `generated_by` backfill and additive metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub generated_by: Option<ActivityId>,
    /// Keys merged into the existing metadata (existing keys are overwritten).
    pub metadata: Metadata,
}

impl EntityUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generated_by(mut self, activity: ActivityId) -> Self {
        self.generated_by = Some(activity);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.generated_by.is_none() && self.metadata.is_empty()
    }
}
