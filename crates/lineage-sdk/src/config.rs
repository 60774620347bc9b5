use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lineage_crypto::HashLimits;
use lineage_graph::TraversalLimits;
use lineage_store::JournalConfig;

use crate::error::{SdkError, SdkResult};

/// Recorder configuration.
///
/// ```toml
/// database_path = "lineage.journal"   # omit for an in-memory store
///
/// [journal]
/// sync_mode = "every_write"           # or "os_default"
///
/// [traversal]
/// max_nodes = 10000
///
/// [hashing]
/// max_bytes = 1073741824
/// timeout_ms = 30000
/// ```
///
/// Every section and key is optional and falls back to its default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    /// Journal file backing the store. `None` keeps records in memory.
    pub database_path: Option<PathBuf>,
    pub journal: JournalConfig,
    pub traversal: TraversalLimits,
    pub hashing: HashLimits,
}

impl LineageConfig {
    /// Configuration for a volatile store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a journaled store at `path`.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(toml_str: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| SdkError::Config {
            source_name: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate("<string>")?;
        Ok(config)
    }

    /// Load a TOML file. A relative `database_path` is resolved against
    /// the directory containing the file.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let source_name = path.display().to_string();
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| SdkError::Config {
            source_name: source_name.clone(),
            message: e.to_string(),
        })?;

        if let (Some(db), Some(dir)) = (&config.database_path, path.parent()) {
            if db.is_relative() {
                config.database_path = Some(dir.join(db));
            }
        }
        config.validate(&source_name)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config {
            source_name: "<serialize>".to_string(),
            message: e.to_string(),
        })
    }

    fn validate(&self, source_name: &str) -> SdkResult<()> {
        let invalid = |field: &str, message: &str| SdkError::Config {
            source_name: source_name.to_string(),
            message: format!("{field}: {message}"),
        };
        if self.traversal.max_nodes == 0 {
            return Err(invalid("traversal.max_nodes", "must be greater than 0"));
        }
        if self.hashing.max_bytes == 0 {
            return Err(invalid("hashing.max_bytes", "must be greater than 0"));
        }
        if self.hashing.timeout_ms == 0 {
            return Err(invalid("hashing.timeout_ms", "must be greater than 0"));
        }
        if matches!(&self.database_path, Some(p) if p.as_os_str().is_empty()) {
            return Err(invalid("database_path", "must not be empty"));
        }
        Ok(())
    }
}
