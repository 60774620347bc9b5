//! High-level SDK for the lineage recorder.
//!
//! Provides a unified API over the store, traversal, verification, and
//! export crates. This is the main entry point for pipelines that record
//! provenance.
//!
//! ```no_run
//! use lineage_sdk::{with_lineage, LineageConfig, NewAgent, SdkError};
//!
//! # fn main() -> Result<(), SdkError> {
//! let config = LineageConfig::persistent("lineage.journal");
//! with_lineage(config, |lineage| {
//!     let agent = NewAgent::new("llm", "claude-sonnet");
//!     let run = lineage.begin_activity("generate", "generate personas", agent, &[])?;
//!     lineage.record_output(&run.id, "persona", "persona_1", b"{}")?;
//!     Ok(())
//! })
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lineage;

pub use config::LineageConfig;
pub use error::{SdkError, SdkResult};
pub use lineage::{with_lineage, Lineage};

// Re-export key types
pub use lineage_types::{
    Activity, ActivityId, ActivityStatus, Agent, AgentId, ContentHash, Entity, EntityId, Graph,
    NewActivity, NewAgent, NewEntity, NewRelation, NodeRef, Relation, RelationType,
};
pub use lineage_store::{LineageDb, LineageStore};
pub use lineage_verify::{ChainReport, EntityVerification, VerificationStatus};
pub use lineage_export::ProvDocument;
