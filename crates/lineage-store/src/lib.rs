//! Provenance record storage for the lineage recorder.
//!
//! This crate defines the [`LineageStore`] capability set used by the
//! traversal, verification, and export layers, and ships [`LineageDb`],
//! an indexed in-memory backend with an optional append-only journal.
//!
//! # Storage Backends
//!
//! - [`LineageDb::in_memory`] -- volatile store for tests and embedding
//! - [`LineageDb::open`] -- journaled store replayed from a file on open
//!
//! # Design Rules
//!
//! 1. Creation validates every foreign id and the hash format first; a
//!    rejected request persists nothing.
//! 2. Each mutation is journaled as one CRC-checked frame before it is
//!    applied, so replay sees it entirely or not at all.
//! 3. Readers take a shared lock and receive owned copies; multi-step
//!    reads run against one [`LineageView`] under a single lock.
//! 4. Deleting a node cascade-deletes every relation touching it.
//! 5. Unknown ids are absent results, never errors.

pub mod db;
pub mod error;
pub mod filter;
mod journal;
mod state;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use db::LineageDb;
pub use error::{StoreError, StoreResult};
pub use filter::{ActivityFilter, AgentFilter, EntityFilter, RelationFilter};
pub use journal::{JournalConfig, SyncMode};
pub use traits::{with_view, LineageStore, LineageView, StoreStats};
