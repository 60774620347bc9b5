//! Lineage traversal for the provenance recorder.
//!
//! Walks the `used`, `wasDerivedFrom`, and `wasGeneratedBy` edges held by
//! any [`LineageStore`](lineage_store::LineageStore) to answer ancestry,
//! impact, and path queries. Every walk is breadth-first, visits each
//! node once, and is bounded by a depth limit and a node ceiling, so
//! malformed (cyclic) data cannot cause non-termination.

pub mod traversal;

pub use traversal::{full_lineage_in, walk_in, Direction, LineageTraversal, TraversalLimits};
