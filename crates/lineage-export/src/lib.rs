//! W3C PROV-JSON export for the lineage recorder.
//!
//! [`ProvJsonExporter`] serializes either the full lineage of one entity
//! or the whole store into a [`ProvDocument`]: `entity`, `activity`, and
//! `agent` dictionaries keyed by qualified ids, plus one dictionary per
//! relation kind named by its PROV term.
//!
//! Record fields map to `prov:` attributes where PROV defines one and to
//! the `lineage:` namespace otherwise. User metadata is emitted under
//! `meta:` and activity parameters under `param:`, so free-form keys never
//! shadow reserved attribute names. Their keys are percent-encoded into
//! valid qualified-name local parts (`prov:type` becomes `meta:prov%3Atype`).

pub mod document;
pub mod error;
pub mod exporter;

pub use document::{local_name, qualified_id, ProvDocument, JSON_LITERAL_TYPE, NAMESPACES};
pub use error::{ExportError, ExportResult};
pub use exporter::ProvJsonExporter;
