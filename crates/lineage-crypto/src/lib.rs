//! Content hashing for the lineage recorder.
//!
//! Entities are identified by the SHA-256 digest of their content, in the
//! `sha256:<hex>` form. File hashing is streamed and bounded by
//! [`HashLimits`] so one oversized or slow file cannot stall a caller.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, FileDigest, HashError, HashLimits, HashResult};
