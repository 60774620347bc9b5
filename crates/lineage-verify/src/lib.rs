//! Integrity verification for recorded provenance.
//!
//! [`Verifier`] re-hashes the files behind recorded entities and compares
//! the result with the hash stored when the entity was recorded.
//! Mismatched and unverifiable files are ordinary outcomes reported in a
//! [`VerificationStatus`]; only missing store records abort a request.

pub mod error;
pub mod report;
pub mod verifier;

pub use error::{VerifyError, VerifyResult};
pub use report::{ChainReport, EntityVerification, UnverifiableReason, VerificationStatus};
pub use verifier::Verifier;
