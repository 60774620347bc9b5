use thiserror::Error;

/// Errors produced by type parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid content hash {value:?}: {reason}")]
    InvalidHash { value: String, reason: String },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown relation type: {0}")]
    UnknownRelationType(String),

    #[error("unknown activity status: {0}")]
    UnknownStatus(String),

    #[error("unknown node kind: {0}")]
    UnknownNodeKind(String),
}
