use lineage_store::StoreError;

/// Errors from PROV-JSON export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type ExportResult<T> = Result<T, ExportError>;
