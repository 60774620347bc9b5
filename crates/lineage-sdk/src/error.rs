use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration in {source_name}: {message}")]
    Config {
        source_name: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("hash error: {0}")]
    Hash(#[from] lineage_crypto::HashError),

    #[error("store error: {0}")]
    Store(#[from] lineage_store::StoreError),

    #[error("verification error: {0}")]
    Verify(#[from] lineage_verify::VerifyError),

    #[error("export error: {0}")]
    Export(#[from] lineage_export::ExportError),
}

pub type SdkResult<T> = Result<T, SdkError>;
