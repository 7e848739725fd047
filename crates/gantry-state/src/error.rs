//! Error types for the deployment store.

use thiserror::Error;

/// Errors surfaced by [`crate::DeploymentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("table operation failed: {0}")]
    Table(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error("deserialization failed: {0}")]
    Deserialize(String),
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;
