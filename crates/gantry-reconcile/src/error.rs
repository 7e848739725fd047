//! Reconciliation error types.

use thiserror::Error;

/// Errors that can occur during drift checks and lifecycle control.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("service has no resource definition: {0}")]
    ServiceNotConfigured(String),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("deployment store error: {0}")]
    State(#[from] gantry_state::StoreError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
