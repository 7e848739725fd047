//! gantry-reconcile — drift detection and deployment lifecycle control.
//!
//! Sits between the platform's API/reconcile loop and `gantry-state`.
//! The [`DriftDetector`] compares a service's declared resource
//! definition against the one captured on its current deployment and
//! answers: in sync, redeploy, or rebuild. The [`DeploymentController`]
//! owns submission policy (what a fresh or retried attempt carries) and
//! the cancellation policies for superseded or stale attempts.
//!
//! # Architecture
//!
//! Both pieces hold a cloned `DeploymentStore` handle and are safe to
//! share across request handlers. Classification is read-only; every
//! mutation goes through the store's guarded single-transaction
//! transitions, so concurrent callers race safely and losers see benign
//! `None`/zero-count outcomes.

pub mod controller;
pub mod drift;
pub mod error;
pub mod service;

pub use controller::DeploymentController;
pub use drift::{build_drift, deploy_drift, DriftDetector, DriftVerdict};
pub use error::{ReconcileError, ReconcileResult};
pub use service::ServiceRecord;
