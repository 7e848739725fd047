//! gantry-state — embedded deployment store for Gantry.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for deployment attempts: their lifecycle status, build artifacts,
//! execution job bookkeeping, and per-service history.
//!
//! # Architecture
//!
//! Deployment records are JSON-serialized into redb's `&[u8]` value column
//! under the composite key `{service_id}:{created_at:020}:{id}`, so one range
//! scan walks a service's history in creation order and newest-first paging
//! is a reverse scan. A secondary id -> key table serves direct lookups.
//!
//! Status transitions are applied inside single write transactions that
//! re-check the current status, so concurrent writers cannot resurrect a
//! terminal record. The `DeploymentStore` is `Clone` + `Send` + `Sync`
//! (backed by `Arc<Database>`) and can be shared freely across threads.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::DeploymentStore;
pub use types::*;
