//! redb table definitions for the deployment store.
//!
//! All keys are strings and all values are JSON-serialized records.
//! Deployment rows use the composite key
//! `{service_id}:{created_at:020}:{deployment_id}` so a single range
//! scan walks one service's history in creation order. Service IDs
//! must therefore not contain `:`.

use redb::TableDefinition;

/// Deployment records, keyed by `{service_id}:{created_at:020}:{id}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Deployment id -> row key in [`DEPLOYMENTS`], for direct lookups.
pub const DEPLOYMENT_INDEX: TableDefinition<&str, &str> = TableDefinition::new("deployment_index");
