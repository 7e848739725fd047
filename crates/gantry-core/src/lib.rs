//! gantry-core — shared domain types for the Gantry engine.
//!
//! Defines the [`ResourceDefinition`] document (the canonical structured
//! workload specification captured at each deployment), the service
//! manifest parser (`gantry.toml`), and the sanitizer that strips
//! secret-bearing fields before a definition is persisted.

pub mod manifest;
pub mod sanitize;
pub mod types;

pub use manifest::ServiceManifest;
pub use types::*;
