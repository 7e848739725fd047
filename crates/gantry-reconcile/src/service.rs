//! Service records — the control plane's view of one deployable unit.
//!
//! Services are owned and persisted by the surrounding platform; the
//! reconciliation layer only reads them. In particular the
//! `current_deployment` pointer is advanced by the platform when a
//! deployment goes live, never by this crate.

use gantry_core::ResourceDefinition;
use serde::{Deserialize, Serialize};

/// A service as handed to the reconciliation layer: its declared
/// resource definition and a pointer at the deployment currently
/// serving traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    /// Declared (desired) resource definition. `None` until the service
    /// is first configured.
    pub config: Option<ResourceDefinition>,
    /// Id of the deployment currently serving traffic, if any.
    pub current_deployment: Option<String>,
}

impl ServiceRecord {
    /// Create an unconfigured service record.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            config: None,
            current_deployment: None,
        }
    }

    /// Attach the declared resource definition.
    pub fn with_config(mut self, config: ResourceDefinition) -> Self {
        self.config = Some(config);
        self
    }
}
