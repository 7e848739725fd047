//! Resource-definition sanitization.
//!
//! Stored deployment history must never contain credentials. Every
//! persisted copy of a [`ResourceDefinition`] passes through
//! [`ResourceDefinition::sanitized`], which clears env var values
//! (names survive for drift diagnostics) and drops the registry
//! credential. The store's write paths are the only places that persist
//! a definition, and both apply this before serializing; an absent
//! definition stays absent via `Option::map`.

use crate::types::{EnvVar, ResourceDefinition};

impl ResourceDefinition {
    /// Return a copy safe for persistence: env var values cleared,
    /// registry credential removed. Idempotent; the input is untouched.
    pub fn sanitized(&self) -> ResourceDefinition {
        let mut clean = self.clone();
        clean.env = self
            .env
            .iter()
            .map(|var| EnvVar {
                name: var.name.clone(),
                value: String::new(),
            })
            .collect();
        clean.registry_credential = None;
        clean
    }
}
