//! The workload resource definition and its component types.
//!
//! A [`ResourceDefinition`] is the full specification of what a service
//! runs as: how its image is built, how many replicas, which ports and
//! hosts, what resources and volumes. It is serialized as a structured
//! JSON document wherever it is stored, so later field-level comparison
//! is exact and independent of serialization order.

use serde::{Deserialize, Serialize};

/// Build strategy for producing a service's container image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    /// Buildpack-style autodetected build.
    #[default]
    Railpack,
    /// Dockerfile build from the repository.
    Docker,
}

impl BuilderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuilderKind::Railpack => "railpack",
            BuilderKind::Docker => "docker",
        }
    }
}

/// Attached database, provisioned alongside the workload.
///
/// Engine or version changes require a rebuild: the build bakes the
/// client libraries and connection defaults into the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub engine: String,
    pub version: String,
}

/// CPU and memory requests/limits per replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_request_millis: u32,
    pub cpu_limit_millis: u32,
    pub memory_request_mb: u32,
    pub memory_limit_mb: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_request_millis: 250,
            cpu_limit_millis: 1000,
            memory_request_mb: 256,
            memory_limit_mb: 512,
        }
    }
}

/// A persistent volume mounted into every replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    pub size_gb: u32,
}

/// One environment variable injected into the workload.
///
/// Values are secret-bearing: stored copies of a definition carry the
/// name with an empty value (see [`crate::sanitize`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// The canonical workload specification document.
///
/// Used in two roles: a service's current *desired* configuration, and
/// the sanitized snapshot captured on a deployment recording what was
/// actually applied. Drift detection compares the two per named field,
/// never by whole-struct equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Build strategy. Build-affecting.
    pub builder: BuilderKind,
    /// Source branch, as configured. Build-affecting; comparison
    /// normalizes `refs/heads/` qualification.
    pub branch: String,
    /// Attached database, if any. Build-affecting.
    pub database: Option<DatabaseSpec>,
    /// Replica count. Deploy-only.
    pub replicas: u32,
    /// Exposed container ports. Deploy-only.
    pub ports: Vec<u16>,
    /// Host/domain bindings. Deploy-only.
    pub hosts: Vec<String>,
    /// Whether the workload is reachable from outside the cluster.
    /// Deploy-only.
    pub public: bool,
    /// Resource requests and limits. Deploy-only.
    pub resources: ResourceLimits,
    /// Mounted volumes. Deploy-only.
    pub volumes: Vec<VolumeMount>,
    /// Static image override; when set, deploys skip the build and apply
    /// this image directly. Deploy-only.
    pub image_override: Option<String>,
    /// Environment variables. Excluded from drift comparison: stored
    /// copies carry cleared values.
    pub env: Vec<EnvVar>,
    /// Pull credential for a private registry. Scrubbed from stored
    /// copies.
    pub registry_credential: Option<String>,
}

impl Default for ResourceDefinition {
    fn default() -> Self {
        Self {
            builder: BuilderKind::default(),
            branch: "main".to_string(),
            database: None,
            replicas: 1,
            ports: Vec::new(),
            hosts: Vec::new(),
            public: false,
            resources: ResourceLimits::default(),
            volumes: Vec::new(),
            image_override: None,
            env: Vec::new(),
            registry_credential: None,
        }
    }
}

/// Strip `refs/heads/` qualification so a bare branch name compares
/// equal to its fully-qualified form.
pub fn normalize_branch(branch: &str) -> &str {
    branch.strip_prefix("refs/heads/").unwrap_or(branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_branch_strips_qualification() {
        assert_eq!(normalize_branch("refs/heads/main"), "main");
        assert_eq!(normalize_branch("main"), "main");
        assert_eq!(normalize_branch("refs/heads/feature/login"), "feature/login");
        // Only head refs are normalized.
        assert_eq!(normalize_branch("refs/tags/v1"), "refs/tags/v1");
    }

    #[test]
    fn builder_kind_serializes_snake_case() {
        let json = serde_json::to_string(&BuilderKind::Railpack).unwrap();
        assert_eq!(json, "\"railpack\"");
        let back: BuilderKind = serde_json::from_str("\"docker\"").unwrap();
        assert_eq!(back, BuilderKind::Docker);
    }

    #[test]
    fn definition_roundtrips_as_structured_document() {
        let def = ResourceDefinition {
            database: Some(DatabaseSpec {
                engine: "postgres".to_string(),
                version: "16".to_string(),
            }),
            replicas: 3,
            ports: vec![8080],
            hosts: vec!["app.example.com".to_string()],
            env: vec![EnvVar {
                name: "RAILS_ENV".to_string(),
                value: "production".to_string(),
            }],
            ..Default::default()
        };

        let json = serde_json::to_string(&def).unwrap();
        let back: ResourceDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
    }
}
