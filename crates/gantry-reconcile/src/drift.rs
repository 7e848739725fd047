//! Drift detector — decides whether a service needs redeploying.
//!
//! Compares a service's declared resource definition against the
//! definition captured on its current deployment and classifies the
//! gap: nothing to do, redeploy the existing image with new runtime
//! parameters, or rebuild from source first. The caller (the platform's
//! reconcile loop) acts on the verdict; classification itself is
//! read-only and takes no locks.

use std::collections::HashMap;

use tracing::{debug, warn};

use gantry_core::{normalize_branch, ResourceDefinition, VolumeMount};
use gantry_state::DeploymentStore;

use crate::error::ReconcileResult;
use crate::service::ServiceRecord;

/// Outcome of a drift check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftVerdict {
    /// Declared and deployed definitions agree.
    InSync,
    /// Runtime parameters changed; the existing image can be redeployed.
    DeployOnly,
    /// Build inputs changed; rebuild from source, then deploy.
    BuildAndDeploy,
}

/// Classifies services against their deployment history.
pub struct DriftDetector {
    store: DeploymentStore,
}

impl DriftDetector {
    /// Create a detector over the shared deployment store.
    pub fn new(store: DeploymentStore) -> Self {
        Self { store }
    }

    /// Decide what must happen to bring the service's running state in
    /// line with its declared resource definition.
    ///
    /// Only the two field lists in [`build_drift`] and [`deploy_drift`]
    /// influence the verdict. Env vars and registry credentials are
    /// deliberately outside both lists: their stored values are blanked
    /// by the sanitizer and must never force a rebuild. Build drift
    /// takes precedence over deploy drift. Deterministic: same inputs,
    /// same verdict.
    pub fn classify(&self, service: &ServiceRecord) -> ReconcileResult<DriftVerdict> {
        let Some(declared) = &service.config else {
            warn!(service = %service.id, "no resource definition declared, skipping drift check");
            return Ok(DriftVerdict::InSync);
        };

        // First deploys are submitted by callers, not the drift loop.
        let Some(current_id) = &service.current_deployment else {
            return Ok(DriftVerdict::InSync);
        };
        let Some(current) = self.store.get(current_id)? else {
            warn!(
                service = %service.id,
                deployment = %current_id,
                "current deployment missing from store"
            );
            return Ok(DriftVerdict::InSync);
        };
        let Some(deployed) = &current.resource_definition else {
            // Nothing was captured for the running deployment; there is
            // no baseline to diff against.
            return Ok(DriftVerdict::InSync);
        };

        let build = build_drift(declared, deployed);
        if !build.is_empty() {
            debug!(service = %service.id, fields = ?build, "build inputs drifted");
            return Ok(DriftVerdict::BuildAndDeploy);
        }

        let deploy = deploy_drift(declared, deployed);
        if !deploy.is_empty() {
            debug!(service = %service.id, fields = ?deploy, "runtime parameters drifted");
            return Ok(DriftVerdict::DeployOnly);
        }

        Ok(DriftVerdict::InSync)
    }
}

/// Names of the build-input fields that differ between two definitions.
///
/// A non-empty result invalidates the built artifact: the image must be
/// rebuilt before deploying.
pub fn build_drift(declared: &ResourceDefinition, deployed: &ResourceDefinition) -> Vec<&'static str> {
    let mut drifted = Vec::new();
    if declared.builder != deployed.builder {
        drifted.push("builder");
    }
    if normalize_branch(&declared.branch) != normalize_branch(&deployed.branch) {
        drifted.push("branch");
    }
    if declared.database != deployed.database {
        drifted.push("database");
    }
    drifted
}

/// Names of the runtime fields that differ between two definitions.
///
/// These are deployable with the already-built image. List fields
/// compare order-insensitively so a reordered manifest does not trigger
/// a redeploy.
pub fn deploy_drift(declared: &ResourceDefinition, deployed: &ResourceDefinition) -> Vec<&'static str> {
    let mut drifted = Vec::new();
    if declared.replicas != deployed.replicas {
        drifted.push("replicas");
    }
    if !same_unordered(&declared.ports, &deployed.ports) {
        drifted.push("ports");
    }
    if !same_unordered(&declared.hosts, &deployed.hosts) {
        drifted.push("hosts");
    }
    if declared.public != deployed.public {
        drifted.push("public");
    }
    if declared.resources != deployed.resources {
        drifted.push("resources");
    }
    if !same_volumes(&declared.volumes, &deployed.volumes) {
        drifted.push("volumes");
    }
    if declared.image_override != deployed.image_override {
        drifted.push("image_override");
    }
    drifted
}

/// Order-insensitive equality for list fields.
fn same_unordered<T: Ord + Clone>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Volumes compare as a set keyed by mount name.
fn same_volumes(a: &[VolumeMount], b: &[VolumeMount]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let by_name: HashMap<&str, &VolumeMount> = a.iter().map(|v| (v.name.as_str(), v)).collect();
    b.iter().all(|v| by_name.get(v.name.as_str()) == Some(&v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{BuilderKind, DatabaseSpec, EnvVar, ResourceLimits};
    use gantry_state::{DeploymentSource, NewDeployment};

    fn base_definition() -> ResourceDefinition {
        ResourceDefinition {
            builder: BuilderKind::Railpack,
            branch: "main".to_string(),
            replicas: 1,
            ports: vec![8080],
            hosts: vec!["shop.example.com".to_string()],
            ..ResourceDefinition::default()
        }
    }

    /// Store a deployment carrying `deployed` and point a service with
    /// `declared` at it.
    fn service_with_history(
        store: &DeploymentStore,
        declared: ResourceDefinition,
        deployed: ResourceDefinition,
    ) -> ServiceRecord {
        let d = store
            .insert(NewDeployment {
                service_id: "svc-shop".to_string(),
                source: DeploymentSource::Push,
                builder: deployed.builder,
                commit: None,
                image: Some("registry.local/shop:a1b2c3".to_string()),
                resource_definition: Some(deployed),
            })
            .unwrap();
        let mut service = ServiceRecord::new("svc-shop", "shop").with_config(declared);
        service.current_deployment = Some(d.id);
        service
    }

    fn classify(declared: ResourceDefinition, deployed: ResourceDefinition) -> DriftVerdict {
        let store = DeploymentStore::open_in_memory().unwrap();
        let service = service_with_history(&store, declared, deployed);
        DriftDetector::new(store).classify(&service).unwrap()
    }

    // ── Verdicts ───────────────────────────────────────────────────

    #[test]
    fn identical_definitions_in_sync() {
        assert_eq!(
            classify(base_definition(), base_definition()),
            DriftVerdict::InSync
        );
    }

    #[test]
    fn replicas_change_is_deploy_only() {
        let mut declared = base_definition();
        declared.replicas = 3;
        assert_eq!(
            classify(declared, base_definition()),
            DriftVerdict::DeployOnly
        );
    }

    #[test]
    fn builder_change_forces_rebuild() {
        let mut declared = base_definition();
        declared.builder = BuilderKind::Docker;
        assert_eq!(
            classify(declared, base_definition()),
            DriftVerdict::BuildAndDeploy
        );
    }

    #[test]
    fn build_drift_wins_over_deploy_drift() {
        let mut declared = base_definition();
        declared.builder = BuilderKind::Docker;
        declared.replicas = 5;
        declared.public = true;
        assert_eq!(
            classify(declared, base_definition()),
            DriftVerdict::BuildAndDeploy
        );
    }

    #[test]
    fn branch_ref_prefix_is_not_drift() {
        let mut declared = base_definition();
        declared.branch = "refs/heads/main".to_string();
        assert_eq!(classify(declared, base_definition()), DriftVerdict::InSync);
    }

    #[test]
    fn branch_switch_forces_rebuild() {
        let mut declared = base_definition();
        declared.branch = "develop".to_string();
        assert_eq!(
            classify(declared, base_definition()),
            DriftVerdict::BuildAndDeploy
        );
    }

    #[test]
    fn database_provisioning_forces_rebuild() {
        let mut declared = base_definition();
        declared.database = Some(DatabaseSpec {
            engine: "postgres".to_string(),
            version: "16".to_string(),
        });
        assert_eq!(
            classify(declared, base_definition()),
            DriftVerdict::BuildAndDeploy
        );
    }

    #[test]
    fn env_and_credentials_never_drift() {
        // The stored definition has blanked env values and no
        // credential, so neither may participate in the comparison.
        let mut declared = base_definition();
        declared.env = vec![EnvVar {
            name: "API_KEY".to_string(),
            value: "sk-live".to_string(),
        }];
        declared.registry_credential = Some("ghcr-token".to_string());

        let mut deployed = base_definition();
        deployed.env = vec![EnvVar {
            name: "API_KEY".to_string(),
            value: "sk-old".to_string(),
        }];

        assert_eq!(classify(declared, deployed), DriftVerdict::InSync);
    }

    #[test]
    fn list_order_is_irrelevant() {
        let mut declared = base_definition();
        declared.ports = vec![443, 8080];
        declared.hosts = vec![
            "www.example.com".to_string(),
            "shop.example.com".to_string(),
        ];
        let mut deployed = base_definition();
        deployed.ports = vec![8080, 443];
        deployed.hosts = vec![
            "shop.example.com".to_string(),
            "www.example.com".to_string(),
        ];
        assert_eq!(classify(declared, deployed), DriftVerdict::InSync);
    }

    #[test]
    fn volume_resize_is_deploy_only() {
        let mut declared = base_definition();
        declared.volumes = vec![VolumeMount {
            name: "data".to_string(),
            mount_path: "/var/data".to_string(),
            size_gb: 10,
        }];
        let mut deployed = base_definition();
        deployed.volumes = vec![VolumeMount {
            name: "data".to_string(),
            mount_path: "/var/data".to_string(),
            size_gb: 5,
        }];
        assert_eq!(classify(declared, deployed), DriftVerdict::DeployOnly);
    }

    #[test]
    fn image_override_is_deploy_only() {
        let mut declared = base_definition();
        declared.image_override = Some("nginx:1.27".to_string());
        assert_eq!(
            classify(declared, base_definition()),
            DriftVerdict::DeployOnly
        );
    }

    #[test]
    fn resource_limit_change_is_deploy_only() {
        let mut declared = base_definition();
        declared.resources = ResourceLimits {
            memory_limit_mb: 1024,
            ..ResourceLimits::default()
        };
        assert_eq!(
            classify(declared, base_definition()),
            DriftVerdict::DeployOnly
        );
    }

    // ── Missing-history edges ──────────────────────────────────────

    #[test]
    fn unconfigured_service_is_in_sync() {
        let store = DeploymentStore::open_in_memory().unwrap();
        let service = ServiceRecord::new("svc-shop", "shop");
        let verdict = DriftDetector::new(store).classify(&service).unwrap();
        assert_eq!(verdict, DriftVerdict::InSync);
    }

    #[test]
    fn missing_history_is_in_sync() {
        let store = DeploymentStore::open_in_memory().unwrap();
        let detector = DriftDetector::new(store.clone());

        // Never deployed.
        let mut service = ServiceRecord::new("svc-shop", "shop").with_config(base_definition());
        assert_eq!(detector.classify(&service).unwrap(), DriftVerdict::InSync);

        // Pointer at a record the store does not have.
        service.current_deployment = Some("gone".to_string());
        assert_eq!(detector.classify(&service).unwrap(), DriftVerdict::InSync);

        // Record exists but never captured a definition.
        let bare = store
            .insert(NewDeployment {
                service_id: "svc-shop".to_string(),
                source: DeploymentSource::Manual,
                builder: BuilderKind::Railpack,
                commit: None,
                image: None,
                resource_definition: None,
            })
            .unwrap();
        service.current_deployment = Some(bare.id);
        assert_eq!(detector.classify(&service).unwrap(), DriftVerdict::InSync);
    }

    #[test]
    fn verdict_is_stable_across_calls() {
        let store = DeploymentStore::open_in_memory().unwrap();
        let mut declared = base_definition();
        declared.replicas = 4;
        let service = service_with_history(&store, declared, base_definition());
        let detector = DriftDetector::new(store);

        let first = detector.classify(&service).unwrap();
        let second = detector.classify(&service).unwrap();
        assert_eq!(first, DriftVerdict::DeployOnly);
        assert_eq!(first, second);
    }

    // ── Field lists ────────────────────────────────────────────────

    #[test]
    fn drift_functions_name_the_fields() {
        let mut declared = base_definition();
        declared.builder = BuilderKind::Docker;
        declared.branch = "release".to_string();
        declared.replicas = 2;
        declared.public = true;

        assert_eq!(
            build_drift(&declared, &base_definition()),
            vec!["builder", "branch"]
        );
        assert_eq!(
            deploy_drift(&declared, &base_definition()),
            vec!["replicas", "public"]
        );
        assert!(build_drift(&base_definition(), &base_definition()).is_empty());
    }
}
