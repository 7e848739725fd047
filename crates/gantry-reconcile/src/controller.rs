//! Deployment lifecycle controller — drives attempts through the store.
//!
//! The controller is the policy layer over `gantry-state`: it decides
//! what goes into a fresh submission, what a retry may carry over from
//! a prior attempt, and when superseded work gets cancelled. Transition
//! preconditions themselves are enforced by the store; a precondition
//! miss surfaces here as a benign `None`.

use tracing::info;

use gantry_core::ResourceDefinition;
use gantry_state::{
    CommitInfo, Deployment, DeploymentSource, DeploymentStore, NewDeployment,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::service::ServiceRecord;

/// Drives deployment attempts through their lifecycle.
pub struct DeploymentController {
    store: DeploymentStore,
}

impl DeploymentController {
    /// Create a controller over the shared deployment store.
    pub fn new(store: DeploymentStore) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &DeploymentStore {
        &self.store
    }

    // ── Submission ─────────────────────────────────────────────────

    /// Queue a fresh deployment attempt for a service.
    ///
    /// Captures the declared builder at submission time; the image and
    /// full definition are attached later, once the build pins them
    /// down. Errors when the service has no resource definition to
    /// deploy from.
    pub fn submit(
        &self,
        service: &ServiceRecord,
        source: DeploymentSource,
        commit: Option<CommitInfo>,
    ) -> ReconcileResult<Deployment> {
        let config = service
            .config
            .as_ref()
            .ok_or_else(|| ReconcileError::ServiceNotConfigured(service.id.clone()))?;

        let deployment = self.store.insert(NewDeployment {
            service_id: service.id.clone(),
            source,
            builder: config.builder,
            commit,
            image: None,
            resource_definition: None,
        })?;
        info!(
            service = %service.id,
            deployment = %deployment.id,
            source = ?source,
            builder = config.builder.as_str(),
            "deployment submitted"
        );
        Ok(deployment)
    }

    /// Re-run an earlier attempt as a fresh submission.
    ///
    /// Carries over only the prior record's builder, commit metadata,
    /// image, and captured resource definition. Status, timestamps,
    /// attempt count, error, and job correlation all start over.
    pub fn resubmit(&self, prior_id: &str) -> ReconcileResult<Deployment> {
        let prior = self
            .store
            .get(prior_id)?
            .ok_or_else(|| ReconcileError::DeploymentNotFound(prior_id.to_string()))?;

        let deployment = self.store.insert(NewDeployment {
            service_id: prior.service_id,
            source: DeploymentSource::Retry,
            builder: prior.builder,
            commit: prior.commit,
            image: prior.image,
            resource_definition: prior.resource_definition,
        })?;
        info!(
            service = %deployment.service_id,
            deployment = %deployment.id,
            prior = %prior_id,
            "deployment resubmitted"
        );
        Ok(deployment)
    }

    // ── Transitions ────────────────────────────────────────────────

    /// Begin work on a queued attempt.
    pub fn start(&self, id: &str) -> ReconcileResult<Option<Deployment>> {
        Ok(self.store.mark_started(id)?)
    }

    /// Complete a running attempt successfully.
    pub fn succeed(&self, id: &str) -> ReconcileResult<Option<Deployment>> {
        Ok(self.store.mark_succeeded(id)?)
    }

    /// Fail an active attempt with a reason.
    pub fn fail(&self, id: &str, reason: &str) -> ReconcileResult<Option<Deployment>> {
        Ok(self.store.mark_failed(id, reason)?)
    }

    /// Cancel a single active attempt.
    pub fn cancel(&self, id: &str) -> ReconcileResult<Option<Deployment>> {
        Ok(self.store.cancel(id)?)
    }

    // ── Cancellation policies ──────────────────────────────────────

    /// After `survivor_id` wins a submission race, cancel every other
    /// active attempt of the service. Returns the number cancelled.
    pub fn supersede(&self, service_id: &str, survivor_id: &str) -> ReconcileResult<u32> {
        let cancelled = self.store.cancel_except(service_id, survivor_id)?;
        if cancelled > 0 {
            info!(
                service = %service_id,
                survivor = %survivor_id,
                cancelled,
                "superseded attempts cancelled"
            );
        }
        Ok(cancelled)
    }

    /// Discard stale queued attempts by id without disturbing running
    /// work. Returns the number discarded.
    pub fn discard_queued(&self, ids: &[String]) -> ReconcileResult<u32> {
        let discarded = self.store.cancel_queued(ids)?;
        if discarded > 0 {
            info!(discarded, "queued attempts discarded");
        }
        Ok(discarded)
    }

    // ── Executor report-backs ──────────────────────────────────────

    /// Record the image and definition produced by a finished build.
    pub fn attach_build(
        &self,
        id: &str,
        image: &str,
        definition: &ResourceDefinition,
    ) -> ReconcileResult<Option<Deployment>> {
        Ok(self.store.attach_build_artifacts(id, image, definition)?)
    }

    /// Correlate the attempt with its execution job.
    pub fn assign_job(&self, id: &str, handle: &str) -> ReconcileResult<Option<Deployment>> {
        Ok(self.store.assign_job(id, handle)?)
    }

    /// Record the execution backend's latest status report.
    pub fn update_job_status(&self, id: &str, status: &str) -> ReconcileResult<Option<Deployment>> {
        Ok(self.store.set_job_status(id, status)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{BuilderKind, EnvVar};
    use gantry_state::DeploymentStatus;

    fn configured_service(id: &str) -> ServiceRecord {
        let config = ResourceDefinition {
            builder: BuilderKind::Docker,
            replicas: 2,
            ..ResourceDefinition::default()
        };
        ServiceRecord::new(id, "shop").with_config(config)
    }

    fn push_commit() -> CommitInfo {
        CommitInfo {
            sha: "a1b2c3d".to_string(),
            message: "bump checkout flow".to_string(),
            branch: "main".to_string(),
            author: "dev@example.com".to_string(),
        }
    }

    fn controller() -> DeploymentController {
        DeploymentController::new(DeploymentStore::open_in_memory().unwrap())
    }

    #[test]
    fn submit_requires_a_configured_service() {
        let ctl = controller();
        let unconfigured = ServiceRecord::new("svc-bare", "bare");

        let err = ctl
            .submit(&unconfigured, DeploymentSource::Manual, None)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ServiceNotConfigured(id) if id == "svc-bare"));
    }

    #[test]
    fn submit_captures_declared_builder() {
        let ctl = controller();
        let service = configured_service("svc-shop");

        let d = ctl
            .submit(&service, DeploymentSource::Push, Some(push_commit()))
            .unwrap();
        assert_eq!(d.status, DeploymentStatus::Queued);
        assert_eq!(d.builder, BuilderKind::Docker);
        assert_eq!(d.source, DeploymentSource::Push);
        assert_eq!(d.commit.unwrap().sha, "a1b2c3d");
        assert!(d.image.is_none());
        assert!(d.resource_definition.is_none());
    }

    #[test]
    fn resubmit_copies_artifacts_but_resets_lifecycle() {
        let ctl = controller();
        let service = configured_service("svc-shop");

        // Prior attempt: built, tracked, then failed.
        let prior = ctl
            .submit(&service, DeploymentSource::Push, Some(push_commit()))
            .unwrap();
        ctl.start(&prior.id).unwrap().unwrap();
        let definition = ResourceDefinition {
            replicas: 2,
            env: vec![EnvVar {
                name: "API_KEY".to_string(),
                value: "sk-live".to_string(),
            }],
            ..ResourceDefinition::default()
        };
        ctl.attach_build(&prior.id, "registry.local/shop:a1b2c3d", &definition)
            .unwrap()
            .unwrap();
        ctl.assign_job(&prior.id, "job-91").unwrap().unwrap();
        ctl.update_job_status(&prior.id, "CrashLoop").unwrap().unwrap();
        ctl.fail(&prior.id, "container exited with code 137")
            .unwrap()
            .unwrap();

        let retry = ctl.resubmit(&prior.id).unwrap();

        // Carried over.
        assert_eq!(retry.service_id, "svc-shop");
        assert_eq!(retry.builder, BuilderKind::Docker);
        assert_eq!(retry.commit.as_ref().unwrap().sha, "a1b2c3d");
        assert_eq!(retry.image.as_deref(), Some("registry.local/shop:a1b2c3d"));
        let carried = retry.resource_definition.as_ref().unwrap();
        assert_eq!(carried.replicas, 2);
        assert_eq!(carried.env[0].value, "");

        // Reset.
        assert_ne!(retry.id, prior.id);
        assert_eq!(retry.source, DeploymentSource::Retry);
        assert_eq!(retry.status, DeploymentStatus::Queued);
        assert_eq!(retry.attempts, 0);
        assert!(retry.started_at.is_none());
        assert!(retry.completed_at.is_none());
        assert!(retry.error.is_none());
        assert!(retry.job_handle.is_none());
        assert!(retry.job_status.is_none());
        assert!(retry.created_at > prior.created_at);
    }

    #[test]
    fn resubmit_unknown_deployment_errors() {
        let ctl = controller();
        let err = ctl.resubmit("no-such-id").unwrap_err();
        assert!(matches!(err, ReconcileError::DeploymentNotFound(_)));
    }

    #[test]
    fn supersede_leaves_only_the_winner_active() {
        let ctl = controller();
        let service = configured_service("svc-shop");

        let first = ctl.submit(&service, DeploymentSource::Push, None).unwrap();
        let second = ctl.submit(&service, DeploymentSource::Push, None).unwrap();
        ctl.start(&first.id).unwrap().unwrap();

        let cancelled = ctl.supersede("svc-shop", &second.id).unwrap();
        assert_eq!(cancelled, 1);

        let store = ctl.store();
        assert_eq!(
            store.get(&first.id).unwrap().unwrap().status,
            DeploymentStatus::Cancelled
        );
        assert_eq!(
            store.get(&second.id).unwrap().unwrap().status,
            DeploymentStatus::Queued
        );
    }

    #[test]
    fn discard_queued_skips_running_work() {
        let ctl = controller();
        let service = configured_service("svc-shop");

        let queued = ctl.submit(&service, DeploymentSource::Manual, None).unwrap();
        let running = ctl.submit(&service, DeploymentSource::Manual, None).unwrap();
        ctl.start(&running.id).unwrap().unwrap();

        let discarded = ctl
            .discard_queued(&[queued.id.clone(), running.id.clone()])
            .unwrap();
        assert_eq!(discarded, 1);
        assert_eq!(
            ctl.store().get(&running.id).unwrap().unwrap().status,
            DeploymentStatus::Running
        );
    }

    #[test]
    fn benign_precondition_misses_return_none() {
        let ctl = controller();
        let service = configured_service("svc-shop");
        let d = ctl.submit(&service, DeploymentSource::Manual, None).unwrap();
        ctl.cancel(&d.id).unwrap().unwrap();

        assert!(ctl.start(&d.id).unwrap().is_none());
        assert!(ctl.succeed(&d.id).unwrap().is_none());
        assert!(ctl.fail(&d.id, "late").unwrap().is_none());
        assert!(ctl.update_job_status(&d.id, "Gone").unwrap().is_none());
    }
}
