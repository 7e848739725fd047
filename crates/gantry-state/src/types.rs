//! Domain types for the Gantry deployment store.
//!
//! These types represent the persisted record of deployment attempts:
//! who asked for them, what they built, and where they ended up. All
//! types are serializable to/from JSON for storage in redb tables.

use gantry_core::{BuilderKind, ResourceDefinition};
use serde::{Deserialize, Serialize};

/// Unique identifier for a deployment attempt.
pub type DeploymentId = String;

/// Unique identifier for the owning service (minted elsewhere).
pub type ServiceId = String;

/// Paging cursor, the `created_at` of the last row of a page.
pub type Cursor = u64;

// ── Deployment ─────────────────────────────────────────────────────

/// One attempt to turn a service's desired state into a running
/// workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub id: DeploymentId,
    pub service_id: ServiceId,
    pub status: DeploymentStatus,
    /// What triggered this attempt.
    pub source: DeploymentSource,
    /// Commit metadata, when the attempt was triggered by source control.
    pub commit: Option<CommitInfo>,
    /// Build strategy used for this attempt.
    pub builder: BuilderKind,
    /// Image reference produced by the build, once known.
    pub image: Option<String>,
    /// Sanitized copy of the resource definition this attempt deployed.
    pub resource_definition: Option<ResourceDefinition>,
    /// Opaque handle of the execution job driving this attempt.
    pub job_handle: Option<String>,
    /// Raw status string last reported by the execution backend.
    pub job_status: Option<String>,
    /// Unix timestamp (milliseconds) ordering this service's history.
    /// Strictly increasing per service.
    pub created_at: u64,
    /// Unix timestamp (milliseconds) when the attempt was accepted.
    pub queued_at: u64,
    /// Unix timestamp (milliseconds) when work began.
    pub started_at: Option<u64>,
    /// Unix timestamp (milliseconds) when a terminal status was reached.
    pub completed_at: Option<u64>,
    /// Number of times work began on this attempt.
    pub attempts: u32,
    /// Failure reason, set only on failed attempts.
    pub error: Option<String>,
}

/// Lifecycle status of a deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Succeeded | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }
}

/// What triggered a deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentSource {
    /// Operator-initiated, e.g. from a dashboard or CLI.
    Manual,
    /// Source-control push event.
    Push,
    /// Re-run of an earlier attempt.
    Retry,
}

/// Commit metadata recorded on push-triggered attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub branch: String,
    pub author: String,
}

// ── Requests and pages ────────────────────────────────────────────

/// Insert request for a fresh deployment attempt. The store mints the
/// id, timestamps, and initial status.
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub service_id: ServiceId,
    pub source: DeploymentSource,
    pub builder: BuilderKind,
    pub commit: Option<CommitInfo>,
    pub image: Option<String>,
    pub resource_definition: Option<ResourceDefinition>,
}

/// One page of a service's deployment history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentPage {
    pub items: Vec<Deployment>,
    /// `created_at` of the oldest row in `items`; pass it back to fetch
    /// the next page. `None` once the history is exhausted.
    pub next_cursor: Option<Cursor>,
}

impl Deployment {
    /// Build the composite key for the deployments table.
    pub fn row_key(&self) -> String {
        format!("{}:{:020}:{}", self.service_id, self.created_at, self.id)
    }

    /// Whether this attempt has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
