//! DeploymentStore — redb-backed persistence for deployment attempts.
//!
//! Provides typed operations over the deployment log: inserts, guarded
//! status transitions, bulk cancellation sweeps, and cursor-paged
//! history queries. All values are JSON-serialized into redb's `&[u8]`
//! value column. The store supports both on-disk and in-memory backends
//! (the latter for testing).
//!
//! Every transition runs inside a single write transaction that
//! re-reads the record and checks its status, so a transition observed
//! against a stale status is dropped instead of overwriting newer
//! state. redb serializes write transactions, which makes these
//! check-then-write updates atomic without external locking.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;
use uuid::Uuid;

use gantry_core::ResourceDefinition;

use crate::error::{StoreError, StoreResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Statuses that still accept transitions.
const ACTIVE: [DeploymentStatus; 2] = [DeploymentStatus::Queued, DeploymentStatus::Running];

/// Thread-safe deployment store backed by redb.
#[derive(Clone)]
pub struct DeploymentStore {
    db: Arc<Database>,
}

impl DeploymentStore {
    /// Open (or create) a persistent deployment store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "deployment store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory deployment store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory deployment store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENT_INDEX).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Insert ─────────────────────────────────────────────────────

    /// Persist a fresh deployment attempt in `Queued` status.
    ///
    /// The store assigns the id and timestamps. `created_at` is bumped
    /// past the service's newest existing row when the clock has not
    /// advanced, so it is strictly increasing within a service and can
    /// serve as an unambiguous paging cursor. Any resource definition
    /// on the request is stored in sanitized form.
    pub fn insert(&self, new: NewDeployment) -> StoreResult<Deployment> {
        let now = epoch_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let deployment;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;

            let (lo, hi) = service_bounds(&new.service_id);
            let last_created = table
                .range(lo.as_str()..hi.as_str())
                .map_err(map_err!(Read))?
                .next_back()
                .transpose()
                .map_err(map_err!(Read))?
                .and_then(|(key, _)| parse_created_at(key.value(), &new.service_id));
            let created_at = match last_created {
                Some(last) => now.max(last + 1),
                None => now,
            };

            deployment = Deployment {
                id: Uuid::new_v4().to_string(),
                service_id: new.service_id,
                status: DeploymentStatus::Queued,
                source: new.source,
                commit: new.commit,
                builder: new.builder,
                image: new.image,
                resource_definition: new.resource_definition.map(|d| d.sanitized()),
                job_handle: None,
                job_status: None,
                created_at,
                queued_at: now,
                started_at: None,
                completed_at: None,
                attempts: 0,
                error: None,
            };

            let key = deployment.row_key();
            let value = serde_json::to_vec(&deployment).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let mut index = txn.open_table(DEPLOYMENT_INDEX).map_err(map_err!(Table))?;
            index
                .insert(deployment.id.as_str(), key.as_str())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = %deployment.id, service = %deployment.service_id, "deployment queued");
        Ok(deployment)
    }

    // ── Status transitions ─────────────────────────────────────────

    /// Move a queued deployment into `Running`, stamping `started_at`
    /// and counting the attempt. Returns `None` when the record is no
    /// longer queued (already started, finished, or unknown).
    pub fn mark_started(&self, id: &str) -> StoreResult<Option<Deployment>> {
        let now = epoch_millis();
        let updated = self.transition(id, &[DeploymentStatus::Queued], |d| {
            d.status = DeploymentStatus::Running;
            d.started_at = Some(now);
            d.attempts += 1;
        })?;
        if let Some(d) = &updated {
            debug!(id = %d.id, attempt = d.attempts, "deployment started");
        }
        Ok(updated)
    }

    /// Complete a running deployment successfully.
    pub fn mark_succeeded(&self, id: &str) -> StoreResult<Option<Deployment>> {
        let now = epoch_millis();
        let updated = self.transition(id, &[DeploymentStatus::Running], |d| {
            d.status = DeploymentStatus::Succeeded;
            d.completed_at = Some(now);
        })?;
        if let Some(d) = &updated {
            debug!(id = %d.id, "deployment succeeded");
        }
        Ok(updated)
    }

    /// Fail an active deployment, recording the reason. Queued records
    /// may fail directly (e.g. the build never became startable).
    pub fn mark_failed(&self, id: &str, reason: &str) -> StoreResult<Option<Deployment>> {
        let now = epoch_millis();
        let updated = self.transition(id, &ACTIVE, |d| {
            d.status = DeploymentStatus::Failed;
            d.completed_at = Some(now);
            d.error = Some(reason.to_string());
        })?;
        if let Some(d) = &updated {
            debug!(id = %d.id, %reason, "deployment failed");
        }
        Ok(updated)
    }

    /// Cancel an active deployment. Terminal records are left untouched.
    pub fn cancel(&self, id: &str) -> StoreResult<Option<Deployment>> {
        let now = epoch_millis();
        let updated = self.transition(id, &ACTIVE, |d| {
            d.status = DeploymentStatus::Cancelled;
            d.completed_at = Some(now);
        })?;
        if let Some(d) = &updated {
            debug!(id = %d.id, "deployment cancelled");
        }
        Ok(updated)
    }

    // ── Cancellation sweeps ────────────────────────────────────────

    /// Cancel every active deployment of a service except the survivor.
    /// Returns the number of records cancelled.
    pub fn cancel_except(&self, service_id: &str, survivor_id: &str) -> StoreResult<u32> {
        let now = epoch_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let cancelled;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let (lo, hi) = service_bounds(service_id);

            // Rows are collected first: redb access guards borrow the
            // table, so the rewrite happens after the scan, inside the
            // same transaction.
            let mut doomed: Vec<(String, Deployment)> = Vec::new();
            for entry in table.range(lo.as_str()..hi.as_str()).map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let d: Deployment =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if !d.is_terminal() && d.id != survivor_id {
                    doomed.push((key.value().to_string(), d));
                }
            }

            cancelled = doomed.len() as u32;
            for (key, mut d) in doomed {
                d.status = DeploymentStatus::Cancelled;
                d.completed_at = Some(now);
                let value = serde_json::to_vec(&d).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if cancelled > 0 {
            debug!(service = %service_id, survivor = %survivor_id, cancelled, "older deployments cancelled");
        }
        Ok(cancelled)
    }

    /// Cancel the listed deployments, but only those still `Queued`.
    /// Running and terminal records are skipped. Returns the number
    /// cancelled.
    pub fn cancel_queued(&self, ids: &[String]) -> StoreResult<u32> {
        let now = epoch_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let cancelled;
        {
            let index = txn.open_table(DEPLOYMENT_INDEX).map_err(map_err!(Table))?;
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let mut count = 0u32;
            for id in ids {
                let Some(key) = index
                    .get(id.as_str())
                    .map_err(map_err!(Read))?
                    .map(|g| g.value().to_string())
                else {
                    continue;
                };
                let current: Option<Deployment> = match table
                    .get(key.as_str())
                    .map_err(map_err!(Read))?
                {
                    Some(guard) => {
                        Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                    }
                    None => None,
                };
                if let Some(mut d) = current {
                    if d.status == DeploymentStatus::Queued {
                        d.status = DeploymentStatus::Cancelled;
                        d.completed_at = Some(now);
                        let value = serde_json::to_vec(&d).map_err(map_err!(Serialize))?;
                        table
                            .insert(key.as_str(), value.as_slice())
                            .map_err(map_err!(Write))?;
                        count += 1;
                    }
                }
            }
            cancelled = count;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(cancelled)
    }

    // ── Build artifacts and job bookkeeping ────────────────────────

    /// Record the image and resource definition produced by a build.
    /// The definition is stored in sanitized form. Rejected (returns
    /// `None`) once the deployment is terminal.
    pub fn attach_build_artifacts(
        &self,
        id: &str,
        image: &str,
        definition: &ResourceDefinition,
    ) -> StoreResult<Option<Deployment>> {
        let sanitized = definition.sanitized();
        self.transition(id, &ACTIVE, |d| {
            d.image = Some(image.to_string());
            d.resource_definition = Some(sanitized);
        })
    }

    /// Record the handle of the execution job driving this deployment.
    pub fn assign_job(&self, id: &str, handle: &str) -> StoreResult<Option<Deployment>> {
        self.transition(id, &ACTIVE, |d| {
            d.job_handle = Some(handle.to_string());
        })
    }

    /// Record the latest raw status reported by the execution backend.
    /// Reports that arrive after the deployment is terminal are ignored.
    pub fn set_job_status(&self, id: &str, status: &str) -> StoreResult<Option<Deployment>> {
        self.transition(id, &ACTIVE, |d| {
            d.job_status = Some(status.to_string());
        })
    }

    /// Apply `update` to the record iff its current status is one of
    /// `expected`, all inside one write transaction. Returns the updated
    /// record, or `None` when the guard does not hold.
    fn transition<F>(
        &self,
        id: &str,
        expected: &[DeploymentStatus],
        update: F,
    ) -> StoreResult<Option<Deployment>>
    where
        F: FnOnce(&mut Deployment),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let index = txn.open_table(DEPLOYMENT_INDEX).map_err(map_err!(Table))?;
            let key = index
                .get(id)
                .map_err(map_err!(Read))?
                .map(|g| g.value().to_string());

            updated = match key {
                Some(key) => {
                    let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
                    let current: Option<Deployment> = match table
                        .get(key.as_str())
                        .map_err(map_err!(Read))?
                    {
                        Some(guard) => Some(
                            serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                        ),
                        None => None,
                    };
                    match current {
                        Some(mut d) if expected.contains(&d.status) => {
                            update(&mut d);
                            let value = serde_json::to_vec(&d).map_err(map_err!(Serialize))?;
                            table
                                .insert(key.as_str(), value.as_slice())
                                .map_err(map_err!(Write))?;
                            Some(d)
                        }
                        _ => None,
                    }
                }
                None => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Get a deployment by id.
    pub fn get(&self, id: &str) -> StoreResult<Option<Deployment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(DEPLOYMENT_INDEX).map_err(map_err!(Table))?;
        let Some(key) = index
            .get(id)
            .map_err(map_err!(Read))?
            .map(|g| g.value().to_string())
        else {
            return Ok(None);
        };
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let d: Deployment =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(d))
            }
            None => Ok(None),
        }
    }

    /// Get a service's most recently created deployment, regardless of
    /// status.
    pub fn latest_for_service(&self, service_id: &str) -> StoreResult<Option<Deployment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let (lo, hi) = service_bounds(service_id);
        match table
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?
            .next_back()
        {
            Some(entry) => {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let d: Deployment =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(d))
            }
            None => Ok(None),
        }
    }

    /// List deployments across all services whose status is in
    /// `statuses`. Full scan; intended for operator queries over the
    /// small active set.
    pub fn list_by_status(&self, statuses: &[DeploymentStatus]) -> StoreResult<Vec<Deployment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let d: Deployment =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if statuses.contains(&d.status) {
                results.push(d);
            }
        }
        Ok(results)
    }

    /// Page through a service's deployment history, newest first.
    ///
    /// `cursor` is the `next_cursor` from the previous page; rows with
    /// `created_at >= cursor` are excluded, so pages never repeat or
    /// skip rows even when newer deployments land between calls. An
    /// optional status filter is applied before pagination counts.
    pub fn list_for_service(
        &self,
        service_id: &str,
        page_size: usize,
        cursor: Option<Cursor>,
        statuses: Option<&[DeploymentStatus]>,
    ) -> StoreResult<DeploymentPage> {
        if page_size == 0 {
            return Ok(DeploymentPage {
                items: Vec::new(),
                next_cursor: None,
            });
        }
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let (lo, default_hi) = service_bounds(service_id);
        let hi = match cursor {
            Some(cursor) => format!("{service_id}:{cursor:020}"),
            None => default_hi,
        };
        let mut items: Vec<Deployment> = Vec::new();
        let mut next_cursor = None;
        for entry in table
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?
            .rev()
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let d: Deployment =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if let Some(statuses) = statuses {
                if !statuses.contains(&d.status) {
                    continue;
                }
            }
            if items.len() < page_size {
                items.push(d);
            } else {
                // One more matching row exists, so this page is not the
                // last one.
                next_cursor = items.last().map(|d| d.created_at);
                break;
            }
        }
        Ok(DeploymentPage { items, next_cursor })
    }
}

/// Half-open key range covering exactly one service's rows. `;` is the
/// ASCII successor of `:`, so the upper bound excludes every other
/// service.
fn service_bounds(service_id: &str) -> (String, String) {
    (format!("{service_id}:"), format!("{service_id};"))
}

/// Extract the `created_at` component from a deployment row key.
fn parse_created_at(key: &str, service_id: &str) -> Option<u64> {
    let digits = key.get(service_id.len() + 1..service_id.len() + 21)?;
    digits.parse().ok()
}

/// Current Unix time in milliseconds.
fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
