//! Control session
//!
//! The only place snapshots are written. Every mutation runs the same
//! sequence:
//!
//! 1. require a connected machine
//! 2. return [`Dispatch::AlreadyInFlight`] if the key is already pending
//! 3. resolve the action from the latest snapshot and take the in-flight slot
//! 4. dispatch
//! 5. on success, re-fetch from the machine; the fresh snapshot replaces the
//!    old one, and if the re-fetch fails the old one is dropped
//! 6. on failure, classify and return; the snapshot is left as it was
//! 7. release the slot (the guard is dropped on every path)
//!
//! Every fetch takes a sequence number before it is sent. A response that
//! lands after one issued later is not applied.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tsm_common::{
    GitActionResponse, GitBranchesResponse, NpmRunResponse, NpmRunStatus, Pm2AppsResponse, ServicesResponse,
};

use crate::classify::{self, interpret};
use crate::client::RemoteActionClient;
use crate::error::RemoteError;
use crate::inflight::{ActionKey, InFlightActionTracker, InFlightGuard, PendingAction};
use crate::resolver::{ActionPlan, ActionResolver, GitSync, NpmAction};
use crate::snapshot::{ResourceId, ResourceKind, ResourceSnapshot};
use crate::state::Axis;
use crate::transport::{RawResponse, RemoteRequest};

/// Result of a mutating call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dispatch", rename_all = "snake_case")]
pub enum Dispatch<T> {
    /// The action ran and the machine was re-queried
    Completed { plan: ActionPlan, outcome: T },
    /// An identical action was still outstanding; nothing was sent
    AlreadyInFlight { key: ActionKey },
}

impl<T> Dispatch<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Dispatch::Completed { .. })
    }

    pub fn outcome(self) -> Option<T> {
        match self {
            Dispatch::Completed { outcome, .. } => Some(outcome),
            Dispatch::AlreadyInFlight { .. } => None,
        }
    }
}

/// Last report of an npm run, as returned by the machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NpmReport {
    pub service: String,
    pub action: NpmAction,
    pub status: NpmRunStatus,
    pub warnings: String,
    pub failure_reason: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl NpmReport {
    pub fn succeeded(&self) -> bool {
        self.status == NpmRunStatus::Success
    }
}

/// Outcome of a git mutation: the machine's own report plus the fresh branch set
#[derive(Debug, Clone, Serialize)]
pub struct GitOutcome {
    pub response: GitActionResponse,
    pub snapshot: Arc<ResourceSnapshot>,
}

/// Unit of replacement for one fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Collection {
    /// Every snapshot of a list-style kind (services, PM2 apps)
    Kind(ResourceKind),
    /// A single resource fetched on its own (a git checkout)
    Single(ResourceId),
}

#[derive(Default)]
struct SnapshotStore {
    by_id: HashMap<ResourceId, Arc<ResourceSnapshot>>,
    /// Sequence of the fetch that last wrote each collection
    written: HashMap<Collection, u64>,
}

impl SnapshotStore {
    /// False if a fetch issued after `issued` already wrote this collection
    fn accepts(&mut self, collection: Collection, issued: u64) -> bool {
        let last = self.written.entry(collection).or_insert(0);
        if *last > issued {
            return false;
        }
        *last = issued;
        true
    }
}

pub struct ControlSession {
    client: RemoteActionClient,
    resolver: ActionResolver,
    tracker: Arc<InFlightActionTracker>,
    snapshots: RwLock<SnapshotStore>,
    fetch_seq: AtomicU64,
    npm_reports: RwLock<HashMap<ActionKey, Arc<NpmReport>>>,
}

impl ControlSession {
    pub fn new(client: RemoteActionClient, resolver: ActionResolver) -> Self {
        Self {
            client,
            resolver,
            tracker: Arc::new(InFlightActionTracker::new()),
            snapshots: RwLock::new(SnapshotStore::default()),
            fetch_seq: AtomicU64::new(0),
            npm_reports: RwLock::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &RemoteActionClient {
        &self.client
    }

    pub fn resolver(&self) -> &ActionResolver {
        &self.resolver
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    // ========================================================================
    // Read side
    // ========================================================================

    pub fn is_pending(&self, id: &ResourceId, axis: Axis) -> bool {
        self.tracker.is_pending(&ActionKey::new(id.clone(), axis))
    }

    pub fn pending(&self) -> Vec<PendingAction> {
        self.tracker.pending()
    }

    pub fn snapshot(&self, id: &ResourceId) -> Option<Arc<ResourceSnapshot>> {
        self.snapshots.read().by_id.get(id).cloned()
    }

    /// All loaded snapshots of one kind, ordered by id
    pub fn snapshots_of(&self, kind: ResourceKind) -> Vec<Arc<ResourceSnapshot>> {
        let mut list: Vec<_> = self
            .snapshots
            .read()
            .by_id
            .values()
            .filter(|s| s.id().kind == kind)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id().cmp(b.id()));
        list
    }

    pub fn npm_report(&self, service: &str, action: NpmAction) -> Option<Arc<NpmReport>> {
        let key = ActionKey::new(ResourceId::npm(service), action.axis());
        self.npm_reports.read().get(&key).cloned()
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    /// Re-read every service; the result replaces all service snapshots
    pub async fn refresh_services(&self) -> Result<Vec<Arc<ResourceSnapshot>>, RemoteError> {
        self.require_connected()?;

        let issued = self.next_fetch();
        let outcome = self.client.send(&RemoteRequest::get(["services"])).await;
        let body: ServicesResponse = interpret(outcome, "fetch services", "servicesStatusArray")?;

        let at = Utc::now();
        let fresh: Vec<_> = body
            .services_status_array
            .iter()
            .map(|row| Arc::new(ResourceSnapshot::from_service_row(row, at)))
            .collect();

        if !self.replace_kind(ResourceKind::Service, &fresh, issued) {
            debug!("Dropping service list #{}: a newer one is already loaded", issued);
            return Ok(self.snapshots_of(ResourceKind::Service));
        }
        debug!("Loaded {} services", fresh.len());
        Ok(fresh)
    }

    /// Re-read one repository's branch set
    pub async fn refresh_git(&self, service: &str) -> Result<Arc<ResourceSnapshot>, RemoteError> {
        self.require_connected()?;

        let issued = self.next_fetch();
        let outcome = self.client.send(&RemoteRequest::get(["services", "git", service])).await;
        let body: GitBranchesResponse = interpret(outcome, "fetch git branches", "gitBranchesLocalArray")?;

        let snapshot = Arc::new(ResourceSnapshot::from_git_branches(service, &body, Utc::now()));
        let id = snapshot.id().clone();

        let mut store = self.snapshots.write();
        if !store.accepts(Collection::Single(id.clone()), issued) {
            debug!("Dropping branch set #{} for {}: a newer one is already loaded", issued, service);
            return Ok(store.by_id.get(&id).cloned().unwrap_or(snapshot));
        }
        store.by_id.insert(id, snapshot.clone());
        Ok(snapshot)
    }

    /// Re-read every PM2 app; the result replaces all app snapshots
    pub async fn refresh_apps(&self) -> Result<Vec<Arc<ResourceSnapshot>>, RemoteError> {
        self.require_connected()?;

        let issued = self.next_fetch();
        let outcome = self.client.send(&RemoteRequest::get(["pm2", "apps"])).await;
        let body: Pm2AppsResponse = interpret(outcome, "fetch PM2 apps", "managedAppsArray")?;

        let at = Utc::now();
        let fresh: Vec<_> = body
            .managed_apps_array
            .iter()
            .map(|app| Arc::new(ResourceSnapshot::from_pm2_app(app, at)))
            .collect();

        if !self.replace_kind(ResourceKind::Pm2App, &fresh, issued) {
            debug!("Dropping PM2 app list #{}: a newer one is already loaded", issued);
            return Ok(self.snapshots_of(ResourceKind::Pm2App));
        }
        debug!("Loaded {} PM2 apps", fresh.len());
        Ok(fresh)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Toggle one axis of a service or PM2 app
    ///
    /// The outcome is the re-fetched snapshot, or `None` if the resource is
    /// no longer listed by the machine.
    pub async fn toggle(
        &self,
        id: &ResourceId,
        axis: Axis,
    ) -> Result<Dispatch<Option<Arc<ResourceSnapshot>>>, RemoteError> {
        self.require_connected()?;
        if let Some(pending) = self.already_in_flight(ActionKey::new(id.clone(), axis)) {
            return Ok(pending);
        }

        let snapshot = self.latest(id)?;
        let plan = self.resolver.resolve_toggle(&snapshot, axis)?;

        let (guard, _) = match self.dispatch(&plan).await? {
            Some(dispatched) => dispatched,
            None => return Ok(Dispatch::AlreadyInFlight { key: plan.key() }),
        };

        let refreshed = match id.kind {
            ResourceKind::Pm2App => self.refresh_apps().await,
            _ => self.refresh_services().await,
        };
        if let Err(e) = refreshed {
            self.discard_if_unchanged(&snapshot);
            return Err(reconcile_failed(&plan, e));
        }
        drop(guard);

        Ok(Dispatch::Completed {
            plan,
            outcome: self.snapshot(id),
        })
    }

    /// Check out `branch` in a repository whose branch set is loaded
    pub async fn checkout(&self, service: &str, branch: &str) -> Result<Dispatch<GitOutcome>, RemoteError> {
        self.require_connected()?;
        let id = ResourceId::git(service);
        if let Some(pending) = self.already_in_flight(ActionKey::new(id.clone(), Axis::Branch)) {
            return Ok(pending);
        }
        let snapshot = self.latest(&id)?;
        let plan = self.resolver.resolve_checkout(&snapshot, branch)?;
        self.run_git(plan, Some(snapshot)).await
    }

    /// Delete a local branch other than the checked-out one
    pub async fn delete_branch(&self, service: &str, branch: &str) -> Result<Dispatch<GitOutcome>, RemoteError> {
        self.require_connected()?;
        let id = ResourceId::git(service);
        if let Some(pending) = self.already_in_flight(ActionKey::new(id.clone(), Axis::Branch)) {
            return Ok(pending);
        }
        let snapshot = self.latest(&id)?;
        let plan = self.resolver.resolve_delete_branch(&snapshot, branch)?;
        self.run_git(plan, Some(snapshot)).await
    }

    pub async fn git_sync(&self, service: &str, sync: GitSync) -> Result<Dispatch<GitOutcome>, RemoteError> {
        self.require_connected()?;
        let plan = self.resolver.resolve_git_sync(service, sync);
        let loaded = self.snapshot(&plan.resource);
        self.run_git(plan, loaded).await
    }

    /// Run `npm install` or `npm build`
    ///
    /// A `fail` status is a report, not an error.
    pub async fn run_npm(&self, service: &str, action: NpmAction) -> Result<Dispatch<Arc<NpmReport>>, RemoteError> {
        self.require_connected()?;
        let plan = self.resolver.resolve_npm(service, action);

        let (guard, response) = match self.dispatch(&plan).await? {
            Some(dispatched) => dispatched,
            None => return Ok(Dispatch::AlreadyInFlight { key: plan.key() }),
        };

        let body: NpmRunResponse = classify::expect_shape(&response, "status")?;
        let report = Arc::new(NpmReport {
            service: service.to_string(),
            action,
            status: body.status,
            warnings: body.warnings,
            failure_reason: body.failure_reason,
            finished_at: Utc::now(),
        });

        if !report.succeeded() {
            warn!(
                "npm {} for {} reported failure: {}",
                action.axis(),
                service,
                report.failure_reason.as_deref().unwrap_or("no reason given")
            );
        }

        self.npm_reports.write().insert(plan.key(), report.clone());
        drop(guard);

        Ok(Dispatch::Completed { plan, outcome: report })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require_connected(&self) -> Result<(), RemoteError> {
        if self.client.is_connected() {
            Ok(())
        } else {
            Err(RemoteError::no_machine())
        }
    }

    fn already_in_flight<T>(&self, key: ActionKey) -> Option<Dispatch<T>> {
        if !self.tracker.is_pending(&key) {
            return None;
        }
        debug!("Ignoring action on {}: already in flight", key);
        Some(Dispatch::AlreadyInFlight { key })
    }

    fn latest(&self, id: &ResourceId) -> Result<Arc<ResourceSnapshot>, RemoteError> {
        self.snapshot(id)
            .ok_or_else(|| RemoteError::validation(format!("{} is not loaded; refresh it first", id)))
    }

    fn next_fetch(&self) -> u64 {
        self.fetch_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drop `acted_on` unless something newer has replaced it already
    fn discard_if_unchanged(&self, acted_on: &Arc<ResourceSnapshot>) {
        let mut store = self.snapshots.write();
        if store.by_id.get(acted_on.id()).is_some_and(|s| Arc::ptr_eq(s, acted_on)) {
            store.by_id.remove(acted_on.id());
        }
    }

    /// Swap in a whole collection; false if a later fetch already did
    fn replace_kind(&self, kind: ResourceKind, fresh: &[Arc<ResourceSnapshot>], issued: u64) -> bool {
        let mut store = self.snapshots.write();
        if !store.accepts(Collection::Kind(kind), issued) {
            return false;
        }
        store.by_id.retain(|id, _| id.kind != kind);
        for snapshot in fresh {
            store.by_id.insert(snapshot.id().clone(), snapshot.clone());
        }
        true
    }

    /// Steps 3, 4 and 6; `None` if the slot was taken
    ///
    /// The returned guard must be held until reconciliation is done.
    async fn dispatch(&self, plan: &ActionPlan) -> Result<Option<(InFlightGuard, RawResponse)>, RemoteError> {
        let guard = match self.tracker.try_acquire(plan.key(), plan.action) {
            Some(guard) => guard,
            None => {
                debug!("Ignoring {} on {}: already in flight", plan.action, plan.key());
                return Ok(None);
            }
        };

        info!("{} {} ({})", plan.action, plan.target, plan.resource);

        let operation = format!("{} {}", plan.action, plan.target);
        let outcome = self.client.send(&plan.request()).await;
        let response = classify::check(outcome, &operation)?;

        Ok(Some((guard, response)))
    }

    async fn run_git(
        &self,
        plan: ActionPlan,
        acted_on: Option<Arc<ResourceSnapshot>>,
    ) -> Result<Dispatch<GitOutcome>, RemoteError> {
        let (guard, response) = match self.dispatch(&plan).await? {
            Some(dispatched) => dispatched,
            None => return Ok(Dispatch::AlreadyInFlight { key: plan.key() }),
        };

        let report: GitActionResponse = response
            .json
            .clone()
            .and_then(|body| serde_json::from_value(body).ok())
            .unwrap_or_default();
        if !report.stderr.is_empty() {
            debug!("git {} stderr: {}", plan.action, report.stderr.trim_end());
        }

        let snapshot = match self.refresh_git(&plan.resource.name).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if let Some(stale) = &acted_on {
                    self.discard_if_unchanged(stale);
                }
                return Err(reconcile_failed(&plan, e));
            }
        };
        drop(guard);

        Ok(Dispatch::Completed {
            plan,
            outcome: GitOutcome {
                response: report,
                snapshot,
            },
        })
    }
}

fn reconcile_failed(plan: &ActionPlan, error: RemoteError) -> RemoteError {
    warn!(
        "{} on {} succeeded but re-fetch failed: {}",
        plan.action, plan.resource, error
    );
    error
}
