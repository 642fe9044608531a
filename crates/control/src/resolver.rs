//! Action resolution
//!
//! Pure mapping from a snapshot and a requested axis to the concrete remote
//! action. No I/O happens here.
//!
//! | axis                 | on state  | off state  |
//! |----------------------|-----------|------------|
//! | run, timer-run       | `stop`    | `start`    |
//! | boot, timer-boot     | `disable` | `enable`   |
//!
//! The self-managed service always resolves to `restart`: stopping it
//! would cut the channel the panel talks through.

use serde::Serialize;
use tracing::debug;

use crate::error::RemoteError;
use crate::inflight::ActionKey;
use crate::snapshot::{ResourceId, ResourceKind, ResourceSnapshot};
use crate::state::{Axis, AxisReading, AxisState};
use crate::transport::RemoteRequest;

/// Unit that runs the machine API itself
pub const DEFAULT_SELF_MANAGED_SERVICE: &str = "tsm-api.service";

const SERVICE_SUFFIX: &str = ".service";
const TIMER_SUFFIX: &str = ".timer";

/// Action identifier sent to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionToken {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
    ToggleAppStatus,
    Checkout,
    Fetch,
    Pull,
    DeleteBranch,
    Install,
    Build,
}

impl ActionToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionToken::Start => "start",
            ActionToken::Stop => "stop",
            ActionToken::Restart => "restart",
            ActionToken::Enable => "enable",
            ActionToken::Disable => "disable",
            ActionToken::ToggleAppStatus => "toggle-app-status",
            ActionToken::Checkout => "checkout",
            ActionToken::Fetch => "fetch",
            ActionToken::Pull => "pull",
            ActionToken::DeleteBranch => "delete-branch",
            ActionToken::Install => "install",
            ActionToken::Build => "build",
        }
    }
}

impl std::fmt::Display for ActionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Git operations that need no target branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitSync {
    Fetch,
    Pull,
}

impl GitSync {
    fn token(&self) -> ActionToken {
        match self {
            GitSync::Fetch => ActionToken::Fetch,
            GitSync::Pull => ActionToken::Pull,
        }
    }
}

/// npm lifecycle runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NpmAction {
    Install,
    Build,
}

impl NpmAction {
    pub fn axis(&self) -> Axis {
        match self {
            NpmAction::Install => Axis::Install,
            NpmAction::Build => Axis::Build,
        }
    }

    fn token(&self) -> ActionToken {
        match self {
            NpmAction::Install => ActionToken::Install,
            NpmAction::Build => ActionToken::Build,
        }
    }
}

/// A resolved action, ready to dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPlan {
    pub resource: ResourceId,
    pub axis: Axis,
    pub action: ActionToken,
    /// Remote identifier the action applies to (unit file, branch, app)
    pub target: String,
    /// Reading the plan was derived from
    pub precondition: Option<AxisReading>,
}

impl ActionPlan {
    pub fn key(&self) -> ActionKey {
        ActionKey::new(self.resource.clone(), self.axis)
    }

    /// Remote request carrying out this plan
    pub fn request(&self) -> RemoteRequest {
        let service = self.resource.name.as_str();
        let action = self.action.as_str();

        match (self.resource.kind, self.action) {
            (ResourceKind::Pm2App, _) => RemoteRequest::post(["pm2", action, self.target.as_str()]),
            (ResourceKind::GitCheckout, ActionToken::Checkout) => {
                RemoteRequest::post(["services", "git", "checkout", service, self.target.as_str()])
            }
            (ResourceKind::GitCheckout, ActionToken::DeleteBranch) => {
                RemoteRequest::delete(["services", "git", "delete-branch", service, self.target.as_str()])
            }
            (ResourceKind::GitCheckout, _) => RemoteRequest::post(["services", "git", service, action]),
            (ResourceKind::NpmRunner, _) => RemoteRequest::post(["services", "npm", service, action]),
            (ResourceKind::Service, _) => RemoteRequest::post(["services", self.target.as_str(), action]),
        }
    }
}

/// Toggle table for binary axes; `None` for axes without an on/off view
pub fn toggle_action(axis: Axis, state: &AxisState) -> Option<ActionToken> {
    let on = state.is_on()?;
    match axis {
        Axis::Run | Axis::TimerRun => Some(if on { ActionToken::Stop } else { ActionToken::Start }),
        Axis::Boot | Axis::TimerBoot => Some(if on { ActionToken::Disable } else { ActionToken::Enable }),
        _ => None,
    }
}

/// `foo.service` -> `foo.timer`
pub fn timer_filename(service_filename: &str) -> Result<String, RemoteError> {
    service_filename
        .strip_suffix(SERVICE_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .map(|stem| format!("{}{}", stem, TIMER_SUFFIX))
        .ok_or_else(|| {
            RemoteError::validation(format!(
                "Cannot derive a timer unit from '{}': expected a {} filename",
                service_filename, SERVICE_SUFFIX
            ))
        })
}

#[derive(Debug, Clone)]
pub struct ActionResolver {
    self_managed_service: String,
}

impl Default for ActionResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SELF_MANAGED_SERVICE)
    }
}

impl ActionResolver {
    pub fn new(self_managed_service: impl Into<String>) -> Self {
        Self {
            self_managed_service: self_managed_service.into(),
        }
    }

    pub fn self_managed_service(&self) -> &str {
        &self.self_managed_service
    }

    pub fn is_self_managed(&self, snapshot: &ResourceSnapshot) -> bool {
        snapshot.id().kind == ResourceKind::Service && snapshot.filename() == self.self_managed_service
    }

    /// Resolve a toggle click on `axis`
    pub fn resolve_toggle(&self, snapshot: &ResourceSnapshot, axis: Axis) -> Result<ActionPlan, RemoteError> {
        let id = snapshot.id();
        let reading = self.reading_for(snapshot, axis)?;

        if reading.is_malformed() {
            return Err(RemoteError::validation(format!(
                "{} has no {} state to toggle",
                id, axis
            )));
        }

        let (action, target) = match id.kind {
            ResourceKind::Service => {
                let target = if axis.is_timer() {
                    timer_filename(snapshot.filename())?
                } else {
                    snapshot.filename().to_string()
                };
                let action = if self.is_self_managed(snapshot) {
                    ActionToken::Restart
                } else {
                    toggle_action(axis, &reading.state).ok_or_else(|| not_togglable(id, axis))?
                };
                (action, target)
            }
            ResourceKind::Pm2App => (ActionToken::ToggleAppStatus, snapshot.filename().to_string()),
            ResourceKind::GitCheckout | ResourceKind::NpmRunner => return Err(not_togglable(id, axis)),
        };

        if reading.defaulted {
            debug!(
                "Resolving {} on {} from fallback state '{}' (raw '{}')",
                axis, id, reading.state, reading.raw
            );
        }

        Ok(ActionPlan {
            resource: id.clone(),
            axis,
            action,
            target,
            precondition: Some(reading.clone()),
        })
    }

    /// Switch a checkout to `branch`, local or remote
    pub fn resolve_checkout(&self, snapshot: &ResourceSnapshot, branch: &str) -> Result<ActionPlan, RemoteError> {
        let reading = self.branch_reading(snapshot)?;
        let branch = branch.trim();

        if branch.is_empty() {
            return Err(RemoteError::validation("Branch name is empty"));
        }
        if snapshot.current_branch() == Some(branch) {
            return Err(RemoteError::validation(format!(
                "{} is already on branch '{}'",
                snapshot.id(),
                branch
            )));
        }
        let known = snapshot
            .local_branches()
            .iter()
            .chain(snapshot.remote_branches())
            .any(|b| b == branch);
        if !known {
            return Err(RemoteError::validation(format!(
                "Branch '{}' is not known on {}",
                branch,
                snapshot.id()
            )));
        }

        Ok(ActionPlan {
            resource: snapshot.id().clone(),
            axis: Axis::Branch,
            action: ActionToken::Checkout,
            target: branch.to_string(),
            precondition: Some(reading.clone()),
        })
    }

    /// Delete a local branch other than the checked-out one
    pub fn resolve_delete_branch(&self, snapshot: &ResourceSnapshot, branch: &str) -> Result<ActionPlan, RemoteError> {
        let reading = self.branch_reading(snapshot)?;
        let branch = branch.trim();

        if snapshot.current_branch() == Some(branch) {
            return Err(RemoteError::validation(format!(
                "Cannot delete '{}': it is checked out on {}",
                branch,
                snapshot.id()
            )));
        }
        if !snapshot.local_branches().iter().any(|b| b == branch) {
            return Err(RemoteError::validation(format!(
                "'{}' is not a local branch of {}",
                branch,
                snapshot.id()
            )));
        }

        Ok(ActionPlan {
            resource: snapshot.id().clone(),
            axis: Axis::Branch,
            action: ActionToken::DeleteBranch,
            target: branch.to_string(),
            precondition: Some(reading.clone()),
        })
    }

    /// `git fetch` / `git pull`; valid in any state
    pub fn resolve_git_sync(&self, service_name: &str, sync: GitSync) -> ActionPlan {
        ActionPlan {
            resource: ResourceId::git(service_name),
            axis: Axis::Branch,
            action: sync.token(),
            target: service_name.to_string(),
            precondition: None,
        }
    }

    /// `npm install` / `npm build`; valid in any state
    pub fn resolve_npm(&self, service_name: &str, action: NpmAction) -> ActionPlan {
        ActionPlan {
            resource: ResourceId::npm(service_name),
            axis: action.axis(),
            action: action.token(),
            target: service_name.to_string(),
            precondition: None,
        }
    }

    fn reading_for<'a>(&self, snapshot: &'a ResourceSnapshot, axis: Axis) -> Result<&'a AxisReading, RemoteError> {
        snapshot.axis(axis).ok_or_else(|| {
            if axis.is_timer() {
                RemoteError::validation(format!("{} has no timer", snapshot.id()))
            } else {
                not_togglable(snapshot.id(), axis)
            }
        })
    }

    fn branch_reading<'a>(&self, snapshot: &'a ResourceSnapshot) -> Result<&'a AxisReading, RemoteError> {
        if snapshot.id().kind != ResourceKind::GitCheckout {
            return Err(not_togglable(snapshot.id(), Axis::Branch));
        }
        snapshot
            .axis(Axis::Branch)
            .ok_or_else(|| not_togglable(snapshot.id(), Axis::Branch))
    }
}

fn not_togglable(id: &ResourceId, axis: Axis) -> RemoteError {
    RemoteError::validation(format!("Axis '{}' cannot be toggled on {}", axis, id))
}
