//! Immutable resource snapshots
//!
//! A snapshot is built once from a fetched payload and never edited. A
//! newer fetch replaces it wholesale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tsm_common::{GitBranchesResponse, Pm2App, ServiceStatusRow};

use crate::state::{parse_boot_state, parse_process_state, parse_run_state, Axis, AxisReading, AxisState};

/// Kind of remote-controllable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Service,
    GitCheckout,
    NpmRunner,
    Pm2App,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Service => write!(f, "service"),
            ResourceKind::GitCheckout => write!(f, "git"),
            ResourceKind::NpmRunner => write!(f, "npm"),
            ResourceKind::Pm2App => write!(f, "app"),
        }
    }
}

/// Stable identity of a resource on the connected machine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// A systemd service, keyed by unit filename
    pub fn service(filename: impl Into<String>) -> Self {
        Self::new(ResourceKind::Service, filename)
    }

    pub fn git(service_name: impl Into<String>) -> Self {
        Self::new(ResourceKind::GitCheckout, service_name)
    }

    pub fn npm(service_name: impl Into<String>) -> Self {
        Self::new(ResourceKind::NpmRunner, service_name)
    }

    pub fn app(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Pm2App, name)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Kind-specific data that is shown but never toggled
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotDetail {
    Service {
        timer_trigger: Option<String>,
    },
    Git {
        local_branches: Vec<String>,
        remote_branches: Vec<String>,
    },
    App {
        extra: BTreeMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    /// Services are identified by unit filename, which is unique per machine
    id: ResourceId,
    name: String,
    /// Name used in remote paths (unit filename, app name, service name)
    filename: String,
    axes: BTreeMap<Axis, AxisReading>,
    detail: SnapshotDetail,
    fetched_at: DateTime<Utc>,
}

impl ResourceSnapshot {
    pub fn from_service_row(row: &ServiceStatusRow, fetched_at: DateTime<Utc>) -> Self {
        let mut axes = BTreeMap::new();
        axes.insert(Axis::Run, parse_run_state(&row.status));
        axes.insert(Axis::Boot, parse_boot_state(&row.on_start_status));

        if row.has_timer() {
            let timer_status = row.timer_status.as_deref().unwrap_or_default();
            let timer_boot = row.timer_on_start_status.as_deref().unwrap_or_default();
            axes.insert(Axis::TimerRun, parse_run_state(timer_status));
            axes.insert(Axis::TimerBoot, parse_boot_state(timer_boot));
        }

        Self {
            id: ResourceId::service(&row.filename),
            name: row.name.clone(),
            filename: row.filename.clone(),
            axes,
            detail: SnapshotDetail::Service {
                timer_trigger: row.timer_trigger.clone(),
            },
            fetched_at,
        }
    }

    pub fn from_git_branches(service_name: &str, body: &GitBranchesResponse, fetched_at: DateTime<Utc>) -> Self {
        let mut axes = BTreeMap::new();
        axes.insert(
            Axis::Branch,
            AxisReading::exact(AxisState::Branch(body.current_branch.clone()), &body.current_branch),
        );

        Self {
            id: ResourceId::git(service_name),
            name: service_name.to_string(),
            filename: service_name.to_string(),
            axes,
            detail: SnapshotDetail::Git {
                local_branches: body.git_branches_local_array.clone(),
                remote_branches: body.git_branches_remote_array.clone(),
            },
            fetched_at,
        }
    }

    pub fn from_pm2_app(app: &Pm2App, fetched_at: DateTime<Utc>) -> Self {
        let mut axes = BTreeMap::new();
        axes.insert(Axis::Run, parse_process_state(&app.status));

        Self {
            id: ResourceId::app(&app.name),
            name: app.name.clone(),
            filename: app.name.clone(),
            axes,
            detail: SnapshotDetail::App {
                extra: app.extra.clone(),
            },
            fetched_at,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn axis(&self, axis: Axis) -> Option<&AxisReading> {
        self.axes.get(&axis)
    }

    pub fn axes(&self) -> impl Iterator<Item = (&Axis, &AxisReading)> {
        self.axes.iter()
    }

    pub fn detail(&self) -> &SnapshotDetail {
        &self.detail
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn has_timer(&self) -> bool {
        self.axes.contains_key(&Axis::TimerRun)
    }

    /// Human part of the timer trigger, e.g. `"3h 36min left"`
    pub fn timer_time_left(&self) -> Option<&str> {
        match &self.detail {
            SnapshotDetail::Service {
                timer_trigger: Some(trigger),
            } if trigger.trim() != "n/a" => trigger
                .split_once(';')
                .map(|(_, left)| left.trim())
                .filter(|left| !left.is_empty()),
            _ => None,
        }
    }

    pub fn current_branch(&self) -> Option<&str> {
        match self.axis(Axis::Branch).map(|r| &r.state) {
            Some(AxisState::Branch(branch)) if !branch.is_empty() => Some(branch),
            _ => None,
        }
    }

    pub fn local_branches(&self) -> &[String] {
        match &self.detail {
            SnapshotDetail::Git { local_branches, .. } => local_branches,
            _ => &[],
        }
    }

    pub fn remote_branches(&self) -> &[String] {
        match &self.detail {
            SnapshotDetail::Git { remote_branches, .. } => remote_branches,
            _ => &[],
        }
    }

    /// Case-insensitive match on name or filename
    pub fn matches_filter(&self, filter: &str) -> bool {
        let needle = filter.to_lowercase();
        self.name().to_lowercase().contains(&needle) || self.filename.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BootState, RunState};

    fn row(status: &str, timer_status: Option<&str>) -> ServiceStatusRow {
        ServiceStatusRow {
            name: "Backup".to_string(),
            filename: "backup.service".to_string(),
            loaded: "loaded".to_string(),
            active: String::new(),
            status: status.to_string(),
            on_start_status: "enabled".to_string(),
            timer_loaded: None,
            timer_active: None,
            timer_status: timer_status.map(str::to_string),
            timer_on_start_status: timer_status.map(|_| "disabled".to_string()),
            timer_trigger: Some("Thu 2025-12-25 23:00:00 UTC; 3h 36min left".to_string()),
        }
    }

    #[test]
    fn test_service_axes_without_timer() {
        let snap = ResourceSnapshot::from_service_row(&row("active (running)", None), Utc::now());

        assert_eq!(snap.id(), &ResourceId::service("backup.service"));
        assert_eq!(snap.name(), "Backup");
        assert_eq!(snap.axis(Axis::Run).unwrap().state, AxisState::Run(RunState::Active));
        assert_eq!(snap.axis(Axis::Boot).unwrap().state, AxisState::Boot(BootState::Enabled));
        assert!(!snap.has_timer());
        assert!(snap.axis(Axis::TimerRun).is_none());
    }

    #[test]
    fn test_service_axes_with_timer() {
        let snap = ResourceSnapshot::from_service_row(&row("inactive", Some("active")), Utc::now());

        assert!(snap.has_timer());
        assert_eq!(snap.axis(Axis::TimerRun).unwrap().state, AxisState::Run(RunState::Active));
        assert_eq!(snap.axis(Axis::TimerBoot).unwrap().state, AxisState::Boot(BootState::Disabled));
        assert_eq!(snap.timer_time_left(), Some("3h 36min left"));
    }

    #[test]
    fn test_time_left_needs_semicolon() {
        let mut r = row("inactive", Some("active"));
        r.timer_trigger = Some("n/a".to_string());
        assert_eq!(ResourceSnapshot::from_service_row(&r, Utc::now()).timer_time_left(), None);

        r.timer_trigger = Some("Thu 2025-12-25 23:00:00 UTC".to_string());
        assert_eq!(ResourceSnapshot::from_service_row(&r, Utc::now()).timer_time_left(), None);
    }

    #[test]
    fn test_git_snapshot() {
        let body = GitBranchesResponse {
            git_branches_local_array: vec!["main".into(), "dev".into()],
            git_branches_remote_array: vec!["origin/main".into()],
            current_branch: "main".into(),
        };
        let snap = ResourceSnapshot::from_git_branches("Api", &body, Utc::now());

        assert_eq!(snap.id(), &ResourceId::git("Api"));
        assert_eq!(snap.current_branch(), Some("main"));
        assert_eq!(snap.local_branches().len(), 2);
        assert_eq!(snap.remote_branches(), &["origin/main".to_string()]);
    }

    #[test]
    fn test_filter_matches_name_or_filename() {
        let snap = ResourceSnapshot::from_service_row(&row("active", None), Utc::now());
        assert!(snap.matches_filter("back"));
        assert!(snap.matches_filter("UP.SERV"));
        assert!(!snap.matches_filter("nginx"));
    }
}
