//! Service Commands

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use std::sync::Arc;
use tsm_control::{
    Axis, AxisReading, ControlSession, Dispatch, RemoteError, ResourceId, ResourceKind, ResourceSnapshot,
};

use crate::connect::Connection;
use crate::output::{print_info, print_item, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum ServicesCommands {
    /// List services with run, boot and timer state
    List {
        /// Only show services whose name or filename contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Toggle one axis of a service
    Toggle {
        /// Service name or unit filename
        name: String,

        /// Axis to toggle
        #[arg(value_enum)]
        axis: ToggleAxis,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToggleAxis {
    Run,
    Boot,
    TimerRun,
    TimerBoot,
}

impl From<ToggleAxis> for Axis {
    fn from(axis: ToggleAxis) -> Self {
        match axis {
            ToggleAxis::Run => Axis::Run,
            ToggleAxis::Boot => Axis::Boot,
            ToggleAxis::TimerRun => Axis::TimerRun,
            ToggleAxis::TimerBoot => Axis::TimerBoot,
        }
    }
}

/// Service row for display
#[derive(Debug, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub filename: String,
    pub run: String,
    pub boot: String,
    pub timer_run: Option<String>,
    pub timer_boot: Option<String>,
    pub time_left: Option<String>,
}

/// Raw status text, with the fallback shown when parsing had to guess
fn describe(reading: Option<&AxisReading>) -> Option<String> {
    let reading = reading?;
    let raw = reading.raw.trim();
    if reading.defaulted {
        Some(format!("{} (as {})", if raw.is_empty() { "?" } else { raw }, reading.state))
    } else {
        Some(raw.to_string())
    }
}

impl From<&ResourceSnapshot> for ServiceView {
    fn from(snapshot: &ResourceSnapshot) -> Self {
        Self {
            name: snapshot.name().to_string(),
            filename: snapshot.filename().to_string(),
            run: describe(snapshot.axis(Axis::Run)).unwrap_or_default(),
            boot: describe(snapshot.axis(Axis::Boot)).unwrap_or_default(),
            timer_run: describe(snapshot.axis(Axis::TimerRun)),
            timer_boot: describe(snapshot.axis(Axis::TimerBoot)),
            time_left: snapshot.timer_time_left().map(str::to_string),
        }
    }
}

impl TableDisplay for ServiceView {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Filename", "Status", "On Boot", "Timer", "Timer On Boot", "Next Run"]
    }

    fn row(&self) -> Vec<String> {
        let dash = || "-".to_string();
        vec![
            self.name.clone(),
            self.filename.clone(),
            self.run.clone(),
            self.boot.clone(),
            self.timer_run.clone().unwrap_or_else(dash),
            self.timer_boot.clone().unwrap_or_else(dash),
            self.time_left.clone().unwrap_or_else(dash),
        ]
    }
}

pub async fn execute(cmd: ServicesCommands, conn: &Connection, format: OutputFormat) -> Result<()> {
    let session = conn.session()?;

    match cmd {
        ServicesCommands::List { filter } => {
            let services = session.refresh_services().await?;
            let views: Vec<ServiceView> = services
                .iter()
                .filter(|s| filter.as_deref().map_or(true, |f| s.matches_filter(f)))
                .map(|s| ServiceView::from(s.as_ref()))
                .collect();
            print_list(&views, format);
        }
        ServicesCommands::Toggle { name, axis } => {
            session.refresh_services().await?;
            let id = find_service(&session, &name)?;
            let axis = Axis::from(axis);

            match session.toggle(&id, axis).await? {
                Dispatch::Completed { plan, outcome } => {
                    print_success(&format!("{} {} ({})", plan.action, plan.target, axis));
                    match outcome {
                        Some(snapshot) => print_item(&ServiceView::from(snapshot.as_ref()), format),
                        None => print_warning(&format!("{} is no longer listed on the machine", name)),
                    }
                }
                Dispatch::AlreadyInFlight { key } => {
                    print_info(&format!("{} is already in progress", key));
                }
            }
        }
    }

    Ok(())
}

/// Match by unit filename first, then by a service name that is unique
pub fn find_service(session: &ControlSession, name: &str) -> Result<ResourceId, RemoteError> {
    pick_service(&session.snapshots_of(ResourceKind::Service), name)
}

fn pick_service(services: &[Arc<ResourceSnapshot>], name: &str) -> Result<ResourceId, RemoteError> {
    if let Some(service) = services.iter().find(|s| s.filename() == name) {
        return Ok(service.id().clone());
    }

    let named: Vec<_> = services.iter().filter(|s| s.name() == name).collect();
    match named.as_slice() {
        [service] => Ok(service.id().clone()),
        [] => Err(RemoteError::validation(format!("Service '{}' not found on this machine", name))),
        _ => {
            let units: Vec<_> = named.iter().map(|s| s.filename()).collect();
            Err(RemoteError::validation(format!(
                "Service name '{}' matches {}; use the unit filename",
                name,
                units.join(", ")
            )))
        }
    }
}
