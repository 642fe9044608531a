//! PM2 App Commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tsm_control::{Axis, Dispatch, RemoteError, ResourceId, ResourceSnapshot};

use crate::connect::Connection;
use crate::output::{print_info, print_item, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum AppsCommands {
    /// List PM2-managed apps
    List,

    /// Start a stopped app or stop a running one
    Toggle {
        /// App name
        name: String,
    },
}

/// PM2 app row for display
#[derive(Serialize)]
pub struct AppView {
    pub name: String,
    pub status: String,
    pub running: bool,
}

impl From<&ResourceSnapshot> for AppView {
    fn from(snapshot: &ResourceSnapshot) -> Self {
        let reading = snapshot.axis(Axis::Run);
        Self {
            name: snapshot.name().to_string(),
            status: reading.map(|r| r.raw.clone()).unwrap_or_default(),
            running: reading.and_then(|r| r.state.is_on()).unwrap_or(false),
        }
    }
}

impl TableDisplay for AppView {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Status", "Running"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.status.clone(),
            if self.running { "✓".to_string() } else { "✗".to_string() },
        ]
    }
}

pub async fn execute(cmd: AppsCommands, conn: &Connection, format: OutputFormat) -> Result<()> {
    let session = conn.session()?;

    match cmd {
        AppsCommands::List => {
            let apps = session.refresh_apps().await?;
            let views: Vec<AppView> = apps.iter().map(|a| AppView::from(a.as_ref())).collect();
            print_list(&views, format);
        }
        AppsCommands::Toggle { name } => {
            session.refresh_apps().await?;
            let id = ResourceId::app(&name);
            if session.snapshot(&id).is_none() {
                return Err(RemoteError::validation(format!("App '{}' is not managed by PM2", name)).into());
            }

            match session.toggle(&id, Axis::Run).await? {
                Dispatch::Completed { outcome, .. } => {
                    print_success(&format!("Toggled {}", name));
                    match outcome {
                        Some(snapshot) => print_item(&AppView::from(snapshot.as_ref()), format),
                        None => print_warning(&format!("{} is no longer managed by PM2", name)),
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
