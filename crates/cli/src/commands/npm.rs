//! npm Commands

use anyhow::{bail, Result};
use clap::Subcommand;
use serde::Serialize;
use tsm_control::{Dispatch, NpmAction, NpmReport};

use crate::connect::Connection;
use crate::output::{print_info, print_item, print_warning, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum NpmCommands {
    /// Run `npm install` in a service's directory
    Install {
        /// Service name
        service: String,
    },

    /// Run `npm run build` in a service's directory
    Build {
        /// Service name
        service: String,
    },
}

/// npm run report for display
#[derive(Serialize)]
pub struct NpmReportView {
    pub service: String,
    pub action: String,
    pub status: String,
    pub warnings: String,
    pub failure_reason: Option<String>,
    pub finished_at: String,
}

impl From<&NpmReport> for NpmReportView {
    fn from(report: &NpmReport) -> Self {
        Self {
            service: report.service.clone(),
            action: report.action.axis().to_string(),
            status: report.status.to_string(),
            warnings: report.warnings.trim().to_string(),
            failure_reason: report.failure_reason.clone(),
            finished_at: report.finished_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

impl TableDisplay for NpmReportView {
    fn headers() -> Vec<&'static str> {
        vec!["Service", "Action", "Status", "Failure Reason", "Finished"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.service.clone(),
            self.action.clone(),
            self.status.clone(),
            self.failure_reason.clone().unwrap_or_else(|| "-".to_string()),
            self.finished_at.clone(),
        ]
    }
}

pub async fn execute(cmd: NpmCommands, conn: &Connection, format: OutputFormat) -> Result<()> {
    let (service, action) = match cmd {
        NpmCommands::Install { service } => (service, NpmAction::Install),
        NpmCommands::Build { service } => (service, NpmAction::Build),
    };

    let session = conn.session()?;
    let report = match session.run_npm(&service, action).await? {
        Dispatch::Completed { outcome, .. } => outcome,
        Dispatch::AlreadyInFlight { key } => {
            print_info(&format!("{} is already in progress", key));
            return Ok(());
        }
    };

    let view = NpmReportView::from(report.as_ref());
    print_item(&view, format);
    if !view.warnings.is_empty() && format == OutputFormat::Table {
        print_warning("npm reported warnings:");
        println!("{}", view.warnings);
    }

    if !report.succeeded() {
        bail!(
            "npm {} failed for {}: {}",
            action.axis(),
            service,
            report.failure_reason.as_deref().unwrap_or("no reason given")
        );
    }

    Ok(())
}
