//! Git Commands
//!
//! Branch management for the checkouts behind each service.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tsm_control::{ControlSession, Dispatch, GitOutcome, GitSync, ResourceSnapshot};

use crate::connect::Connection;
use crate::output::{print_info, print_list, print_success, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum GitCommands {
    /// List branches of a service's checkout
    Branches(BranchesArgs),

    /// Check out a local or remote branch
    Checkout {
        /// Service name
        service: String,
        /// Branch, e.g. `dev` or `origin/feature`
        branch: String,
    },

    /// Run `git fetch`
    Fetch {
        /// Service name
        service: String,
    },

    /// Run `git pull`
    Pull {
        /// Service name
        service: String,
    },

    /// Delete a local branch
    DeleteBranch {
        /// Service name
        service: String,
        /// Local branch to delete
        branch: String,
    },
}

#[derive(Args)]
pub struct BranchesArgs {
    /// Service name
    pub service: String,

    /// Include remote branches
    #[arg(short, long)]
    pub remotes: bool,

    /// Show only the first N branches
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Branch information for display
#[derive(Serialize, Clone)]
pub struct BranchInfo {
    pub name: String,
    pub location: String,
    pub current: bool,
}

impl TableDisplay for BranchInfo {
    fn headers() -> Vec<&'static str> {
        vec!["Branch", "Location", "Current"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.location.clone(),
            if self.current { "*".to_string() } else { String::new() },
        ]
    }
}

/// Local branches first, then remote ones when asked for
pub fn branch_rows(snapshot: &ResourceSnapshot, include_remotes: bool) -> Vec<BranchInfo> {
    let current = snapshot.current_branch();
    let local = snapshot.local_branches().iter().map(|name| BranchInfo {
        name: name.clone(),
        location: "local".to_string(),
        current: Some(name.as_str()) == current,
    });
    let remote = snapshot
        .remote_branches()
        .iter()
        .filter(|_| include_remotes)
        .map(|name| BranchInfo {
            name: name.clone(),
            location: "remote".to_string(),
            current: false,
        });

    local.chain(remote).collect()
}

pub async fn execute(cmd: GitCommands, conn: &Connection, format: OutputFormat) -> Result<()> {
    let session = conn.session()?;

    match cmd {
        GitCommands::Branches(args) => execute_branches(&session, args, format).await,
        GitCommands::Checkout { service, branch } => {
            session.refresh_git(&service).await?;
            let dispatch = session.checkout(&service, &branch).await?;
            report(dispatch, &format!("Checked out '{}' in {}", branch, service));
            Ok(())
        }
        GitCommands::Fetch { service } => {
            let dispatch = session.git_sync(&service, GitSync::Fetch).await?;
            report(dispatch, &format!("Fetched {}", service));
            Ok(())
        }
        GitCommands::Pull { service } => {
            let dispatch = session.git_sync(&service, GitSync::Pull).await?;
            report(dispatch, &format!("Pulled {}", service));
            Ok(())
        }
        GitCommands::DeleteBranch { service, branch } => {
            session.refresh_git(&service).await?;
            let dispatch = session.delete_branch(&service, &branch).await?;
            report(dispatch, &format!("Deleted branch '{}' in {}", branch, service));
            Ok(())
        }
    }
}

async fn execute_branches(session: &ControlSession, args: BranchesArgs, format: OutputFormat) -> Result<()> {
    let snapshot = session.refresh_git(&args.service).await?;
    let mut branches = branch_rows(&snapshot, args.remotes);

    if let Some(limit) = args.limit {
        branches.truncate(limit);
    }

    print_list(&branches, format);

    Ok(())
}

fn report(dispatch: Dispatch<GitOutcome>, done: &str) {
    match dispatch {
        Dispatch::Completed { outcome, .. } => {
            print_success(done);
            for output in [&outcome.response.stdout, &outcome.response.stderr] {
                let output = output.trim();
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
            if let Some(branch) = outcome.snapshot.current_branch() {
                print_info(&format!("Current branch: {}", branch));
            }
        }
        Dispatch::AlreadyInFlight { key } => print_info(&format!("{} is already in progress", key)),
    }
}
