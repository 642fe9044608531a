//! Machine Commands
//!
//! Read and edit the machine registry in the config file.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;

use crate::config::CliConfig;
use crate::connect::Connection;
use crate::output::{print_item, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum MachineCommands {
    /// List known machines
    List,

    /// Show the machine commands will talk to
    Show,

    /// Make a machine the default
    Use {
        /// Machine name from the registry
        name: String,
    },
}

/// Registry entry for display
#[derive(Serialize)]
pub struct MachineView {
    pub name: String,
    pub base_url: String,
    pub default: bool,
}

impl TableDisplay for MachineView {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Base URL", "Default"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.base_url.clone(),
            if self.default { "*".to_string() } else { String::new() },
        ]
    }
}

pub fn machine_views(config: &CliConfig) -> Vec<MachineView> {
    config
        .machines
        .iter()
        .map(|m| MachineView {
            name: m.name.clone(),
            base_url: m.base_url.clone(),
            default: config.default_machine.as_deref() == Some(m.name.as_str()),
        })
        .collect()
}

pub async fn execute(cmd: MachineCommands, conn: &Connection, format: OutputFormat) -> Result<()> {
    match cmd {
        MachineCommands::List => {
            print_list(&machine_views(&conn.config), format);
        }
        MachineCommands::Show => {
            let ctx = conn.context()?;
            let machine = match ctx.machine() {
                Some(machine) if ctx.is_connected() => machine,
                _ => {
                    print_warning("No machine selected. Use --machine, --url or `tsm machine use <name>`.");
                    return Ok(());
                }
            };

            if format == OutputFormat::Table {
                println!("{}", "━".repeat(50).dimmed());
                println!("   Name:          {}", machine.name.green());
                println!("   Base URL:      {}", ctx.base_url().unwrap_or_default().cyan());
                println!(
                    "   Token:         {}",
                    if ctx.token().is_some() { "set".green() } else { "not set".yellow() }
                );
                println!("   Self-managed:  {}", conn.config.self_managed_service);
                println!("   Log interval:  {}ms", conn.config.log_poll_interval_ms);
                println!("{}", "━".repeat(50).dimmed());
            } else {
                print_item(
                    &MachineView {
                        name: machine.name.clone(),
                        base_url: ctx.base_url().unwrap_or_default().to_string(),
                        default: conn.config.default_machine.as_deref() == Some(machine.name.as_str()),
                    },
                    format,
                );
            }
        }
        MachineCommands::Use { name } => {
            let mut config = conn.config.clone();
            config.use_machine(&name)?;
            config
                .save(&conn.config_path)
                .with_context(|| format!("Failed to write {}", conn.config_path.display()))?;
            print_success(&format!("Default machine is now {}", name));
        }
    }

    Ok(())
}
