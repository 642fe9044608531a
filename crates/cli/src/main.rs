//! TSM CLI - Main Entry Point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tsm_control::RemoteError;

use tsm_cli::commands::{apps, git, logs, machine, npm, services};
use tsm_cli::connect::Connection;
use tsm_cli::output::{self, print_error};

/// TSM - control services, apps and checkouts on remote machines
#[derive(Parser)]
#[command(name = "tsm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Machine from the registry to talk to
    #[arg(short, long, global = true)]
    machine: Option<String>,

    /// Machine API base URL, bypassing the registry
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bearer token for the machine API
    #[arg(long, env = "TSM_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage systemd services and their timers
    #[command(subcommand)]
    Services(services::ServicesCommands),

    /// Manage git checkouts of services
    #[command(subcommand)]
    Git(git::GitCommands),

    /// Run npm install/build for services
    #[command(subcommand)]
    Npm(npm::NpmCommands),

    /// Manage PM2 apps
    #[command(subcommand)]
    Apps(apps::AppsCommands),

    /// Read service, app and system logs
    #[command(subcommand)]
    Logs(logs::LogsCommands),

    /// Manage the machine registry
    #[command(subcommand)]
    Machine(machine::MachineCommands),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = cli.format;
    if let Err(e) = run(cli).await {
        match e.downcast_ref::<RemoteError>() {
            Some(remote) => output::print_remote_error(remote, format),
            None => {
                debug!("{:?}", e);
                print_error(&format!("{:#}", e));
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Version = cli.command {
        println!("TSM CLI v{}", tsm_common::VERSION);
        return Ok(());
    }

    let config_path = cli.config.unwrap_or_else(tsm_common::default_config_path);
    let conn = Connection::load(config_path, cli.machine, cli.url, cli.token)?;

    match cli.command {
        Commands::Services(cmd) => services::execute(cmd, &conn, cli.format).await?,
        Commands::Git(cmd) => git::execute(cmd, &conn, cli.format).await?,
        Commands::Npm(cmd) => npm::execute(cmd, &conn, cli.format).await?,
        Commands::Apps(cmd) => apps::execute(cmd, &conn, cli.format).await?,
        Commands::Logs(cmd) => logs::execute(cmd, &conn, cli.format).await?,
        Commands::Machine(cmd) => machine::execute(cmd, &conn, cli.format).await?,
        Commands::Version => {}
    }

    Ok(())
}
