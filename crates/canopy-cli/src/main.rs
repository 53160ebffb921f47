//! Canopy CLI
//!
//! Command-line interface for inspecting permission snapshots.

#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use canopy_cli::cli::{Args, Command};
use canopy_cli::commands;
use canopy_cli::config_handlers::handle_config_command;
use canopy_core::{CanopyConfig, ConfigManager};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let config_path = args.config.as_deref();

    let load = || CanopyConfig::load(config_path).context("loading configuration");

    match args.command {
        Command::Config { action } => handle_config_command(config_path, action)?,
        Command::Check { snapshot } => {
            let report = commands::check(&snapshot, load()?).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                bail!(
                    "{} invariant violations in {}",
                    report.violations.len(),
                    snapshot.display()
                );
            }
        }
        Command::Benefactor { snapshot, node } => {
            println!("{}", commands::benefactor(&snapshot, load()?, node).await?);
        }
        Command::Access {
            snapshot,
            node,
            access,
            principals,
        } => {
            let granted = commands::access(&snapshot, load()?, node, access, &principals).await?;
            println!("{}", if granted { "granted" } else { "denied" });
        }
        Command::Acl { snapshot, node } => {
            let effective = commands::acl(&snapshot, load()?, node).await?;
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
    }
    Ok(())
}
