//! Command-line arguments.

use canopy_core::{AccessType, NodeId, PrincipalId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Canopy - inspect permission snapshots and manage configuration
#[derive(Parser, Debug)]
#[command(name = "canopy", author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Configuration file operations
    Config {
        /// Config action
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check the benefactor invariants of a snapshot
    Check {
        /// Snapshot JSON file
        snapshot: PathBuf,
    },
    /// Print the benefactor of a node
    Benefactor {
        /// Snapshot JSON file
        snapshot: PathBuf,
        /// Node id
        node: NodeId,
    },
    /// Decide whether a set of principals holds an access type on a node
    Access {
        /// Snapshot JSON file
        snapshot: PathBuf,
        /// Node id
        node: NodeId,
        /// Access type, e.g. READ or CHANGE_PERMISSIONS
        access: AccessType,
        /// Principals presented (user and groups)
        #[arg(short, long = "principal", required = true, num_args = 1..)]
        principals: Vec<PrincipalId>,
    },
    /// Print the ACL governing a node as JSON
    Acl {
        /// Snapshot JSON file
        snapshot: PathBuf,
        /// Node id
        node: NodeId,
    },
}

/// `canopy config` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path
    Path,
    /// Print the effective configuration as TOML
    Show,
    /// Get a value by dotted key, e.g. limits.max_bulk_nodes
    Get {
        /// Dotted key
        key: String,
    },
    /// Set a value by dotted key in the config file
    Set {
        /// Dotted key
        key: String,
        /// New value
        value: String,
    },
    /// Write a default configuration file
    Init {
        /// Target file (defaults to the platform config location)
        #[arg(short, long)]
        file: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the limit overrides as environment variables
    Export {
        /// Format as docker --env flags
        #[arg(long)]
        docker_env: bool,
    },
}
