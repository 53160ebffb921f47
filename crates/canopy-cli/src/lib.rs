//! # canopy-cli
//!
//! Diagnostic tooling for the Canopy permission engine:
//! - loading a tree and its ACLs from a JSON snapshot
//! - benefactor, access and effective-ACL queries against it
//! - invariant checks
//! - configuration file management

#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config_handlers;
pub mod snapshot;

pub use snapshot::{LoadedSnapshot, Snapshot, SnapshotAcl, SnapshotNode};
