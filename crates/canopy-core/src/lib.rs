//! Canopy Core: shared types, errors and configuration.
//!
//! This crate provides the vocabulary used across all Canopy crates.
//! It has no internal Canopy dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`ids`]: Node and principal identifiers, node types
//! - [`access`]: Access types and access-type sets
//! - [`principal`]: Principal sets, well-known principals, callers
//! - [`acl`]: Access control lists
//! - [`config`]: Engine configuration

pub mod access;
pub mod acl;
pub mod config;
pub mod error;
pub mod ids;
pub mod principal;

// Re-export key types at crate root for convenience
pub use access::{AccessType, AccessTypeSet};
pub use acl::{Acl, ResourceAccess};
pub use config::{
    AuthorizationConfig, CanopyConfig, ConfigManager, EventsConfig, LimitsConfig, PredicateConfig,
};
pub use error::{Error, Result};
pub use ids::{NodeId, NodeType, PrincipalId, ResourceKey};
pub use principal::{
    ANONYMOUS_USER, AUTHENTICATED_USERS_GROUP, Caller, PUBLIC_GROUP, PrincipalSet,
};
