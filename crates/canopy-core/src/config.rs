//! Configuration for the permission engine.
//!
//! Configuration is read from a TOML file (see [`ConfigManager`]) and can be
//! overridden by `CANOPY_*` environment variables. Every field has a default,
//! so an absent file is not an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::access::{AccessType, AccessTypeSet};
use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CANOPY_CONFIG";

// ============================================================================
// ConfigManager
// ============================================================================

/// Loading, locating and exporting a TOML configuration type.
pub trait ConfigManager: Serialize + DeserializeOwned + Default {
    /// Name used for the config directory and in messages.
    fn project_name() -> &'static str;

    /// Applies environment overrides and checks the result.
    fn finalize(&mut self) -> Result<()>;

    /// Flattens the configuration into environment variable assignments.
    fn to_env_vars(&self) -> Result<Vec<(String, String)>>;

    /// The platform config location, e.g. `~/.config/canopy/config.toml`.
    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(Self::project_name()).join("config.toml"))
    }

    /// Explicit path, then [`CONFIG_PATH_ENV`], then the default location.
    fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        explicit
            .map(PathBuf::from)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(Self::default_config_path)
    }

    /// Loads the configuration.
    ///
    /// An explicit path must exist; an implicit one falls back to defaults.
    fn load(explicit: Option<&str>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit) {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| Error::io_with_path(e, &path))?;
                toml::from_str(&content).map_err(|e| {
                    Error::config(format!("Failed to parse {}: {e}", path.display()))
                })?
            }
            Some(path) if explicit.is_some() => {
                return Err(Error::config(format!(
                    "Config file does not exist at {}",
                    path.display()
                )));
            }
            _ => Self::default(),
        };
        config.finalize()?;
        Ok(config)
    }

    /// Serializes to pretty TOML.
    fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// CanopyConfig
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanopyConfig {
    /// Traversal ceilings.
    pub limits: LimitsConfig,
    /// Caller-level policy.
    pub authorization: AuthorizationConfig,
    /// Change notification settings.
    pub events: EventsConfig,
    /// Names used when rendering set-based predicates.
    pub predicate: PredicateConfig,
}

/// Ceilings that keep a single request from stalling the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Most nodes one override/restore/move/delete may visit.
    pub max_propagation_nodes: usize,
    /// Most node ids one bulk authorization call may carry.
    pub max_bulk_nodes: usize,
    /// Most parent hops when walking to a root.
    pub max_tree_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_propagation_nodes: 100_000,
            max_bulk_nodes: 50_000,
            max_tree_depth: 10_000,
        }
    }
}

/// Caller-level authorization policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// The most an anonymous caller may ever be granted.
    pub anonymous_access: AccessTypeSet,
    /// What an ACL may grant to the public group or the anonymous user.
    pub public_grantable: AccessTypeSet,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            anonymous_access: AccessTypeSet::from([AccessType::Read, AccessType::Download]),
            public_grantable: AccessTypeSet::from([AccessType::Read]),
        }
    }
}

/// Change notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Buffered events per subscriber before the slowest one lags.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Table and column names for rendered SQL predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredicateConfig {
    /// Table holding one row per (resource, principal, access type).
    pub acl_table: String,
    /// Column in `acl_table` naming the ACL's owning resource.
    pub resource_column: String,
    /// Column in `acl_table` naming the principal.
    pub principal_column: String,
    /// Column in `acl_table` naming the access type.
    pub access_column: String,
    /// Column of the filtered relation holding each row's benefactor.
    pub benefactor_column: String,
}

impl Default for PredicateConfig {
    fn default() -> Self {
        Self {
            acl_table: "acl_entry".to_string(),
            resource_column: "resource_id".to_string(),
            principal_column: "principal_id".to_string(),
            access_column: "access_type".to_string(),
            benefactor_column: "benefactor_id".to_string(),
        }
    }
}

const ENV_MAX_PROPAGATION: &str = "CANOPY_MAX_PROPAGATION_NODES";
const ENV_MAX_BULK: &str = "CANOPY_MAX_BULK_NODES";
const ENV_MAX_DEPTH: &str = "CANOPY_MAX_TREE_DEPTH";

impl CanopyConfig {
    /// Applies limit overrides from a variable lookup.
    ///
    /// Split from [`ConfigManager::finalize`] so tests need not touch the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets = [
            (ENV_MAX_PROPAGATION, &mut self.limits.max_propagation_nodes),
            (ENV_MAX_BULK, &mut self.limits.max_bulk_nodes),
            (ENV_MAX_DEPTH, &mut self.limits.max_tree_depth),
        ];
        for (name, slot) in targets {
            if let Some(raw) = lookup(name) {
                *slot = raw
                    .trim()
                    .parse()
                    .map_err(|e| Error::config(format!("{name}={raw}: {e}")))?;
            }
        }
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("limits.max_propagation_nodes", self.limits.max_propagation_nodes),
            ("limits.max_bulk_nodes", self.limits.max_bulk_nodes),
            ("limits.max_tree_depth", self.limits.max_tree_depth),
            ("events.channel_capacity", self.events.channel_capacity),
        ];
        for (key, value) in limits {
            if value == 0 {
                return Err(Error::config(format!("{key} must be greater than zero")));
            }
        }
        if !self
            .authorization
            .public_grantable
            .is_subset(&self.authorization.anonymous_access)
        {
            return Err(Error::config(
                "authorization.public_grantable must be a subset of authorization.anonymous_access",
            ));
        }
        Ok(())
    }
}

impl ConfigManager for CanopyConfig {
    fn project_name() -> &'static str {
        "canopy"
    }

    fn finalize(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())?;
        self.validate()
    }

    fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            (
                ENV_MAX_PROPAGATION.to_string(),
                self.limits.max_propagation_nodes.to_string(),
            ),
            (
                ENV_MAX_BULK.to_string(),
                self.limits.max_bulk_nodes.to_string(),
            ),
            (
                ENV_MAX_DEPTH.to_string(),
                self.limits.max_tree_depth.to_string(),
            ),
        ])
    }
}
