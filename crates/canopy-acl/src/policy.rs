//! Caller-level policy: ACL content rules and authorization outcomes.

use canopy_core::config::AuthorizationConfig;
use canopy_core::{ANONYMOUS_USER, AccessType, Acl, Caller, Error, PUBLIC_GROUP, Result};
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of an authorization check, with the reason for a denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationStatus {
    /// Whether the caller may proceed.
    pub authorized: bool,
    /// Why access was denied. Empty when authorized.
    pub reason: String,
}

impl AuthorizationStatus {
    /// Access granted.
    pub fn authorized() -> Self {
        Self {
            authorized: true,
            reason: String::new(),
        }
    }

    /// Access denied because of `reason`.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            authorized: false,
            reason: reason.into(),
        }
    }

    /// Whether access was granted.
    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    /// Converts a denial into [`Error::Unauthorized`].
    pub fn into_result(self) -> Result<()> {
        if self.authorized {
            Ok(())
        } else {
            Err(Error::unauthorized(self.reason))
        }
    }
}

/// Checks what an ACL may contain before it is stored.
///
/// Rules:
/// - at least one entry, none with an empty access set, one entry per principal
/// - the public group and the anonymous user may only receive
///   `public_grantable` access types
/// - a non-admin caller must keep `CHANGE_PERMISSIONS` through one of their
///   own principals, so nobody locks themselves out by accident
pub fn validate_acl_content(acl: &Acl, caller: &Caller, policy: &AuthorizationConfig) -> Result<()> {
    if acl.entries.is_empty() {
        return Err(Error::invalid_acl(format!(
            "ACL for {} has no entries",
            acl.resource_id
        )));
    }

    let mut seen = HashSet::new();
    for entry in &acl.entries {
        if entry.access.is_empty() {
            return Err(Error::invalid_acl(format!(
                "entry for principal {} grants nothing",
                entry.principal_id
            )));
        }
        if !seen.insert(entry.principal_id) {
            return Err(Error::invalid_acl(format!(
                "principal {} appears more than once",
                entry.principal_id
            )));
        }
        if entry.principal_id == PUBLIC_GROUP || entry.principal_id == ANONYMOUS_USER {
            if let Some(extra) = entry
                .access
                .iter()
                .find(|access| !policy.public_grantable.contains(*access))
            {
                return Err(Error::invalid_acl(format!(
                    "{extra} cannot be granted to public principal {}; allowed: {}",
                    entry.principal_id, policy.public_grantable
                )));
            }
        }
    }

    if !caller.is_admin && !acl.grants(&caller.principals, AccessType::ChangePermissions) {
        return Err(Error::invalid_acl(format!(
            "caller {} would lose CHANGE_PERMISSIONS on {}",
            caller.user_id, acl.resource_id
        )));
    }
    Ok(())
}
