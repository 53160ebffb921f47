//! Access types and sets of access types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// A kind of access that an ACL entry can grant.
///
/// The set is closed so that every `match` over it is checked for
/// exhaustiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    /// View metadata and content.
    Read,
    /// Modify the resource.
    Update,
    /// Delete the resource.
    Delete,
    /// Create children under the resource.
    Create,
    /// Edit, override or restore the ACL.
    ChangePermissions,
    /// Change resource settings.
    ChangeSettings,
    /// Download attached content.
    Download,
    /// Upload content.
    Upload,
    /// Moderate discussion on the resource.
    Moderate,
}

impl AccessType {
    /// Every access type, in declaration order.
    pub const ALL: [AccessType; 9] = [
        AccessType::Read,
        AccessType::Update,
        AccessType::Delete,
        AccessType::Create,
        AccessType::ChangePermissions,
        AccessType::ChangeSettings,
        AccessType::Download,
        AccessType::Upload,
        AccessType::Moderate,
    ];

    /// Returns the wire name ("READ", "CHANGE_PERMISSIONS", ...).
    pub fn name(self) -> &'static str {
        match self {
            AccessType::Read => "READ",
            AccessType::Update => "UPDATE",
            AccessType::Delete => "DELETE",
            AccessType::Create => "CREATE",
            AccessType::ChangePermissions => "CHANGE_PERMISSIONS",
            AccessType::ChangeSettings => "CHANGE_SETTINGS",
            AccessType::Download => "DOWNLOAD",
            AccessType::Upload => "UPLOAD",
            AccessType::Moderate => "MODERATE",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for AccessType {
    type Err = Error;

    /// Parses a wire name. `CHANGE` is accepted as an alias for `UPDATE`.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "CHANGE" {
            return Ok(AccessType::Update);
        }
        AccessType::ALL
            .into_iter()
            .find(|t| t.name() == upper)
            .ok_or_else(|| Error::invalid_acl(format!("unknown access type '{s}'")))
    }
}

/// An ordered set of access types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessTypeSet(BTreeSet<AccessType>);

impl AccessTypeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding every access type.
    pub fn all() -> Self {
        AccessType::ALL.into_iter().collect()
    }

    /// Whether `access` is in the set.
    pub fn contains(&self, access: AccessType) -> bool {
        self.0.contains(&access)
    }

    /// Adds an access type, returning whether it was newly inserted.
    pub fn insert(&mut self, access: AccessType) -> bool {
        self.0.insert(access)
    }

    /// Removes an access type, returning whether it was present.
    pub fn remove(&mut self, access: AccessType) -> bool {
        self.0.remove(&access)
    }

    /// Number of access types in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every member of `self` is also in `other`.
    pub fn is_subset(&self, other: &AccessTypeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Iterates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = AccessType> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<AccessType> for AccessTypeSet {
    fn from_iter<I: IntoIterator<Item = AccessType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[AccessType; N]> for AccessTypeSet {
    fn from(types: [AccessType; N]) -> Self {
        types.into_iter().collect()
    }
}

impl fmt::Display for AccessTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(AccessType::name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
