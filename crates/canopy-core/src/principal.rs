//! Principal sets and the caller identity presented for decisions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::PrincipalId;

/// Group every caller belongs to, including anonymous ones.
pub const PUBLIC_GROUP: PrincipalId = PrincipalId::new(273949);

/// Group every signed-in caller belongs to.
pub const AUTHENTICATED_USERS_GROUP: PrincipalId = PrincipalId::new(273948);

/// The user id carried by unauthenticated requests.
pub const ANONYMOUS_USER: PrincipalId = PrincipalId::new(273950);

/// The set of principals presented for an authorization decision.
///
/// Holds the user id and every group the user belongs to. The pseudo-groups
/// [`PUBLIC_GROUP`] and [`AUTHENTICATED_USERS_GROUP`] are expected to be
/// merged in already by whoever built the set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalSet(BTreeSet<PrincipalId>);

impl PrincipalSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `principal` is a member.
    pub fn contains(&self, principal: PrincipalId) -> bool {
        self.0.contains(&principal)
    }

    /// Adds a principal.
    pub fn insert(&mut self, principal: PrincipalId) -> bool {
        self.0.insert(principal)
    }

    /// Number of principals.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = PrincipalId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<PrincipalId> for PrincipalSet {
    fn from_iter<I: IntoIterator<Item = PrincipalId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[PrincipalId; N]> for PrincipalSet {
    fn from(ids: [PrincipalId; N]) -> Self {
        ids.into_iter().collect()
    }
}

/// Who is asking: the user, their principal set and whether they are an
/// administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// The user's own principal id.
    pub user_id: PrincipalId,
    /// User id plus all groups, pseudo-groups included.
    pub principals: PrincipalSet,
    /// Administrators bypass ACL checks.
    pub is_admin: bool,
}

impl Caller {
    /// Creates a non-admin caller. The user id is added to `principals`.
    pub fn new(user_id: PrincipalId, principals: PrincipalSet) -> Self {
        let mut principals = principals;
        principals.insert(user_id);
        Self {
            user_id,
            principals,
            is_admin: false,
        }
    }

    /// Creates an administrator.
    pub fn admin(user_id: PrincipalId) -> Self {
        Self {
            is_admin: true,
            ..Self::new(user_id, PrincipalSet::new())
        }
    }

    /// The unauthenticated caller: itself plus [`PUBLIC_GROUP`].
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USER, PrincipalSet::from([PUBLIC_GROUP]))
    }

    /// Whether this is the unauthenticated caller.
    pub fn is_anonymous(&self) -> bool {
        self.user_id == ANONYMOUS_USER
    }
}
