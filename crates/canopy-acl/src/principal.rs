//! Turning a user id into the principal set presented for decisions.
//!
//! The resolver, not the engine, merges the pseudo-groups: every caller
//! carries [`PUBLIC_GROUP`], and every caller except [`ANONYMOUS_USER`]
//! carries [`AUTHENTICATED_USERS_GROUP`].

use async_trait::async_trait;
use canopy_core::{
    ANONYMOUS_USER, AUTHENTICATED_USERS_GROUP, Caller, PUBLIC_GROUP, PrincipalId, PrincipalSet,
    Result,
};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Source of group memberships.
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    /// The user plus every group it belongs to, pseudo-groups included.
    async fn principals_for(&self, user: PrincipalId) -> Result<PrincipalSet>;

    /// Whether `user` is an administrator.
    async fn is_admin(&self, user: PrincipalId) -> Result<bool>;

    /// The full [`Caller`] for `user`.
    async fn caller(&self, user: PrincipalId) -> Result<Caller> {
        let principals = self.principals_for(user).await?;
        let mut caller = Caller::new(user, principals);
        caller.is_admin = self.is_admin(user).await?;
        Ok(caller)
    }
}

/// Resolver over a fixed membership table.
#[derive(Debug, Clone, Default)]
pub struct StaticPrincipalResolver {
    groups: HashMap<PrincipalId, BTreeSet<PrincipalId>>,
    admins: HashSet<PrincipalId>,
}

impl StaticPrincipalResolver {
    /// Creates a resolver with no memberships.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `user` to `groups`.
    pub fn with_membership(
        mut self,
        user: PrincipalId,
        groups: impl IntoIterator<Item = PrincipalId>,
    ) -> Self {
        self.groups.entry(user).or_default().extend(groups);
        self
    }

    /// Marks `user` as an administrator.
    pub fn with_admin(mut self, user: PrincipalId) -> Self {
        self.admins.insert(user);
        self
    }
}

#[async_trait]
impl PrincipalResolver for StaticPrincipalResolver {
    async fn principals_for(&self, user: PrincipalId) -> Result<PrincipalSet> {
        let mut principals: PrincipalSet = self
            .groups
            .get(&user)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        principals.insert(user);
        principals.insert(PUBLIC_GROUP);
        if user != ANONYMOUS_USER {
            principals.insert(AUTHENTICATED_USERS_GROUP);
        }
        Ok(principals)
    }

    async fn is_admin(&self, user: PrincipalId) -> Result<bool> {
        Ok(self.admins.contains(&user))
    }
}
