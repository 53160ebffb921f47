//! Authorization decisions.
//!
//! [`AuthorizationEngine`] is a pure function of (principals, governing
//! ACL). Administrator bypass and anonymous restrictions are caller policy
//! and live in [`PermissionsManager`](crate::PermissionsManager).
//!
//! Every read goes through [`PermissionStore::resolve`], so a decision is
//! made against one consistent benefactor/ACL snapshot even while a
//! propagation is being committed.

use canopy_core::config::PredicateConfig;
use canopy_core::{AccessType, Acl, Error, LimitsConfig, NodeId, PrincipalSet, Result};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::store::{AclStore, BenefactorStore, PermissionStore, Resolution};

/// Allow/deny decisions over a [`PermissionStore`].
#[derive(Clone)]
pub struct AuthorizationEngine {
    store: Arc<dyn PermissionStore>,
    limits: LimitsConfig,
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("store", &self.store.name())
            .field("limits", &self.limits)
            .finish()
    }
}

impl AuthorizationEngine {
    /// Creates an engine reading `store`.
    pub fn new(store: Arc<dyn PermissionStore>, limits: LimitsConfig) -> Self {
        Self { store, limits }
    }

    /// Benefactor of `node`.
    pub async fn benefactor(&self, node: NodeId) -> Result<NodeId> {
        self.store
            .benefactor(node)
            .await?
            .ok_or_else(|| Error::not_found("node", node))
    }

    /// The benefactor of `node` and the ACL it owns, read from one snapshot.
    pub async fn governing_acl(&self, node: NodeId) -> Result<(NodeId, Acl)> {
        let mut resolution = self.store.resolve(&[node]).await?;
        let benefactor = resolution
            .benefactors
            .get(&node)
            .copied()
            .ok_or_else(|| Error::not_found("node", node))?;
        check_flattened(&resolution, node, benefactor)?;
        let acl = resolution
            .acls
            .remove(&benefactor)
            .ok_or_else(|| missing_acl(node, benefactor))?;
        Ok((benefactor, acl))
    }

    /// Whether the governing ACL of `node` grants `access` to one of
    /// `principals`.
    ///
    /// Denial is `Ok(false)`. Errors mean the node is unknown or the index
    /// is inconsistent.
    pub async fn has_access(
        &self,
        principals: &PrincipalSet,
        node: NodeId,
        access: AccessType,
    ) -> Result<bool> {
        let (_, acl) = self.governing_acl(node).await?;
        Ok(acl.grants(principals, access))
    }

    /// The subset of `nodes` on which `principals` hold `access`.
    ///
    /// One snapshot read for the whole batch; each distinct governing ACL
    /// is evaluated once no matter how many nodes share it.
    pub async fn filter_accessible(
        &self,
        principals: &PrincipalSet,
        nodes: &[NodeId],
        access: AccessType,
    ) -> Result<HashSet<NodeId>> {
        if nodes.len() > self.limits.max_bulk_nodes {
            return Err(Error::LimitExceeded {
                operation: "bulk authorization",
                limit: self.limits.max_bulk_nodes,
            });
        }
        let resolution = self.store.resolve(nodes).await?;
        let mut decisions: HashMap<NodeId, bool> = HashMap::new();
        let mut accessible = HashSet::new();

        for node in nodes {
            let benefactor = resolution
                .benefactors
                .get(node)
                .copied()
                .ok_or_else(|| Error::not_found("node", node))?;
            let allowed = match decisions.get(&benefactor) {
                Some(allowed) => *allowed,
                None => {
                    check_flattened(&resolution, *node, benefactor)?;
                    let acl = resolution
                        .acls
                        .get(&benefactor)
                        .ok_or_else(|| missing_acl(*node, benefactor))?;
                    let allowed = acl.grants(principals, access);
                    decisions.insert(benefactor, allowed);
                    allowed
                }
            };
            if allowed {
                accessible.insert(*node);
            }
        }
        tracing::debug!(
            requested = nodes.len(),
            accessible = accessible.len(),
            acls = decisions.len(),
            %access,
            "filtered nodes"
        );
        Ok(accessible)
    }

    /// Every benefactor whose ACL grants `access` to one of `principals`.
    pub async fn accessible_benefactors(
        &self,
        principals: &PrincipalSet,
        access: AccessType,
    ) -> Result<HashSet<NodeId>> {
        self.store.benefactors_granting(principals, access).await
    }

    /// Applies `predicate` to `nodes` using only the set-based store query,
    /// answered from one snapshot.
    ///
    /// Unknown nodes are dropped, as a query layer joining on the benefactor
    /// column would drop them.
    pub async fn select(
        &self,
        predicate: &AccessPredicate,
        nodes: &[NodeId],
    ) -> Result<HashSet<NodeId>> {
        if nodes.len() > self.limits.max_bulk_nodes {
            return Err(Error::LimitExceeded {
                operation: "bulk authorization",
                limit: self.limits.max_bulk_nodes,
            });
        }
        match predicate {
            AccessPredicate::Unrestricted => {
                Ok(self.store.benefactors(nodes).await?.into_keys().collect())
            }
            AccessPredicate::Denied => Ok(HashSet::new()),
            AccessPredicate::Granted { principals, access } => {
                self.store.accessible(nodes, principals, *access).await
            }
        }
    }
}

fn check_flattened(resolution: &Resolution, node: NodeId, benefactor: NodeId) -> Result<()> {
    match resolution.benefactors.get(&benefactor) {
        Some(next) if *next == benefactor => Ok(()),
        Some(next) => {
            tracing::error!(node_id = %node, %benefactor, next = %next, "benefactor chain longer than one hop");
            Err(Error::invariant(format!(
                "benefactor of {node} is {benefactor}, whose benefactor is {next}"
            )))
        }
        None => {
            tracing::error!(node_id = %node, %benefactor, "benefactor has no entry");
            Err(Error::invariant(format!(
                "benefactor {benefactor} of {node} has no benefactor entry"
            )))
        }
    }
}

fn missing_acl(node: NodeId, benefactor: NodeId) -> Error {
    tracing::error!(node_id = %node, %benefactor, "benefactor owns no ACL");
    Error::invariant(format!("benefactor {benefactor} of {node} owns no ACL"))
}

// ============================================================================
// AccessPredicate
// ============================================================================

/// Declarative form of an authorization decision for a query layer.
///
/// A row is visible iff its benefactor's ACL grants `access` to one of
/// `principals`: exactly the [`AuthorizationEngine::has_access`] rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPredicate {
    /// Every row matches (administrators).
    Unrestricted,
    /// No row matches.
    Denied,
    /// Rows whose benefactor grants `access` to one of `principals`.
    Granted {
        /// Caller principals.
        principals: PrincipalSet,
        /// Required access type.
        access: AccessType,
    },
}

impl AccessPredicate {
    /// Whether a row governed by `acl` matches.
    pub fn matches(&self, acl: &Acl) -> bool {
        match self {
            AccessPredicate::Unrestricted => true,
            AccessPredicate::Denied => false,
            AccessPredicate::Granted { principals, access } => acl.grants(principals, *access),
        }
    }

    /// Renders the predicate as a SQL boolean expression.
    ///
    /// ```
    /// use canopy_acl::AccessPredicate;
    /// use canopy_core::config::PredicateConfig;
    /// use canopy_core::{AccessType, PrincipalId, PrincipalSet};
    ///
    /// let predicate = AccessPredicate::Granted {
    ///     principals: PrincipalSet::from([PrincipalId::new(7)]),
    ///     access: AccessType::Read,
    /// };
    /// assert_eq!(
    ///     predicate.to_sql(&PredicateConfig::default()),
    ///     "benefactor_id IN (SELECT resource_id FROM acl_entry \
    ///      WHERE principal_id IN (7) AND access_type = 'READ')"
    /// );
    /// ```
    pub fn to_sql(&self, names: &PredicateConfig) -> String {
        match self {
            AccessPredicate::Unrestricted => "TRUE".to_string(),
            AccessPredicate::Denied => "FALSE".to_string(),
            AccessPredicate::Granted { principals, .. } if principals.is_empty() => {
                "FALSE".to_string()
            }
            AccessPredicate::Granted { principals, access } => {
                let mut ids = String::new();
                for (i, principal) in principals.iter().enumerate() {
                    if i > 0 {
                        ids.push_str(", ");
                    }
                    let _ = write!(ids, "{principal}");
                }
                format!(
                    "{} IN (SELECT {} FROM {} WHERE {} IN ({ids}) AND {} = '{}')",
                    names.benefactor_column,
                    names.resource_column,
                    names.acl_table,
                    names.principal_column,
                    names.access_column,
                    access.name(),
                )
            }
        }
    }
}
