//! The public face of the permission engine.
//!
//! [`PermissionsManager`] composes the tree, the store, the inheritance
//! resolver and the authorization engine, and adds caller policy:
//! administrator bypass, anonymous restrictions, ACL content validation,
//! per-tree locking and change events.
//!
//! # Mutations
//!
//! Every mutation follows the same shape:
//!
//! 1. lock the root(s) of the affected tree(s), re-checking them once held
//! 2. open a [`UnitOfWork`]
//! 3. check preconditions and authorization
//! 4. run the resolver, which buffers all writes
//! 5. commit, then broadcast a [`PermissionEvent`]
//!
//! Any error before step 5 drops the unit of work and nothing is written.

use canopy_core::{
    AccessType, Acl, CanopyConfig, Caller, Error, NodeId, NodeType, PUBLIC_GROUP, PrincipalId,
    PrincipalSet, Result,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::enforcement::{AccessPredicate, AuthorizationEngine};
use crate::events::{PermissionChange, PermissionEvent};
use crate::inheritance::{InheritanceResolver, Propagation};
use crate::lock::{SubtreeGuard, SubtreeLocks};
use crate::policy::{AuthorizationStatus, validate_acl_content};
use crate::store::{BenefactorStore, PermissionStore};
use crate::tree::{MutableResourceTree, ResourceTree, root_of};
use crate::uow::UnitOfWork;
use crate::verify::{InvariantReport, verify_invariants};

/// The ACL governing a node, annotated with the node that was asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveAcl {
    /// Node the caller asked about.
    pub requested: NodeId,
    /// Node owning the ACL.
    pub benefactor: NodeId,
    /// The governing ACL.
    pub acl: Acl,
}

impl EffectiveAcl {
    /// Whether the ACL belongs to an ancestor rather than the node itself.
    pub fn is_inherited(&self) -> bool {
        self.requested != self.benefactor
    }
}

/// What a caller may do on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPermissions {
    /// READ
    pub can_view: bool,
    /// UPDATE
    pub can_edit: bool,
    /// DELETE
    pub can_delete: bool,
    /// CREATE
    pub can_add_child: bool,
    /// CHANGE_PERMISSIONS
    pub can_change_permissions: bool,
    /// CHANGE_SETTINGS
    pub can_change_settings: bool,
    /// DOWNLOAD
    pub can_download: bool,
    /// UPLOAD
    pub can_upload: bool,
    /// MODERATE
    pub can_moderate: bool,
    /// Whether the governing ACL lets the public group READ.
    pub can_public_read: bool,
    /// Whether the caller may restore inheritance on this node.
    pub can_enable_inheritance: bool,
    /// Node owning the governing ACL.
    pub benefactor: NodeId,
    /// Whether the node owns that ACL itself.
    pub is_local_acl: bool,
    /// The caller.
    pub user_id: PrincipalId,
}

/// Attempts at locking a stable set of roots before giving up.
const LOCK_ATTEMPTS: usize = 8;

/// Orchestrates permission reads and mutations for a resource tree.
pub struct PermissionsManager {
    tree: Arc<dyn ResourceTree>,
    mutable_tree: Option<Arc<dyn MutableResourceTree>>,
    store: Arc<dyn PermissionStore>,
    engine: AuthorizationEngine,
    config: CanopyConfig,
    locks: SubtreeLocks,
    events: broadcast::Sender<PermissionEvent>,
}

impl std::fmt::Debug for PermissionsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionsManager")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PermissionsManager {
    /// Creates a manager. Fails if `config` does not validate.
    pub fn new(
        tree: Arc<dyn ResourceTree>,
        store: Arc<dyn PermissionStore>,
        config: CanopyConfig,
    ) -> Result<Self> {
        config.validate()?;
        let engine = AuthorizationEngine::new(store.clone(), config.limits.clone());
        let (events, _) = broadcast::channel(config.events.channel_capacity);
        Ok(Self {
            tree,
            mutable_tree: None,
            store,
            engine,
            config,
            locks: SubtreeLocks::new(),
            events,
        })
    }

    /// Creates a manager that may also apply moves to `tree` through
    /// [`move_node`](Self::move_node).
    pub fn with_mutable_tree(
        tree: Arc<dyn MutableResourceTree>,
        store: Arc<dyn PermissionStore>,
        config: CanopyConfig,
    ) -> Result<Self> {
        let mut manager = Self::new(tree.clone(), store, config)?;
        manager.mutable_tree = Some(tree);
        Ok(manager)
    }

    /// The engine used for decisions.
    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    /// Active configuration.
    pub fn config(&self) -> &CanopyConfig {
        &self.config
    }

    /// Receives every change committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PermissionEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Benefactor of `node`.
    pub async fn get_benefactor(&self, node: NodeId) -> Result<NodeId> {
        self.engine.benefactor(node).await
    }

    /// Whether `node` owns its ACL.
    pub async fn has_local_acl(&self, node: NodeId) -> Result<bool> {
        Ok(self.get_benefactor(node).await? == node)
    }

    /// The ACL owned by `node`.
    ///
    /// A node that inherits yields [`Error::InheritsFrom`] naming its
    /// benefactor; use [`effective_acl`](Self::effective_acl) to follow the
    /// redirect.
    pub async fn get_acl(&self, node: NodeId) -> Result<Acl> {
        let (benefactor, acl) = self.engine.governing_acl(node).await?;
        if benefactor != node {
            return Err(Error::inherits_from(node, benefactor));
        }
        Ok(acl)
    }

    /// The ACL governing `node`, wherever it lives.
    pub async fn effective_acl(&self, node: NodeId) -> Result<EffectiveAcl> {
        let (benefactor, acl) = self.engine.governing_acl(node).await?;
        Ok(EffectiveAcl {
            requested: node,
            benefactor,
            acl,
        })
    }

    /// Decides whether `caller` holds `access` on `node`.
    pub async fn check_access(
        &self,
        caller: &Caller,
        node: NodeId,
        access: AccessType,
    ) -> Result<AuthorizationStatus> {
        if caller.is_admin {
            self.engine.benefactor(node).await?;
            return Ok(AuthorizationStatus::authorized());
        }
        if self.anonymous_denied(caller, access) {
            self.engine.benefactor(node).await?;
            return Ok(AuthorizationStatus::denied(format!(
                "anonymous callers cannot be granted {access}"
            )));
        }
        if self.engine.has_access(&caller.principals, node, access).await? {
            Ok(AuthorizationStatus::authorized())
        } else {
            Ok(AuthorizationStatus::denied(format!(
                "user {} lacks {access} on {node}",
                caller.user_id
            )))
        }
    }

    /// Boolean form of [`check_access`](Self::check_access).
    pub async fn has_access(&self, caller: &Caller, node: NodeId, access: AccessType) -> Result<bool> {
        Ok(self.check_access(caller, node, access).await?.is_authorized())
    }

    /// The subset of `nodes` on which `caller` holds `access`.
    pub async fn filter_accessible(
        &self,
        caller: &Caller,
        nodes: &[NodeId],
        access: AccessType,
    ) -> Result<HashSet<NodeId>> {
        if caller.is_admin || self.anonymous_denied(caller, access) {
            let limit = self.config.limits.max_bulk_nodes;
            if nodes.len() > limit {
                return Err(Error::LimitExceeded {
                    operation: "bulk authorization",
                    limit,
                });
            }
            let known = self.store.benefactors(nodes).await?;
            if let Some(missing) = nodes.iter().find(|n| !known.contains_key(*n)) {
                return Err(Error::not_found("node", missing));
            }
            if caller.is_admin {
                return Ok(nodes.iter().copied().collect());
            }
            return Ok(HashSet::new());
        }
        self.engine
            .filter_accessible(&caller.principals, nodes, access)
            .await
    }

    /// Predicate a query layer can use to filter rows for `caller`.
    pub fn accessible_predicate(&self, caller: &Caller, access: AccessType) -> AccessPredicate {
        if caller.is_admin {
            AccessPredicate::Unrestricted
        } else if self.anonymous_denied(caller, access) {
            AccessPredicate::Denied
        } else {
            AccessPredicate::Granted {
                principals: caller.principals.clone(),
                access,
            }
        }
    }

    /// Everything `caller` may do on `node`, from one snapshot read.
    pub async fn user_permissions(&self, caller: &Caller, node: NodeId) -> Result<UserPermissions> {
        let (benefactor, acl) = self.engine.governing_acl(node).await?;
        let owns_for_life =
            self.tree.is_root(node).await? || self.tree.node_type(node).await? == NodeType::Project;
        let allowed = |access: AccessType| {
            caller.is_admin
                || (!self.anonymous_denied(caller, access) && acl.grants(&caller.principals, access))
        };

        let can_change_permissions = allowed(AccessType::ChangePermissions);
        let can_enable_inheritance = if caller.is_admin {
            !owns_for_life
        } else if caller.is_anonymous() {
            false
        } else {
            !owns_for_life && can_change_permissions
        };
        Ok(UserPermissions {
            can_view: allowed(AccessType::Read),
            can_edit: allowed(AccessType::Update),
            can_delete: allowed(AccessType::Delete),
            can_add_child: allowed(AccessType::Create),
            can_change_permissions,
            can_change_settings: allowed(AccessType::ChangeSettings),
            can_download: allowed(AccessType::Download),
            can_upload: allowed(AccessType::Upload),
            can_moderate: allowed(AccessType::Moderate),
            can_public_read: acl.grants(&PrincipalSet::from([PUBLIC_GROUP]), AccessType::Read),
            can_enable_inheritance,
            benefactor,
            is_local_acl: benefactor == node,
            user_id: caller.user_id,
        })
    }

    /// Children of `parent` that `caller` cannot READ, in tree order.
    pub async fn nonvisible_children(&self, caller: &Caller, parent: NodeId) -> Result<Vec<NodeId>> {
        if caller.is_admin {
            return Ok(Vec::new());
        }
        let children = self.tree.children_of(parent).await?;
        let visible = self
            .filter_accessible(caller, &children, AccessType::Read)
            .await?;
        Ok(children
            .into_iter()
            .filter(|child| !visible.contains(child))
            .collect())
    }

    /// Checks the benefactor invariants of every tree below `roots`.
    pub async fn verify(&self, roots: &[NodeId]) -> Result<InvariantReport> {
        verify_invariants(self.tree.as_ref(), self.store.as_ref(), roots).await
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Gives `acl.resource_id` its own ACL.
    ///
    /// The caller needs CHANGE_PERMISSIONS on the ACL currently governing
    /// the node. The stored ACL gets a fresh etag and timestamps.
    pub async fn override_inheritance(&self, caller: &Caller, acl: Acl) -> Result<Acl> {
        let node = acl.resource_id;
        let _guard = self.lock_tree_of(node).await?;
        let node_type = self.tree.node_type(node).await?;
        let mut uow = UnitOfWork::begin(self.store.as_ref());

        if uow.benefactors.get(node).await? == node {
            tracing::warn!(node_id = %node, "override rejected: node already owns an ACL");
            return Err(Error::conflict(format!("resource {node} already has an ACL")));
        }
        self.authorize(caller, node, AccessType::ChangePermissions)
            .await?;
        validate_acl_content(&acl, caller, &self.config.authorization)?;

        let acl = Acl::new(node, acl.entries);
        let propagation = self
            .resolver()
            .override_inheritance(&mut uow, acl.clone())
            .await?;
        let version = uow.commit().await?;

        tracing::info!(
            node_id = %node,
            previous = %propagation.previous,
            updated = propagation.updated.len(),
            version,
            "inheritance overridden"
        );
        self.emit(PermissionEvent::new(node, node_type, PermissionChange::Overridden).with_etag(acl.etag));
        Ok(acl)
    }

    /// Removes the ACL of `node` so it inherits from its parent again.
    ///
    /// Returns the ACL that governs the node afterwards.
    pub async fn restore_inheritance(&self, caller: &Caller, node: NodeId) -> Result<Acl> {
        let _guard = self.lock_tree_of(node).await?;
        let node_type = self.tree.node_type(node).await?;
        self.authorize(caller, node, AccessType::ChangePermissions)
            .await?;

        let mut uow = UnitOfWork::begin(self.store.as_ref());
        let propagation = self.resolver().restore_inheritance(&mut uow, node).await?;
        let governing = uow
            .acls
            .find(propagation.benefactor)
            .await?
            .ok_or_else(|| {
                tracing::error!(node_id = %node, benefactor = %propagation.benefactor, "restored onto a benefactor without ACL");
                Error::invariant(format!(
                    "benefactor {} of {node} owns no ACL",
                    propagation.benefactor
                ))
            })?;
        let version = uow.commit().await?;

        tracing::info!(
            node_id = %node,
            benefactor = %propagation.benefactor,
            updated = propagation.updated.len(),
            version,
            "inheritance restored"
        );
        self.emit(PermissionEvent::new(node, node_type, PermissionChange::Restored));
        Ok(governing)
    }

    /// Replaces the entries of the ACL `acl.resource_id` owns.
    ///
    /// `acl.etag` must be the etag last read; a stale one fails with
    /// [`Error::ConcurrentUpdate`].
    pub async fn update_acl(&self, caller: &Caller, acl: Acl) -> Result<Acl> {
        let node = acl.resource_id;
        let _guard = self.lock_tree_of(node).await?;
        let node_type = self.tree.node_type(node).await?;
        let mut uow = UnitOfWork::begin(self.store.as_ref());

        uow.acls.get(node, &mut uow.benefactors).await?;
        self.authorize(caller, node, AccessType::ChangePermissions)
            .await?;
        validate_acl_content(&acl, caller, &self.config.authorization)?;
        let updated = uow.acls.update(acl).await?;
        let version = uow.commit().await?;

        tracing::info!(node_id = %node, etag = %updated.etag, version, "ACL updated");
        self.emit(
            PermissionEvent::new(node, node_type, PermissionChange::AclUpdated)
                .with_etag(updated.etag),
        );
        Ok(updated)
    }

    /// Registers a node the application just created and returns its
    /// benefactor. A root or a project gets an ACL granting `creator`
    /// everything.
    pub async fn on_node_created(
        &self,
        node: NodeId,
        parent: Option<NodeId>,
        creator: PrincipalId,
    ) -> Result<NodeId> {
        let root = match parent {
            Some(parent) => root_of(self.tree.as_ref(), parent, self.config.limits.max_tree_depth).await?,
            None => node,
        };
        let _guard = self.locks.lock(&[root]).await;
        let mut uow = UnitOfWork::begin(self.store.as_ref());
        let benefactor = self
            .resolver()
            .on_node_created(&mut uow, node, parent, creator)
            .await?;
        uow.commit().await?;
        Ok(benefactor)
    }

    /// Moves `node` under `new_parent` in the tree and updates benefactors,
    /// holding the locks of both trees across the edit.
    ///
    /// Needs a manager built with
    /// [`with_mutable_tree`](Self::with_mutable_tree). If the benefactor
    /// update fails, the node is moved back.
    pub async fn move_node(&self, node: NodeId, new_parent: NodeId) -> Result<Option<Propagation>> {
        let tree = self
            .mutable_tree
            .as_ref()
            .ok_or_else(|| Error::config("move_node needs a manager over a mutable tree"))?;
        let _guard = self.lock_trees(&[node, new_parent]).await?;
        let previous_parent = tree.move_node(node, new_parent).await?;

        let result = self.apply_reparent(node, new_parent).await;
        if result.is_err() {
            // A former root has no parent to return to.
            if let Some(previous) = previous_parent {
                if let Err(undo) = tree.move_node(node, previous).await {
                    tracing::error!(node_id = %node, %previous, error = %undo, "could not undo tree move");
                }
            }
        }
        result
    }

    /// Updates benefactors after the application moved `node` under
    /// `new_parent`. Call after the tree reflects the move.
    ///
    /// Overrides of the destination racing the tree edit are not excluded
    /// here; prefer [`move_node`](Self::move_node) when the manager can
    /// apply the edit itself.
    pub async fn on_node_moved(&self, node: NodeId, new_parent: NodeId) -> Result<Option<Propagation>> {
        let _guard = self.lock_trees(&[node]).await?;
        self.apply_reparent(node, new_parent).await
    }

    async fn apply_reparent(&self, node: NodeId, new_parent: NodeId) -> Result<Option<Propagation>> {
        self.ensure_parent(node, new_parent).await?;
        let node_type = self.tree.node_type(node).await?;
        let mut uow = UnitOfWork::begin(self.store.as_ref());
        let propagation = self
            .resolver()
            .on_reparent(&mut uow, node, new_parent)
            .await?;
        let version = uow.commit().await?;

        if let Some(propagation) = &propagation {
            tracing::info!(
                node_id = %node,
                benefactor = %propagation.benefactor,
                updated = propagation.updated.len(),
                version,
                "benefactor changed by move"
            );
            self.emit(PermissionEvent::new(node, node_type, PermissionChange::Moved));
        }
        Ok(propagation)
    }

    /// [`on_node_moved`](Self::on_node_moved) for several nodes moved under
    /// the same parent in one transaction.
    pub async fn on_nodes_moved(&self, nodes: &[NodeId], new_parent: NodeId) -> Result<Vec<Propagation>> {
        let _guard = self.lock_trees(nodes).await?;
        for node in nodes {
            self.ensure_parent(*node, new_parent).await?;
        }
        let mut uow = UnitOfWork::begin(self.store.as_ref());
        let changed = self
            .resolver()
            .on_bulk_reparent(&mut uow, nodes, new_parent)
            .await?;
        let mut types = Vec::with_capacity(changed.len());
        for propagation in &changed {
            types.push(self.tree.node_type(propagation.node).await?);
        }
        let version = uow.commit().await?;

        tracing::info!(moved = nodes.len(), changed = changed.len(), version, "bulk move applied");
        for (propagation, node_type) in changed.iter().zip(types) {
            self.emit(PermissionEvent::new(
                propagation.node,
                node_type,
                PermissionChange::Moved,
            ));
        }
        Ok(changed)
    }

    /// Drops permission state for `node` and its subtree. Call before the
    /// application removes the subtree from the tree.
    pub async fn on_subtree_deleted(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let _guard = self.lock_tree_of(node).await?;
        let node_type = self.tree.node_type(node).await?;
        let mut uow = UnitOfWork::begin(self.store.as_ref());
        let removed = self.resolver().on_subtree_deleted(&mut uow, node).await?;
        let version = uow.commit().await?;

        tracing::info!(node_id = %node, removed = removed.len(), version, "subtree permissions removed");
        self.emit(PermissionEvent::new(node, node_type, PermissionChange::Deleted));
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn resolver(&self) -> InheritanceResolver<'_> {
        InheritanceResolver::new(self.tree.as_ref(), &self.config.limits)
    }

    fn anonymous_denied(&self, caller: &Caller, access: AccessType) -> bool {
        caller.is_anonymous() && !self.config.authorization.anonymous_access.contains(access)
    }

    async fn authorize(&self, caller: &Caller, node: NodeId, access: AccessType) -> Result<()> {
        let status = self.check_access(caller, node, access).await?;
        if !status.is_authorized() {
            tracing::warn!(node_id = %node, user_id = %caller.user_id, %access, reason = %status.reason, "mutation refused");
        }
        status.into_result()
    }

    async fn lock_tree_of(&self, node: NodeId) -> Result<SubtreeGuard> {
        self.lock_trees(&[node]).await
    }

    /// Locks the trees `nodes` live in and the trees their current
    /// benefactors live in.
    ///
    /// A move may re-root a node between reading its root and acquiring the
    /// lock, so the roots are read again once held and the locking retried
    /// if they changed.
    async fn lock_trees(&self, nodes: &[NodeId]) -> Result<SubtreeGuard> {
        for _ in 0..LOCK_ATTEMPTS {
            let roots = self.roots_of(nodes).await?;
            let guard = self.locks.lock(&roots).await;
            if self.roots_of(nodes).await? == guard.roots() {
                return Ok(guard);
            }
            tracing::debug!(?roots, "trees changed while locking, retrying");
        }
        tracing::warn!(?nodes, attempts = LOCK_ATTEMPTS, "could not lock a stable set of trees");
        Err(Error::conflict(format!(
            "trees of {nodes:?} kept changing while locking"
        )))
    }

    /// Sorted, deduplicated roots of `nodes` and of their benefactors.
    async fn roots_of(&self, nodes: &[NodeId]) -> Result<Vec<NodeId>> {
        let depth = self.config.limits.max_tree_depth;
        let benefactors = self.store.benefactors(nodes).await?;
        let mut roots = Vec::with_capacity(nodes.len() * 2);
        for node in nodes {
            roots.push(root_of(self.tree.as_ref(), *node, depth).await?);
            if let Some(benefactor) = benefactors.get(node) {
                roots.push(root_of(self.tree.as_ref(), *benefactor, depth).await?);
            }
        }
        roots.sort();
        roots.dedup();
        Ok(roots)
    }

    /// Rejects a move notification that disagrees with the tree.
    async fn ensure_parent(&self, node: NodeId, new_parent: NodeId) -> Result<()> {
        let actual = self.tree.parent_of(node).await?;
        if actual != Some(new_parent) {
            tracing::warn!(node_id = %node, %new_parent, ?actual, "move does not match the tree");
            return Err(Error::conflict(format!(
                "{node} is not a child of {new_parent} in the tree"
            )));
        }
        Ok(())
    }

    fn emit(&self, event: PermissionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
