//! Common test utilities and harness for canopy-acl integration tests.

#![allow(dead_code)]

use canopy_acl::{MemoryStore, MemoryTree, PermissionsManager, Propagation};
use canopy_core::{
    AccessType, AccessTypeSet, Acl, CanopyConfig, Caller, NodeId, NodeType, PrincipalId,
    PrincipalSet, ResourceAccess,
};
use std::sync::Arc;

/// Creator of every root in the tests.
pub const OWNER: PrincipalId = PrincipalId::new(1);

/// A group that ACLs grant READ to.
pub const GROUP: PrincipalId = PrincipalId::new(500);

/// Someone with no grants anywhere.
pub const STRANGER: PrincipalId = PrincipalId::new(999);

/// Test harness wiring a memory tree and store to a manager.
pub struct TestHarness {
    /// The hierarchy.
    pub tree: Arc<MemoryTree>,
    /// Permission state.
    pub store: Arc<MemoryStore>,
    /// Manager under test.
    pub manager: PermissionsManager,
}

impl TestHarness {
    /// Creates a harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(CanopyConfig::default())
    }

    /// Creates a harness with a custom configuration.
    pub fn with_config(config: CanopyConfig) -> Self {
        let tree = Arc::new(MemoryTree::new());
        let store = Arc::new(MemoryStore::new());
        let manager =
            PermissionsManager::with_mutable_tree(tree.clone(), store.clone(), config).unwrap();
        Self {
            tree,
            store,
            manager,
        }
    }

    /// Adds a node to the tree and registers it with the manager.
    pub async fn create(&self, id: u64, parent: Option<u64>) -> NodeId {
        let node_type = match parent {
            None => NodeType::Project,
            Some(_) => NodeType::Folder,
        };
        self.tree
            .insert(n(id), parent.map(n), node_type)
            .await
            .unwrap();
        self.manager
            .on_node_created(n(id), parent.map(n), OWNER)
            .await
            .unwrap()
    }

    /// Creates `(id, parent)` pairs in order.
    pub async fn create_all(&self, nodes: &[(u64, Option<u64>)]) {
        for (id, parent) in nodes {
            self.create(*id, *parent).await;
        }
    }

    /// Moves a node through the manager.
    pub async fn move_node(&self, id: u64, new_parent: u64) -> Option<Propagation> {
        self.manager.move_node(n(id), n(new_parent)).await.unwrap()
    }

    /// Removes a subtree from the manager and then from the tree.
    pub async fn delete(&self, id: u64) -> Vec<NodeId> {
        let removed = self.manager.on_subtree_deleted(n(id)).await.unwrap();
        self.tree.remove_subtree(n(id)).await.unwrap();
        removed
    }

    /// Benefactor of `id`.
    pub async fn benefactor(&self, id: u64) -> NodeId {
        self.manager.get_benefactor(n(id)).await.unwrap()
    }

    /// Gives `id` an ACL granting READ to [`GROUP`], as an administrator.
    pub async fn override_for_group(&self, id: u64) -> Acl {
        self.manager
            .override_inheritance(&admin(), group_read_acl(id))
            .await
            .unwrap()
    }

    /// Fails the test if any invariant is broken.
    pub async fn assert_consistent(&self) {
        let roots = self.tree.roots().await;
        let report = self.manager.verify(&roots).await.unwrap();
        assert!(report.is_clean(), "invariants violated: {:?}", report.violations);
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for a node id.
pub fn n(id: u64) -> NodeId {
    NodeId::new(id)
}

/// The creator of the roots.
pub fn owner() -> Caller {
    Caller::new(OWNER, PrincipalSet::new())
}

/// A member of [`GROUP`].
pub fn group_member(user: u64) -> Caller {
    Caller::new(PrincipalId::new(user), PrincipalSet::from([GROUP]))
}

/// Someone with no grants.
pub fn stranger() -> Caller {
    Caller::new(STRANGER, PrincipalSet::new())
}

/// An administrator.
pub fn admin() -> Caller {
    Caller::admin(PrincipalId::new(2))
}

/// ACL for `id`: [`OWNER`] gets everything, [`GROUP`] gets READ.
pub fn group_read_acl(id: u64) -> Acl {
    Acl::new(
        n(id),
        vec![
            ResourceAccess::new(OWNER, AccessTypeSet::all()),
            ResourceAccess::new(GROUP, [AccessType::Read]),
        ],
    )
}
