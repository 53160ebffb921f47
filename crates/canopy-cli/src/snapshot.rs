//! Loading a tree and its ACLs from a JSON snapshot.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": 1, "parent": null, "node_type": "project", "created_by": 7 },
//!     { "id": 2, "parent": 1, "node_type": "folder", "created_by": 7 }
//!   ],
//!   "acls": [
//!     { "resource_id": 2, "entries": [{ "principal_id": 9, "access": ["READ"] }] }
//!   ]
//! }
//! ```
//!
//! Nodes may appear in any order; they are registered parents first. Each
//! listed ACL is applied by an administrator: as an override for an inner
//! node, or as a replacement of the creator ACL for a root.

use canopy_acl::{MemoryStore, MemoryTree, PermissionsManager};
use canopy_core::{
    Acl, CanopyConfig, Caller, Error, NodeId, NodeType, PrincipalId, ResourceAccess, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// Principal the loader acts as.
const LOADER: PrincipalId = PrincipalId::new(0);

/// On-disk snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every node of every tree.
    pub nodes: Vec<SnapshotNode>,
    /// ACLs to install.
    #[serde(default)]
    pub acls: Vec<SnapshotAcl>,
}

/// One node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Node id.
    pub id: NodeId,
    /// Parent, absent for roots.
    #[serde(default)]
    pub parent: Option<NodeId>,
    /// Node type.
    #[serde(default)]
    pub node_type: NodeType,
    /// Creator; receives the root ACL when the node is a root.
    pub created_by: PrincipalId,
}

/// One ACL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotAcl {
    /// Owning node.
    pub resource_id: NodeId,
    /// Grants.
    pub entries: Vec<ResourceAccess>,
}

impl Snapshot {
    /// Reads and parses a snapshot file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Nodes ordered so that every parent precedes its children.
    ///
    /// Fails on unknown parents, duplicate ids and cycles.
    pub fn creation_order(&self) -> Result<Vec<&SnapshotNode>> {
        let mut by_id: HashMap<NodeId, &SnapshotNode> = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if by_id.insert(node.id, node).is_some() {
                return Err(Error::conflict(format!("node {} listed twice", node.id)));
            }
        }

        let mut children: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        let mut queue = VecDeque::new();
        for node in &self.nodes {
            match node.parent {
                None => queue.push_back(node.id),
                Some(parent) if by_id.contains_key(&parent) => {
                    children.entry(parent).or_default().push(node.id);
                }
                Some(parent) => return Err(Error::not_found("parent", parent)),
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            if let Some(node) = by_id.get(&id) {
                order.push(*node);
            }
            if let Some(kids) = children.remove(&id) {
                queue.extend(kids);
            }
        }
        if order.len() != self.nodes.len() {
            return Err(Error::invariant(format!(
                "{} nodes are not reachable from a root",
                self.nodes.len() - order.len()
            )));
        }
        Ok(order)
    }
}

/// A snapshot loaded into memory, ready for queries.
pub struct LoadedSnapshot {
    /// The hierarchy.
    pub tree: Arc<MemoryTree>,
    /// Manager over the in-memory store.
    pub manager: PermissionsManager,
}

impl LoadedSnapshot {
    /// Builds the tree, registers every node, then installs the ACLs.
    pub async fn load(snapshot: &Snapshot, config: CanopyConfig) -> Result<Self> {
        let tree = Arc::new(MemoryTree::new());
        let store = Arc::new(MemoryStore::new());
        let manager = PermissionsManager::new(tree.clone(), store, config)?;

        for node in snapshot.creation_order()? {
            tree.insert(node.id, node.parent, node.node_type.clone())
                .await?;
            manager
                .on_node_created(node.id, node.parent, node.created_by)
                .await?;
        }

        let loader = Caller::admin(LOADER);
        for acl in &snapshot.acls {
            if manager.has_local_acl(acl.resource_id).await? {
                let mut current = manager.get_acl(acl.resource_id).await?;
                current.entries = acl.entries.clone();
                manager.update_acl(&loader, current).await?;
            } else {
                let fresh = Acl::new(acl.resource_id, acl.entries.clone());
                manager.override_inheritance(&loader, fresh).await?;
            }
        }

        tracing::debug!(
            nodes = snapshot.nodes.len(),
            acls = snapshot.acls.len(),
            "snapshot loaded"
        );
        Ok(Self { tree, manager })
    }

    /// Reads `path` and loads it.
    pub async fn from_path(path: &Path, config: CanopyConfig) -> Result<Self> {
        let snapshot = Snapshot::read(path)?;
        Self::load(&snapshot, config).await
    }
}
