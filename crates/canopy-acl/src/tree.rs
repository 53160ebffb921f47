//! The resource hierarchy.
//!
//! The engine reads the tree through [`ResourceTree`]. Creating nodes is
//! the surrounding application's job, which then notifies the
//! [`PermissionsManager`](crate::PermissionsManager). Moves go through
//! [`MutableResourceTree`] when the manager owns the edit, or are reported
//! after the fact otherwise.
//!
//! [`MemoryTree`] is the in-memory implementation used by tests and the CLI.

use async_trait::async_trait;
use canopy_core::{Error, NodeId, NodeType, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

/// Read-only view of parent/child edges.
#[async_trait]
pub trait ResourceTree: Send + Sync {
    /// Parent of `id`, or `None` for a root. Unknown ids are `NotFound`.
    async fn parent_of(&self, id: NodeId) -> Result<Option<NodeId>>;

    /// Direct children of `id`.
    async fn children_of(&self, id: NodeId) -> Result<Vec<NodeId>>;

    /// Type of `id`.
    async fn node_type(&self, id: NodeId) -> Result<NodeType>;

    /// Whether `id` has no parent.
    async fn is_root(&self, id: NodeId) -> Result<bool> {
        Ok(self.parent_of(id).await?.is_none())
    }
}

/// A tree the [`PermissionsManager`](crate::PermissionsManager) may
/// re-parent nodes in, so the edge change and the benefactor update happen
/// under the same lock.
#[async_trait]
pub trait MutableResourceTree: ResourceTree {
    /// Re-parents `id` under `new_parent`, returning the previous parent.
    ///
    /// Moving a node under itself or one of its descendants is a `Conflict`.
    async fn move_node(&self, id: NodeId, new_parent: NodeId) -> Result<Option<NodeId>>;
}

/// Walks parent links from `id` up to its root.
///
/// More than `max_depth` hops means a cycle or a pathological tree and is
/// reported as `LimitExceeded`.
pub async fn root_of(tree: &dyn ResourceTree, id: NodeId, max_depth: usize) -> Result<NodeId> {
    let mut current = id;
    for _ in 0..=max_depth {
        match tree.parent_of(current).await? {
            Some(parent) => current = parent,
            None => return Ok(current),
        }
    }
    Err(Error::LimitExceeded {
        operation: "root lookup",
        limit: max_depth,
    })
}

// ============================================================================
// MemoryTree
// ============================================================================

#[derive(Debug, Clone)]
struct TreeEntry {
    parent: Option<NodeId>,
    node_type: NodeType,
    children: BTreeSet<NodeId>,
}

/// In-memory resource tree.
///
/// Children are kept ordered so traversals are deterministic.
#[derive(Debug, Default)]
pub struct MemoryTree {
    nodes: RwLock<HashMap<NodeId, TreeEntry>>,
}

impl MemoryTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node under `parent`, or as a root when `parent` is `None`.
    pub async fn insert(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
        node_type: NodeType,
    ) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&id) {
            return Err(Error::conflict(format!("node {id} already exists")));
        }
        if let Some(parent) = parent {
            let entry = nodes
                .get_mut(&parent)
                .ok_or_else(|| Error::not_found("node", parent))?;
            entry.children.insert(id);
        }
        nodes.insert(
            id,
            TreeEntry {
                parent,
                node_type,
                children: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Removes `id` and everything below it, returning the removed ids.
    pub async fn remove_subtree(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut nodes = self.nodes.write().await;
        let entry = nodes.get(&id).ok_or_else(|| Error::not_found("node", id))?;
        if let Some(parent) = entry.parent {
            if let Some(p) = nodes.get_mut(&parent) {
                p.children.remove(&id);
            }
        }

        let mut removed = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if let Some(entry) = nodes.remove(&current) {
                queue.extend(entry.children);
                removed.push(current);
            }
        }
        Ok(removed)
    }

    /// All nodes below and including `id`, breadth-first.
    pub async fn subtree(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let nodes = self.nodes.read().await;
        if !nodes.contains_key(&id) {
            return Err(Error::not_found("node", id));
        }
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            order.push(current);
            if let Some(entry) = nodes.get(&current) {
                queue.extend(entry.children.iter().copied());
            }
        }
        Ok(order)
    }

    /// Every node without a parent, ascending.
    pub async fn roots(&self) -> Vec<NodeId> {
        let nodes = self.nodes.read().await;
        let mut roots: Vec<NodeId> = nodes
            .iter()
            .filter(|(_, e)| e.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        roots.sort();
        roots
    }

    /// Whether `id` is in the tree.
    pub async fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().await.contains_key(&id)
    }

    /// Number of nodes.
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Whether the tree has no nodes.
    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[async_trait]
impl ResourceTree for MemoryTree {
    async fn parent_of(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.nodes
            .read()
            .await
            .get(&id)
            .map(|e| e.parent)
            .ok_or_else(|| Error::not_found("node", id))
    }

    async fn children_of(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.nodes
            .read()
            .await
            .get(&id)
            .map(|e| e.children.iter().copied().collect())
            .ok_or_else(|| Error::not_found("node", id))
    }

    async fn node_type(&self, id: NodeId) -> Result<NodeType> {
        self.nodes
            .read()
            .await
            .get(&id)
            .map(|e| e.node_type.clone())
            .ok_or_else(|| Error::not_found("node", id))
    }
}

#[async_trait]
impl MutableResourceTree for MemoryTree {
    async fn move_node(&self, id: NodeId, new_parent: NodeId) -> Result<Option<NodeId>> {
        let mut nodes = self.nodes.write().await;
        if !nodes.contains_key(&id) {
            return Err(Error::not_found("node", id));
        }
        if !nodes.contains_key(&new_parent) {
            return Err(Error::not_found("node", new_parent));
        }

        let mut cursor = Some(new_parent);
        while let Some(ancestor) = cursor {
            if ancestor == id {
                return Err(Error::conflict(format!(
                    "cannot move {id} under its own descendant {new_parent}"
                )));
            }
            cursor = nodes.get(&ancestor).and_then(|e| e.parent);
        }

        let old_parent = nodes.get(&id).and_then(|e| e.parent);
        if let Some(old) = old_parent {
            if let Some(entry) = nodes.get_mut(&old) {
                entry.children.remove(&id);
            }
        }
        if let Some(entry) = nodes.get_mut(&new_parent) {
            entry.children.insert(id);
        }
        if let Some(entry) = nodes.get_mut(&id) {
            entry.parent = Some(new_parent);
        }
        Ok(old_parent)
    }
}
