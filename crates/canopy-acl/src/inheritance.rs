//! Keeping benefactor entries consistent as the tree and its ACLs change.
//!
//! Every node is in one of two states:
//!
//! ```text
//! INHERITING --override--> OVERRIDING
//! OVERRIDING --restore---> INHERITING
//! ```
//!
//! Re-parenting keeps the state and only changes the benefactor of an
//! inheriting node. Whenever a node's benefactor changes, the change is
//! propagated breadth-first to the descendants that pointed at the old
//! value. Traversal never descends below an overriding descendant: its
//! subtree points at it, not at anything above.
//!
//! All writes go into the caller's [`UnitOfWork`]; nothing here commits.

use canopy_core::{Acl, Error, LimitsConfig, NodeId, NodeType, PrincipalId, Result};
use std::collections::HashSet;

use crate::tree::ResourceTree;
use crate::uow::UnitOfWork;

/// Whether a node owns its ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritanceState {
    /// Benefactor is an ancestor; no local ACL.
    Inheriting,
    /// Node is its own benefactor and owns an ACL.
    Overriding,
}

/// What a propagation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propagation {
    /// Node whose benefactor changed.
    pub node: NodeId,
    /// Benefactor value descendants pointed at before.
    pub previous: NodeId,
    /// Benefactor value they point at now.
    pub benefactor: NodeId,
    /// Descendants that were re-pointed, in visiting order.
    pub updated: Vec<NodeId>,
    /// Overriding descendants where traversal stopped.
    pub stopped_at: Vec<NodeId>,
}

impl Propagation {
    fn unchanged(node: NodeId, benefactor: NodeId) -> Self {
        Self {
            node,
            previous: benefactor,
            benefactor,
            updated: Vec::new(),
            stopped_at: Vec::new(),
        }
    }

    /// Nodes the traversal touched, the changed node included.
    pub fn visited(&self) -> usize {
        1 + self.updated.len() + self.stopped_at.len()
    }
}

/// Benefactor maintenance over a [`ResourceTree`].
pub struct InheritanceResolver<'a> {
    tree: &'a dyn ResourceTree,
    limits: &'a LimitsConfig,
}

impl<'a> InheritanceResolver<'a> {
    /// Creates a resolver reading `tree`.
    pub fn new(tree: &'a dyn ResourceTree, limits: &'a LimitsConfig) -> Self {
        Self { tree, limits }
    }

    /// Current state of `node`.
    pub async fn state(&self, uow: &mut UnitOfWork<'_>, node: NodeId) -> Result<InheritanceState> {
        if uow.benefactors.get(node).await? == node {
            Ok(InheritanceState::Overriding)
        } else {
            Ok(InheritanceState::Inheriting)
        }
    }

    /// Registers a new node and returns its benefactor.
    ///
    /// A root or a project becomes its own benefactor with an ACL granting
    /// `creator` everything. Any other node inherits its parent's
    /// benefactor. `node` must already be in the tree.
    pub async fn on_node_created(
        &self,
        uow: &mut UnitOfWork<'_>,
        node: NodeId,
        parent: Option<NodeId>,
        creator: PrincipalId,
    ) -> Result<NodeId> {
        if uow.benefactors.try_get(node).await?.is_some() {
            return Err(Error::conflict(format!(
                "node {node} already has a benefactor entry"
            )));
        }
        let node_type = self.tree.node_type(node).await?;
        let benefactor = match parent {
            Some(parent) if node_type != NodeType::Project => uow.benefactors.get(parent).await?,
            _ => {
                uow.acls.create(Acl::grant_all(node, creator)).await?;
                node
            }
        };
        uow.benefactors.set(node, benefactor);
        tracing::debug!(node_id = %node, %benefactor, "registered node");
        Ok(benefactor)
    }

    /// Gives `acl.resource_id` its own ACL and re-points its inheriting
    /// descendants at it.
    pub async fn override_inheritance(
        &self,
        uow: &mut UnitOfWork<'_>,
        acl: Acl,
    ) -> Result<Propagation> {
        let node = acl.resource_id;
        let previous = uow.benefactors.get(node).await?;
        if previous == node {
            return Err(Error::conflict(format!("resource {node} already has an ACL")));
        }
        uow.acls.create(acl).await?;
        uow.benefactors.set(node, node);
        self.propagate(uow, node, previous, node, self.limits.max_propagation_nodes)
            .await
    }

    /// Removes the ACL of `node` and re-attaches it, and every descendant
    /// that pointed at it, to the parent's benefactor.
    ///
    /// Roots and projects keep their ACL for life.
    pub async fn restore_inheritance(
        &self,
        uow: &mut UnitOfWork<'_>,
        node: NodeId,
    ) -> Result<Propagation> {
        if uow.benefactors.get(node).await? != node {
            return Err(Error::conflict(format!(
                "resource {node} already inherits its permissions"
            )));
        }
        let is_project = self.tree.node_type(node).await? == NodeType::Project;
        let parent = match self.tree.parent_of(node).await? {
            Some(parent) if !is_project => parent,
            _ => {
                return Err(Error::CannotRemoveProjectAcl {
                    resource: node.to_string(),
                });
            }
        };
        let benefactor = uow.benefactors.get(parent).await?;
        if benefactor == node {
            tracing::error!(node_id = %node, %parent, "parent inherits from its own child");
            return Err(Error::invariant(format!(
                "parent {parent} of {node} points back at {node}"
            )));
        }
        uow.acls.delete(node).await?;
        uow.benefactors.set(node, benefactor);
        self.propagate(uow, node, node, benefactor, self.limits.max_propagation_nodes)
            .await
    }

    /// Updates benefactors after `node` moved under `new_parent`.
    ///
    /// An overriding node keeps its benefactor, and so does its subtree.
    /// Returns `None` when nothing changed.
    pub async fn on_reparent(
        &self,
        uow: &mut UnitOfWork<'_>,
        node: NodeId,
        new_parent: NodeId,
    ) -> Result<Option<Propagation>> {
        self.reparent(uow, node, new_parent, self.limits.max_propagation_nodes)
            .await
    }

    async fn reparent(
        &self,
        uow: &mut UnitOfWork<'_>,
        node: NodeId,
        new_parent: NodeId,
        budget: usize,
    ) -> Result<Option<Propagation>> {
        let current = uow.benefactors.get(node).await?;
        if current == node {
            return Ok(None);
        }
        let benefactor = uow.benefactors.get(new_parent).await?;
        if benefactor == current {
            return Ok(None);
        }
        uow.benefactors.set(node, benefactor);
        self.propagate(uow, node, current, benefactor, budget)
            .await
            .map(Some)
    }

    /// [`on_reparent`](Self::on_reparent) for several nodes moved under the
    /// same parent. The nodes must not contain one another.
    ///
    /// The propagation limit applies to the whole batch, not to each node.
    pub async fn on_bulk_reparent(
        &self,
        uow: &mut UnitOfWork<'_>,
        nodes: &[NodeId],
        new_parent: NodeId,
    ) -> Result<Vec<Propagation>> {
        let limit = self.limits.max_propagation_nodes;
        let exceeded = || {
            tracing::warn!(moved = nodes.len(), limit, "bulk re-parent limit reached");
            Error::LimitExceeded {
                operation: "bulk re-parent",
                limit,
            }
        };
        if nodes.len() > limit {
            return Err(exceeded());
        }
        let mut visited = 0;
        let mut changed = Vec::new();
        for node in nodes {
            let budget = limit.saturating_sub(visited);
            if let Some(propagation) = self.reparent(uow, *node, new_parent, budget).await? {
                visited += propagation.visited();
                if visited > limit {
                    return Err(exceeded());
                }
                changed.push(propagation);
            }
        }
        Ok(changed)
    }

    /// Drops the benefactor entries and ACLs of `node` and everything below
    /// it. Must run while the subtree is still in the tree.
    ///
    /// Returns the removed ids, root first.
    pub async fn on_subtree_deleted(
        &self,
        uow: &mut UnitOfWork<'_>,
        node: NodeId,
    ) -> Result<Vec<NodeId>> {
        let members = self.collect_subtree(node, "subtree deletion").await?;
        let benefactors = uow.benefactors.get_many(&members).await?;
        let inside: HashSet<NodeId> = members.iter().copied().collect();

        for id in &members {
            if benefactors.get(id) != Some(id) {
                continue;
            }
            let outside: Vec<NodeId> = uow
                .benefactors
                .beneficiaries(*id)
                .await?
                .into_iter()
                .filter(|b| !inside.contains(b))
                .collect();
            if !outside.is_empty() {
                tracing::error!(node_id = %id, ?outside, "deleted ACL still governs nodes outside the subtree");
                return Err(Error::invariant(format!(
                    "ACL of {id} governs {} node(s) outside the deleted subtree",
                    outside.len()
                )));
            }
        }

        for id in members.iter().rev() {
            uow.benefactors.remove(*id);
            uow.acls.delete_if_present(*id).await?;
        }
        tracing::debug!(node_id = %node, removed = members.len(), "cleared subtree");
        Ok(members)
    }

    /// Breadth-first re-pointing of `node`'s descendants from `previous` to
    /// `benefactor`.
    ///
    /// A child pointing at itself is an overriding node: traversal stops
    /// there. A child pointing anywhere other than `previous` or itself
    /// means the index was already inconsistent. Visiting more than
    /// `budget` nodes fails with the configured limit.
    async fn propagate(
        &self,
        uow: &mut UnitOfWork<'_>,
        node: NodeId,
        previous: NodeId,
        benefactor: NodeId,
        budget: usize,
    ) -> Result<Propagation> {
        if previous == benefactor {
            return Ok(Propagation::unchanged(node, benefactor));
        }
        let limit = self.limits.max_propagation_nodes;
        let mut result = Propagation {
            node,
            previous,
            benefactor,
            updated: Vec::new(),
            stopped_at: Vec::new(),
        };
        let mut visited = HashSet::from([node]);
        let mut frontier = vec![node];

        while !frontier.is_empty() {
            let mut children = Vec::new();
            for parent in &frontier {
                for child in self.tree.children_of(*parent).await? {
                    if visited.insert(child) {
                        children.push(child);
                    }
                }
            }
            if children.is_empty() {
                break;
            }
            if visited.len() > budget {
                tracing::warn!(node_id = %node, limit, "propagation limit reached");
                return Err(Error::LimitExceeded {
                    operation: "propagation",
                    limit,
                });
            }

            let current = uow.benefactors.get_many(&children).await?;
            let mut next = Vec::with_capacity(children.len());
            for child in children {
                let child_benefactor = current
                    .get(&child)
                    .copied()
                    .ok_or_else(|| Error::not_found("benefactor entry", child))?;
                if child_benefactor == child {
                    result.stopped_at.push(child);
                } else if child_benefactor == previous {
                    uow.benefactors.set(child, benefactor);
                    result.updated.push(child);
                    next.push(child);
                } else {
                    tracing::error!(
                        node_id = %child,
                        benefactor = %child_benefactor,
                        expected = %previous,
                        "descendant points at an unrelated benefactor"
                    );
                    return Err(Error::invariant(format!(
                        "descendant {child} of {node} points at {child_benefactor}, expected {previous}"
                    )));
                }
            }
            frontier = next;
        }

        tracing::debug!(
            node_id = %node,
            %previous,
            %benefactor,
            updated = result.updated.len(),
            stopped = result.stopped_at.len(),
            "propagated benefactor change"
        );
        Ok(result)
    }

    async fn collect_subtree(&self, node: NodeId, operation: &'static str) -> Result<Vec<NodeId>> {
        let limit = self.limits.max_propagation_nodes;
        let mut visited = HashSet::from([node]);
        let mut order = vec![node];
        let mut cursor = 0;
        while cursor < order.len() {
            let current = order[cursor];
            cursor += 1;
            for child in self.tree.children_of(current).await? {
                if visited.insert(child) {
                    order.push(child);
                }
            }
            if order.len() > limit {
                return Err(Error::LimitExceeded { operation, limit });
            }
        }
        Ok(order)
    }
}
