//! Consistency checks over a whole tree.

use canopy_core::{NodeId, NodeType, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::store::{AclStore, BenefactorStore, PermissionStore};
use crate::tree::ResourceTree;

/// A broken benefactor or ACL invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A node in the tree has no benefactor entry.
    MissingEntry {
        /// Offending node.
        node: NodeId,
    },
    /// `benefactor(benefactor(node)) != benefactor(node)`.
    Chained {
        /// Offending node.
        node: NodeId,
        /// Its benefactor.
        benefactor: NodeId,
        /// The benefactor's benefactor, if it has one.
        next: Option<NodeId>,
    },
    /// The node is its own benefactor but owns no ACL.
    MissingAcl {
        /// Offending node.
        node: NodeId,
    },
    /// The node owns an ACL but inherits.
    StrayAcl {
        /// Offending node.
        node: NodeId,
        /// Its benefactor.
        benefactor: NodeId,
    },
    /// An inheriting node does not share its parent's benefactor.
    Inconsistent {
        /// Offending node.
        node: NodeId,
        /// Its benefactor.
        benefactor: NodeId,
        /// The parent's benefactor.
        expected: NodeId,
    },
    /// A root or project points somewhere other than itself.
    RootInherits {
        /// Offending root.
        node: NodeId,
        /// Its benefactor.
        benefactor: NodeId,
    },
}

/// Result of [`verify_invariants`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvariantReport {
    /// Nodes examined.
    pub checked: usize,
    /// Problems found, in traversal order.
    pub violations: Vec<Violation>,
}

impl InvariantReport {
    /// Whether no violation was found.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Walks every tree below `roots` level by level and checks flattening,
/// ACL existence and agreement with the parent's benefactor.
pub async fn verify_invariants(
    tree: &dyn ResourceTree,
    store: &dyn PermissionStore,
    roots: &[NodeId],
) -> Result<InvariantReport> {
    let mut report = InvariantReport::default();
    let mut visited: HashSet<NodeId> = HashSet::new();
    // (node, parent)
    let mut level: Vec<(NodeId, Option<NodeId>)> = roots
        .iter()
        .filter(|root| visited.insert(**root))
        .map(|root| (*root, None))
        .collect();
    let mut known: HashMap<NodeId, NodeId> = HashMap::new();

    while !level.is_empty() {
        let ids: Vec<NodeId> = level.iter().map(|(id, _)| *id).collect();
        let benefactors = store.benefactors(&ids).await?;
        known.extend(benefactors.iter().map(|(k, v)| (*k, *v)));

        let unknown: Vec<NodeId> = benefactors
            .values()
            .copied()
            .filter(|b| !known.contains_key(b))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if !unknown.is_empty() {
            known.extend(store.benefactors(&unknown).await?);
        }
        let acls = store.acls(&ids).await?;

        let mut next = Vec::new();
        for (node, parent) in &level {
            report.checked += 1;
            let owns_for_life =
                parent.is_none() || tree.node_type(*node).await? == NodeType::Project;
            check_node(
                *node,
                *parent,
                owns_for_life,
                &known,
                acls.contains_key(node),
                &mut report,
            );
            for child in tree.children_of(*node).await? {
                if visited.insert(child) {
                    next.push((child, Some(*node)));
                }
            }
        }
        level = next;
    }

    if !report.is_clean() {
        tracing::error!(
            checked = report.checked,
            violations = report.violations.len(),
            "benefactor invariants violated"
        );
    }
    Ok(report)
}

fn check_node(
    node: NodeId,
    parent: Option<NodeId>,
    owns_for_life: bool,
    known: &HashMap<NodeId, NodeId>,
    has_acl: bool,
    report: &mut InvariantReport,
) {
    let Some(benefactor) = known.get(&node).copied() else {
        report.violations.push(Violation::MissingEntry { node });
        return;
    };

    let next = known.get(&benefactor).copied();
    if next != Some(benefactor) {
        report.violations.push(Violation::Chained {
            node,
            benefactor,
            next,
        });
    }

    let overriding = benefactor == node;
    if overriding && !has_acl {
        report.violations.push(Violation::MissingAcl { node });
    }
    if !overriding && has_acl {
        report.violations.push(Violation::StrayAcl { node, benefactor });
    }

    match parent {
        _ if owns_for_life && !overriding => {
            report
                .violations
                .push(Violation::RootInherits { node, benefactor });
        }
        Some(parent) if !overriding => {
            if let Some(expected) = known.get(&parent).copied() {
                if expected != benefactor {
                    report.violations.push(Violation::Inconsistent {
                        node,
                        benefactor,
                        expected,
                    });
                }
            }
        }
        _ => {}
    }
}
