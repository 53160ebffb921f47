//! Invariants checked over fixed trees and random operation sequences.

use canopy_acl::AccessPredicate;
use canopy_core::{AccessType, Acl, Error, PrincipalId, PrincipalSet, ResourceAccess};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::common::{OWNER, TestHarness, admin, n, owner};

#[tokio::test]
async fn test_override_twice_is_conflict() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1))]).await;
    h.override_for_group(2).await;
    let err = h
        .manager
        .override_inheritance(&owner(), crate::common::group_read_acl(2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_restore_twice_is_conflict() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1))]).await;
    h.override_for_group(2).await;
    h.manager.restore_inheritance(&owner(), n(2)).await.unwrap();
    let err = h
        .manager
        .restore_inheritance(&owner(), n(2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
}

#[tokio::test]
async fn test_override_restore_round_trip_at_depth() {
    let h = TestHarness::new();
    // 1 -> 2 -> 3 -> 4 -> 5, with 2 overriding.
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(3)), (5, Some(4))])
        .await;
    h.override_for_group(2).await;

    let before: Vec<_> = [3, 4, 5].iter().map(|id| n(*id)).collect();
    let mut snapshot = Vec::new();
    for id in &before {
        snapshot.push(h.manager.get_benefactor(*id).await.unwrap());
    }

    h.override_for_group(4).await;
    assert_eq!(h.benefactor(5).await, n(4));
    h.manager.restore_inheritance(&admin(), n(4)).await.unwrap();

    for (id, expected) in before.iter().zip(snapshot) {
        assert_eq!(h.manager.get_benefactor(*id).await.unwrap(), expected);
    }
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_propagation_is_bounded_by_nested_overrides() {
    let h = TestHarness::new();
    // 1 -> {2 -> {3 -> {4}, 5 -> {6}}}
    h.create_all(&[
        (1, None),
        (2, Some(1)),
        (3, Some(2)),
        (4, Some(3)),
        (5, Some(2)),
        (6, Some(5)),
    ])
    .await;
    h.override_for_group(3).await;

    let mut events = h.manager.subscribe();
    h.override_for_group(2).await;
    let event = events.recv().await.unwrap();
    assert_eq!(event.node_id, n(2));

    assert_eq!(h.benefactor(3).await, n(3));
    assert_eq!(h.benefactor(4).await, n(3));
    assert_eq!(h.benefactor(5).await, n(2));
    assert_eq!(h.benefactor(6).await, n(2));
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_acl_exists_iff_self_benefactor() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(2))]).await;
    h.override_for_group(2).await;

    for id in 1..=3 {
        let is_own = h.benefactor(id).await == n(id);
        let acl = h.manager.get_acl(n(id)).await;
        assert_eq!(acl.is_ok(), is_own, "node {id}");
        if !is_own {
            assert!(matches!(acl, Err(Error::InheritsFrom { .. })));
        }
    }
}

// ============================================================================
// Random operation sequences against a naive oracle
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Override(usize),
    Restore(usize),
    Move(usize, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..64).prop_map(Op::Override),
        (0usize..64).prop_map(Op::Restore),
        (0usize..64, 0usize..64).prop_map(|(a, b)| Op::Move(a, b)),
    ]
}

/// Who a node's own ACL was written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    /// The root ACL: everything for [`OWNER`].
    Owner,
    /// READ for the node's reader principal.
    Reader,
}

/// Parent links plus the ACL each overriding node owns.
struct Model {
    parents: HashMap<u64, Option<u64>>,
    acls: HashMap<u64, Grant>,
}

impl Model {
    fn governing(&self, node: u64) -> u64 {
        let mut current = node;
        loop {
            if self.acls.contains_key(&current) {
                return current;
            }
            match self.parents.get(&current).copied().flatten() {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    fn is_descendant_or_self(&self, node: u64, ancestor: u64) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parents.get(&id).copied().flatten();
        }
        false
    }
}

fn reader(node: u64) -> PrincipalId {
    PrincipalId::new(1_000 + node)
}

fn reader_acl(node: u64) -> Acl {
    Acl::new(n(node), vec![ResourceAccess::new(reader(node), [AccessType::Read])])
}

async fn run_sequence(parents: Vec<usize>, ops: Vec<Op>) {
    let h = TestHarness::new();
    // Nodes 0 and 1 are roots; node i >= 2 hangs under an earlier node.
    let count = parents.len() as u64 + 2;
    let mut model = Model {
        parents: HashMap::new(),
        acls: HashMap::new(),
    };
    for id in 0..count {
        let parent = if id < 2 {
            None
        } else {
            Some((parents[(id - 2) as usize] as u64) % id)
        };
        h.create(id, parent).await;
        model.parents.insert(id, parent);
        if parent.is_none() {
            model.acls.insert(id, Grant::Owner);
        }
    }

    let ids: Vec<_> = (0..count).map(n).collect();
    for op in ops {
        match op {
            Op::Override(i) => {
                let node = i as u64 % count;
                let result = h.manager.override_inheritance(&admin(), reader_acl(node)).await;
                match result {
                    Ok(_) => {
                        assert!(!model.acls.contains_key(&node), "override {node}");
                        model.acls.insert(node, Grant::Reader);
                    }
                    Err(Error::Conflict { .. }) => assert!(model.acls.contains_key(&node)),
                    Err(other) => unreachable!("override {node}: {other}"),
                }
            }
            Op::Restore(i) => {
                let node = i as u64 % count;
                let result = h.manager.restore_inheritance(&admin(), n(node)).await;
                let is_root = model.parents[&node].is_none();
                match result {
                    Ok(_) => {
                        assert!(model.acls.contains_key(&node) && !is_root);
                        model.acls.remove(&node);
                    }
                    Err(Error::Conflict { .. }) => assert!(!model.acls.contains_key(&node)),
                    Err(Error::CannotRemoveProjectAcl { .. }) => assert!(is_root),
                    Err(other) => unreachable!("restore {node}: {other}"),
                }
            }
            Op::Move(a, b) => {
                let node = a as u64 % count;
                let target = b as u64 % count;
                if model.is_descendant_or_self(target, node) {
                    continue;
                }
                h.move_node(node, target).await;
                model.parents.insert(node, Some(target));
            }
        }

        h.assert_consistent().await;
        for id in 0..count {
            assert_eq!(h.benefactor(id).await, n(model.governing(id)), "benefactor of {id}");
        }

        // Bulk, set-based and single decisions agree with the oracle.
        for holder in 0..count {
            let principals = PrincipalSet::from([reader(holder)]);
            let expected: HashSet<_> = (0..count)
                .filter(|id| {
                    model.governing(*id) == holder && model.acls.get(&holder) == Some(&Grant::Reader)
                })
                .map(n)
                .collect();
            let filtered = h
                .manager
                .engine()
                .filter_accessible(&principals, &ids, AccessType::Read)
                .await
                .unwrap();
            assert_eq!(filtered, expected, "readers of {holder}");

            let predicate = AccessPredicate::Granted {
                principals: principals.clone(),
                access: AccessType::Read,
            };
            let selected = h.manager.engine().select(&predicate, &ids).await.unwrap();
            assert_eq!(selected, expected);
        }
        let owners = PrincipalSet::from([OWNER]);
        for id in &ids {
            let expected = model.acls.get(&model.governing(id.get())) == Some(&Grant::Owner);
            let actual = h
                .manager
                .engine()
                .has_access(&owners, *id, AccessType::Delete)
                .await
                .unwrap();
            assert_eq!(actual, expected, "owner on {id}");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_random_sequences_match_oracle(
        parents in prop::collection::vec(0usize..64, 0..18),
        ops in prop::collection::vec(op_strategy(), 1..16),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run_sequence(parents, ops));
    }
}
