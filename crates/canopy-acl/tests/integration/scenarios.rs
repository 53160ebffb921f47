//! End-to-end inheritance scenarios on a small project tree.

use canopy_acl::{MemoryStore, MemoryTree, MutableResourceTree, PermissionsManager, ResourceTree};
use canopy_core::{AccessType, CanopyConfig, Error, NodeType, PrincipalSet};
use std::sync::Arc;

use crate::common::{OWNER, TestHarness, admin, group_member, n, owner};

#[tokio::test]
async fn test_root_owns_full_acl_for_creator() {
    let h = TestHarness::new();
    let benefactor = h.create(1, None).await;

    assert_eq!(benefactor, n(1));
    let acl = h.manager.get_acl(n(1)).await.unwrap();
    let creator = PrincipalSet::from([OWNER]);
    for access in AccessType::ALL {
        assert!(acl.grants(&creator, access), "creator lacks {access}");
    }
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_child_inherits_root() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1))]).await;

    assert_eq!(h.benefactor(2).await, n(1));
    let caller = owner();
    assert_eq!(
        h.manager.has_access(&caller, n(2), AccessType::Read).await.unwrap(),
        h.manager.has_access(&caller, n(1), AccessType::Read).await.unwrap(),
    );
    assert!(!h.manager.has_local_acl(n(2)).await.unwrap());
}

#[tokio::test]
async fn test_override_grants_group_below_node_only() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1))]).await;
    h.override_for_group(2).await;
    h.create(3, Some(2)).await;

    assert_eq!(h.benefactor(2).await, n(2));
    assert_eq!(h.benefactor(3).await, n(2));
    let member = group_member(40);
    assert!(h.manager.has_access(&member, n(3), AccessType::Read).await.unwrap());
    assert!(!h.manager.has_access(&member, n(3), AccessType::Update).await.unwrap());
    assert!(!h.manager.has_access(&member, n(1), AccessType::Read).await.unwrap());
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_restore_reattaches_subtree() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1))]).await;
    h.override_for_group(2).await;
    h.create(3, Some(2)).await;

    let governing = h
        .manager
        .restore_inheritance(&owner(), n(2))
        .await
        .unwrap();

    assert_eq!(governing.resource_id, n(1));
    assert_eq!(h.benefactor(2).await, n(1));
    assert_eq!(h.benefactor(3).await, n(1));
    let err = h.manager.get_acl(n(2)).await.unwrap_err();
    match err {
        Error::InheritsFrom { benefactor, .. } => assert_eq!(benefactor, "1"),
        other => unreachable!("expected InheritsFrom, got {other}"),
    }
    assert!(!h.manager.has_access(&group_member(40), n(3), AccessType::Read).await.unwrap());
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_reparent_to_other_root() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(2)), (5, Some(4))])
        .await;
    h.override_for_group(4).await;
    h.create(10, None).await;

    let propagation = h.move_node(2, 10).await.unwrap();

    assert_eq!(propagation.previous, n(1));
    assert_eq!(propagation.benefactor, n(10));
    assert_eq!(h.benefactor(2).await, n(10));
    assert_eq!(h.benefactor(3).await, n(10));
    assert_eq!(h.benefactor(4).await, n(4));
    assert_eq!(h.benefactor(5).await, n(4));
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_moving_overriding_node_keeps_acl() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(2)), (10, None)]).await;
    h.override_for_group(2).await;

    assert!(h.move_node(2, 10).await.is_none());
    assert_eq!(h.benefactor(2).await, n(2));
    assert_eq!(h.benefactor(3).await, n(2));

    // Restoring now attaches to the new parent's tree.
    h.manager.restore_inheritance(&owner(), n(2)).await.unwrap();
    assert_eq!(h.benefactor(3).await, n(10));
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_bulk_move() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(1)), (4, Some(3)), (10, None)])
        .await;
    h.override_for_group(3).await;
    h.tree.move_node(n(2), n(10)).await.unwrap();
    h.tree.move_node(n(3), n(10)).await.unwrap();

    let changed = h.manager.on_nodes_moved(&[n(2), n(3)], n(10)).await.unwrap();

    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].node, n(2));
    assert_eq!(h.benefactor(2).await, n(10));
    assert_eq!(h.benefactor(4).await, n(3));
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_restore_on_root_rejected() {
    let h = TestHarness::new();
    h.create(1, None).await;
    let err = h
        .manager
        .restore_inheritance(&owner(), n(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotRemoveProjectAcl { .. }));
    assert!(h.manager.has_local_acl(n(1)).await.unwrap());
}

#[tokio::test]
async fn test_subtree_deletion_clears_state() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(1))]).await;
    h.override_for_group(3).await;

    let removed = h.delete(2).await;

    assert_eq!(removed, vec![n(2), n(3)]);
    for id in [2, 3] {
        let err = h.manager.get_benefactor(n(id)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
    assert_eq!(h.store.acl_count().await, 1);
    assert_eq!(h.benefactor(4).await, n(1));
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_effective_acl_annotates_request() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1))]).await;

    let effective = h.manager.effective_acl(n(2)).await.unwrap();
    assert_eq!(effective.requested, n(2));
    assert_eq!(effective.benefactor, n(1));
    assert!(effective.is_inherited());
    assert_eq!(effective.acl.resource_id, n(1));

    let own = h.manager.effective_acl(n(1)).await.unwrap();
    assert!(!own.is_inherited());
}

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let h = TestHarness::new();
    h.create(1, None).await;
    for result in [
        h.manager.has_access(&owner(), n(77), AccessType::Read).await,
        h.manager.has_access(&admin(), n(77), AccessType::Read).await,
    ] {
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
    let err = h
        .manager
        .filter_accessible(&owner(), &[n(1), n(77)], AccessType::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_nested_project_keeps_its_acl() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1))]).await;
    h.tree
        .insert(n(3), Some(n(2)), NodeType::Project)
        .await
        .unwrap();
    let benefactor = h
        .manager
        .on_node_created(n(3), Some(n(2)), OWNER)
        .await
        .unwrap();
    h.create(4, Some(3)).await;

    assert_eq!(benefactor, n(3));
    assert_eq!(h.benefactor(4).await, n(3));
    let err = h
        .manager
        .restore_inheritance(&admin(), n(3))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotRemoveProjectAcl { .. }));
    let view = h.manager.user_permissions(&admin(), n(3)).await.unwrap();
    assert!(!view.can_enable_inheritance);
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_move_notification_must_match_tree() {
    let h = TestHarness::new();
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(1)), (10, None)])
        .await;

    let err = h.manager.on_node_moved(n(2), n(10)).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    let err = h
        .manager
        .on_nodes_moved(&[n(2), n(3)], n(10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    assert_eq!(h.benefactor(2).await, n(1));
    assert_eq!(h.benefactor(3).await, n(1));
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_failed_move_puts_node_back() {
    let mut config = CanopyConfig::default();
    config.limits.max_propagation_nodes = 2;
    let h = TestHarness::with_config(config);
    // 1 -> 2 -> {3, 4}
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(2)), (10, None)])
        .await;

    let err = h.manager.move_node(n(2), n(10)).await.unwrap_err();
    assert!(matches!(err, Error::LimitExceeded { limit: 2, .. }));
    assert_eq!(h.tree.parent_of(n(2)).await.unwrap(), Some(n(1)));
    assert_eq!(h.benefactor(2).await, n(1));
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_move_needs_mutable_tree() {
    let tree = Arc::new(MemoryTree::new());
    let manager = PermissionsManager::new(
        tree.clone(),
        Arc::new(MemoryStore::new()),
        CanopyConfig::default(),
    )
    .unwrap();
    for (id, parent) in [(1, None), (2, Some(1)), (10, None)] {
        let node_type = if parent.is_none() { NodeType::Project } else { NodeType::Folder };
        tree.insert(n(id), parent.map(n), node_type).await.unwrap();
        manager.on_node_created(n(id), parent.map(n), OWNER).await.unwrap();
    }

    let err = manager.move_node(n(2), n(10)).await.unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    tree.move_node(n(2), n(10)).await.unwrap();
    let propagation = manager.on_node_moved(n(2), n(10)).await.unwrap().unwrap();
    assert_eq!(propagation.benefactor, n(10));
}
