//! Caller policy: administrators, anonymous callers, ACL edits.

use canopy_acl::{AccessPredicate, PrincipalResolver, StaticPrincipalResolver};
use canopy_core::{
    ANONYMOUS_USER, AUTHENTICATED_USERS_GROUP, AccessType, AccessTypeSet, Acl, CanopyConfig,
    Caller, Error, PUBLIC_GROUP, PrincipalId, PrincipalSet, ResourceAccess,
};
use std::collections::HashSet;

use crate::common::{
    GROUP, OWNER, TestHarness, admin, group_member, group_read_acl, n, owner, stranger,
};

async fn project() -> TestHarness {
    let h = TestHarness::new();
    // 1 -> {2 -> {3}, 4}
    h.create_all(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(1))])
        .await;
    h
}

#[tokio::test]
async fn test_admin_bypasses_acl() {
    let h = project().await;
    for access in AccessType::ALL {
        assert!(h.manager.has_access(&admin(), n(3), access).await.unwrap());
    }
    assert!(!h.manager.has_access(&stranger(), n(3), AccessType::Read).await.unwrap());
    assert_eq!(
        h.manager.accessible_predicate(&admin(), AccessType::Delete),
        AccessPredicate::Unrestricted
    );
}

#[tokio::test]
async fn test_denial_carries_reason() {
    let h = project().await;
    let status = h
        .manager
        .check_access(&stranger(), n(2), AccessType::Update)
        .await
        .unwrap();
    assert!(!status.authorized);
    assert!(status.reason.contains("UPDATE"));
    assert!(matches!(status.into_result(), Err(Error::Unauthorized { .. })));
}

#[tokio::test]
async fn test_override_requires_change_permissions() {
    let h = project().await;
    let err = h
        .manager
        .override_inheritance(&stranger(), group_read_acl(2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));
    assert!(!h.manager.has_local_acl(n(2)).await.unwrap());

    h.manager
        .override_inheritance(&owner(), group_read_acl(2))
        .await
        .unwrap();
    assert!(h.manager.has_local_acl(n(2)).await.unwrap());
}

#[tokio::test]
async fn test_restore_requires_change_permissions() {
    let h = project().await;
    h.override_for_group(2).await;
    let err = h
        .manager
        .restore_inheritance(&group_member(40), n(2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));
    assert_eq!(h.benefactor(3).await, n(2));
}

#[tokio::test]
async fn test_override_rejects_invalid_content() {
    let h = project().await;

    // The owner would lock themselves out.
    let lockout = Acl::new(n(2), vec![ResourceAccess::new(GROUP, AccessTypeSet::all())]);
    let err = h
        .manager
        .override_inheritance(&owner(), lockout)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAcl { .. }));

    // The public group may only read.
    let public_write = Acl::new(
        n(2),
        vec![
            ResourceAccess::new(OWNER, AccessTypeSet::all()),
            ResourceAccess::new(PUBLIC_GROUP, [AccessType::Read, AccessType::Delete]),
        ],
    );
    let err = h
        .manager
        .override_inheritance(&owner(), public_write)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAcl { .. }));
    assert!(!h.manager.has_local_acl(n(2)).await.unwrap());
    h.assert_consistent().await;
}

#[tokio::test]
async fn test_anonymous_limited_to_configured_access() {
    let h = project().await;
    let acl = Acl::new(
        n(2),
        vec![
            ResourceAccess::new(OWNER, AccessTypeSet::all()),
            ResourceAccess::new(PUBLIC_GROUP, [AccessType::Read]),
        ],
    );
    h.manager.override_inheritance(&owner(), acl).await.unwrap();

    let anonymous = Caller::anonymous();
    assert!(h.manager.has_access(&anonymous, n(3), AccessType::Read).await.unwrap());
    assert!(!h.manager.has_access(&anonymous, n(4), AccessType::Read).await.unwrap());
    assert!(!h.manager.has_access(&anonymous, n(3), AccessType::Update).await.unwrap());

    let visible = h
        .manager
        .filter_accessible(&anonymous, &[n(1), n(2), n(3), n(4)], AccessType::Read)
        .await
        .unwrap();
    assert_eq!(visible, HashSet::from([n(2), n(3)]));
    assert_eq!(
        h.manager.accessible_predicate(&anonymous, AccessType::Delete),
        AccessPredicate::Denied
    );
}

#[tokio::test]
async fn test_anonymous_capped_by_config() {
    let mut config = CanopyConfig::default();
    config.authorization.anonymous_access = AccessTypeSet::from([AccessType::Read]);
    let h = TestHarness::with_config(config);
    h.create_all(&[(1, None), (2, Some(1))]).await;
    let acl = Acl::new(
        n(2),
        vec![
            ResourceAccess::new(OWNER, AccessTypeSet::all()),
            ResourceAccess::new(ANONYMOUS_USER, [AccessType::Read]),
        ],
    );
    h.manager.override_inheritance(&owner(), acl).await.unwrap();

    let anonymous = Caller::anonymous();
    assert!(h.manager.has_access(&anonymous, n(2), AccessType::Read).await.unwrap());
    let status = h
        .manager
        .check_access(&anonymous, n(2), AccessType::Download)
        .await
        .unwrap();
    assert!(status.reason.contains("anonymous"));
}

#[tokio::test]
async fn test_unknown_node_not_found_for_every_caller() {
    let h = project().await;
    for caller in [admin(), Caller::anonymous(), stranger()] {
        let err = h
            .manager
            .check_access(&caller, n(99), AccessType::Download)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}

#[tokio::test]
async fn test_update_acl_with_etag() {
    let h = project().await;
    let stored = h.override_for_group(2).await;

    let mut edit = stored.clone();
    edit.entries
        .push(ResourceAccess::new(PrincipalId::new(77), [AccessType::Update]));
    let updated = h.manager.update_acl(&owner(), edit.clone()).await.unwrap();
    assert_ne!(updated.etag, stored.etag);
    assert_eq!(updated.created_on, stored.created_on);

    let editor = Caller::new(PrincipalId::new(77), PrincipalSet::new());
    assert!(h.manager.has_access(&editor, n(3), AccessType::Update).await.unwrap());

    // A second writer holding the old etag loses.
    let err = h.manager.update_acl(&owner(), edit).await.unwrap_err();
    assert!(matches!(err, Error::ConcurrentUpdate { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_update_acl_on_inheriting_node_redirects() {
    let h = project().await;
    let mut acl = h.manager.get_acl(n(1)).await.unwrap();
    acl.resource_id = n(3);
    let err = h.manager.update_acl(&owner(), acl).await.unwrap_err();
    assert!(matches!(err, Error::InheritsFrom { .. }));
}

#[tokio::test]
async fn test_update_acl_requires_change_permissions() {
    let h = project().await;
    let acl = h.manager.get_acl(n(1)).await.unwrap();
    let err = h.manager.update_acl(&stranger(), acl).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));
}

#[tokio::test]
async fn test_user_permissions_summary() {
    let h = project().await;
    h.override_for_group(2).await;

    let owner_view = h.manager.user_permissions(&owner(), n(2)).await.unwrap();
    assert!(owner_view.can_change_permissions);
    assert!(owner_view.can_enable_inheritance);
    assert!(owner_view.is_local_acl);
    assert!(!owner_view.can_public_read);

    let member_view = h.manager.user_permissions(&group_member(40), n(3)).await.unwrap();
    assert!(member_view.can_view);
    assert!(!member_view.can_edit);
    assert!(!member_view.can_enable_inheritance);
    assert_eq!(member_view.benefactor, n(2));
    assert!(!member_view.is_local_acl);

    let root_view = h.manager.user_permissions(&admin(), n(1)).await.unwrap();
    assert!(root_view.can_delete);
    assert!(!root_view.can_enable_inheritance);

    let anonymous_view = h.manager.user_permissions(&Caller::anonymous(), n(3)).await.unwrap();
    assert!(!anonymous_view.can_view);
    assert!(!anonymous_view.can_enable_inheritance);
}

#[tokio::test]
async fn test_nonvisible_children() {
    let h = project().await;
    h.override_for_group(2).await;

    let hidden = h
        .manager
        .nonvisible_children(&group_member(40), n(1))
        .await
        .unwrap();
    assert_eq!(hidden, vec![n(4)]);
    assert!(h.manager.nonvisible_children(&admin(), n(1)).await.unwrap().is_empty());
    assert!(h.manager.nonvisible_children(&owner(), n(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_predicate_renders_for_query_layer() {
    let h = project().await;
    let predicate = h.manager.accessible_predicate(&group_member(40), AccessType::Read);
    let sql = predicate.to_sql(&h.manager.config().predicate);
    assert!(sql.starts_with("benefactor_id IN (SELECT resource_id FROM acl_entry"));
    assert!(sql.contains("500"));
}

#[tokio::test]
async fn test_resolved_callers_drive_decisions() {
    let h = project().await;
    let acl = Acl::new(
        n(2),
        vec![
            ResourceAccess::new(OWNER, AccessTypeSet::all()),
            ResourceAccess::new(AUTHENTICATED_USERS_GROUP, [AccessType::Read]),
        ],
    );
    h.manager.override_inheritance(&owner(), acl).await.unwrap();

    let resolver = StaticPrincipalResolver::new()
        .with_membership(PrincipalId::new(40), [GROUP])
        .with_admin(PrincipalId::new(2));

    let member = resolver.caller(PrincipalId::new(40)).await.unwrap();
    assert!(h.manager.has_access(&member, n(3), AccessType::Read).await.unwrap());
    assert!(!h.manager.has_access(&member, n(4), AccessType::Read).await.unwrap());

    let anonymous = resolver.caller(ANONYMOUS_USER).await.unwrap();
    assert!(!h.manager.has_access(&anonymous, n(3), AccessType::Read).await.unwrap());

    let administrator = resolver.caller(PrincipalId::new(2)).await.unwrap();
    assert!(h.manager.has_access(&administrator, n(4), AccessType::Delete).await.unwrap());
}
