//! Snapshot query commands.

use canopy_acl::{EffectiveAcl, InvariantReport};
use canopy_core::{AccessType, CanopyConfig, NodeId, PrincipalId, PrincipalSet, Result};
use std::path::Path;

use crate::snapshot::LoadedSnapshot;

/// Loads a snapshot and verifies every tree in it.
pub async fn check(path: &Path, config: CanopyConfig) -> Result<InvariantReport> {
    let loaded = LoadedSnapshot::from_path(path, config).await?;
    let roots = loaded.tree.roots().await;
    loaded.manager.verify(&roots).await
}

/// Benefactor of `node`.
pub async fn benefactor(path: &Path, config: CanopyConfig, node: NodeId) -> Result<NodeId> {
    let loaded = LoadedSnapshot::from_path(path, config).await?;
    loaded.manager.get_benefactor(node).await
}

/// Whether `principals` hold `access` on `node`.
pub async fn access(
    path: &Path,
    config: CanopyConfig,
    node: NodeId,
    access: AccessType,
    principals: &[PrincipalId],
) -> Result<bool> {
    let loaded = LoadedSnapshot::from_path(path, config).await?;
    let principals: PrincipalSet = principals.iter().copied().collect();
    loaded
        .manager
        .engine()
        .has_access(&principals, node, access)
        .await
}

/// The ACL governing `node`.
pub async fn acl(path: &Path, config: CanopyConfig, node: NodeId) -> Result<EffectiveAcl> {
    let loaded = LoadedSnapshot::from_path(path, config).await?;
    loaded.manager.effective_acl(node).await
}
