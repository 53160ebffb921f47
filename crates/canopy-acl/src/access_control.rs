//! Transactional ACL access keyed by owning resource.

use canopy_core::{Acl, Error, NodeId, Result};
use std::collections::{BTreeMap, HashMap};

use crate::benefactor::BenefactorIndex;
use crate::store::{AclStore, PermissionStore};

/// ACL reads and buffered ACL writes for one unit of work.
///
/// [`get`](Self::get) refuses to hand out an ACL for a resource that
/// inherits: it fails with [`Error::InheritsFrom`] naming where the
/// permissions actually live, so callers can redirect instead of silently
/// receiving someone else's ACL.
pub struct AccessControlStore<'s> {
    store: &'s dyn PermissionStore,
    entries: HashMap<NodeId, Option<Acl>>,
    pending: BTreeMap<NodeId, Option<Acl>>,
}

impl<'s> AccessControlStore<'s> {
    pub(crate) fn new(store: &'s dyn PermissionStore) -> Self {
        Self {
            store,
            entries: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// The ACL stored for `resource`, regardless of benefactor state.
    pub async fn find(&mut self, resource: NodeId) -> Result<Option<Acl>> {
        if let Some(known) = self.entries.get(&resource) {
            return Ok(known.clone());
        }
        let value = self.store.acl(resource).await?;
        self.entries.insert(resource, value.clone());
        Ok(value)
    }

    /// The ACL owned by `resource`.
    ///
    /// - unknown node: `NotFound`
    /// - node inherits: `InheritsFrom { benefactor }`
    /// - node is its own benefactor but has no ACL: `InvariantViolation`
    pub async fn get(
        &mut self,
        resource: NodeId,
        benefactors: &mut BenefactorIndex<'_>,
    ) -> Result<Acl> {
        let benefactor = benefactors
            .try_get(resource)
            .await?
            .ok_or_else(|| Error::not_found("node", resource))?;
        if benefactor != resource {
            return Err(Error::inherits_from(resource, benefactor));
        }
        match self.find(resource).await? {
            Some(acl) => Ok(acl),
            None => {
                tracing::error!(%resource, "node is its own benefactor but owns no ACL");
                Err(Error::invariant(format!(
                    "node {resource} is its own benefactor but owns no ACL"
                )))
            }
        }
    }

    /// Stores a new ACL. Fails with `Conflict` if one already exists.
    pub async fn create(&mut self, acl: Acl) -> Result<()> {
        let resource = acl.resource_id;
        if self.find(resource).await?.is_some() {
            return Err(Error::conflict(format!(
                "resource {resource} already has an ACL"
            )));
        }
        self.write(resource, Some(acl));
        Ok(())
    }

    /// Replaces the entries of an existing ACL.
    ///
    /// `acl.etag` must match the stored etag; otherwise someone else wrote
    /// in between and the update fails with `ConcurrentUpdate`. The stored
    /// creation time is kept and a new etag is issued.
    pub async fn update(&mut self, acl: Acl) -> Result<Acl> {
        let resource = acl.resource_id;
        let current = self
            .find(resource)
            .await?
            .ok_or_else(|| Error::not_found("acl", resource))?;
        if current.etag != acl.etag {
            return Err(Error::ConcurrentUpdate {
                resource: resource.to_string(),
                expected: acl.etag.to_string(),
            });
        }
        let mut updated = acl;
        updated.created_on = current.created_on;
        updated.touch();
        self.write(resource, Some(updated.clone()));
        Ok(updated)
    }

    /// Deletes the ACL of `resource`, returning it. Missing is `NotFound`.
    pub async fn delete(&mut self, resource: NodeId) -> Result<Acl> {
        let current = self
            .find(resource)
            .await?
            .ok_or_else(|| Error::not_found("acl", resource))?;
        self.write(resource, None);
        Ok(current)
    }

    /// Deletes the ACL of `resource` if it has one.
    pub async fn delete_if_present(&mut self, resource: NodeId) -> Result<Option<Acl>> {
        let current = self.find(resource).await?;
        if current.is_some() {
            self.write(resource, None);
        }
        Ok(current)
    }

    /// Number of buffered writes.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn write(&mut self, resource: NodeId, acl: Option<Acl>) {
        self.entries.insert(resource, acl.clone());
        self.pending.insert(resource, acl);
    }

    pub(crate) fn take_pending(&mut self) -> BTreeMap<NodeId, Option<Acl>> {
        std::mem::take(&mut self.pending)
    }
}
