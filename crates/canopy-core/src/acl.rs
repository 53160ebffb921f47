//! Access control lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::access::{AccessType, AccessTypeSet};
use crate::ids::{NodeId, PrincipalId};
use crate::principal::PrincipalSet;

/// One grant: a principal and the access types it receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceAccess {
    /// User or group receiving the grant.
    pub principal_id: PrincipalId,
    /// Access types granted.
    pub access: AccessTypeSet,
}

impl ResourceAccess {
    /// Creates a grant.
    pub fn new(principal_id: PrincipalId, access: impl Into<AccessTypeSet>) -> Self {
        Self {
            principal_id,
            access: access.into(),
        }
    }
}

/// The ACL owned by a resource that is its own benefactor.
///
/// `etag` changes on every write and backs optimistic concurrency for
/// updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl<Id = NodeId> {
    /// The resource that owns this ACL.
    pub resource_id: Id,
    /// Grants, at most one per principal.
    pub entries: Vec<ResourceAccess>,
    /// Version tag, regenerated on each write.
    pub etag: Uuid,
    /// When the ACL was first created.
    pub created_on: DateTime<Utc>,
    /// When the ACL was last written.
    pub modified_on: DateTime<Utc>,
}

impl<Id> Acl<Id> {
    /// Creates a fresh ACL for `resource_id`.
    pub fn new(resource_id: Id, entries: Vec<ResourceAccess>) -> Self {
        let now = Utc::now();
        Self {
            resource_id,
            entries,
            etag: Uuid::new_v4(),
            created_on: now,
            modified_on: now,
        }
    }

    /// Creates an ACL granting `creator` every access type.
    ///
    /// This is the ACL a root receives when it is created.
    pub fn grant_all(resource_id: Id, creator: PrincipalId) -> Self {
        Self::new(
            resource_id,
            vec![ResourceAccess::new(creator, AccessTypeSet::all())],
        )
    }

    /// Whether some entry grants `access` to a principal in `principals`.
    ///
    /// This is the whole authorization predicate; everything else only
    /// decides which ACL to ask.
    pub fn grants(&self, principals: &PrincipalSet, access: AccessType) -> bool {
        self.entries
            .iter()
            .any(|e| e.access.contains(access) && principals.contains(e.principal_id))
    }

    /// Principals named by this ACL.
    pub fn principals(&self) -> BTreeSet<PrincipalId> {
        self.entries.iter().map(|e| e.principal_id).collect()
    }

    /// The entry for `principal`, if any.
    pub fn entry_for(&self, principal: PrincipalId) -> Option<&ResourceAccess> {
        self.entries.iter().find(|e| e.principal_id == principal)
    }

    /// Marks the ACL as written now: new etag and modification time.
    pub fn touch(&mut self) {
        self.etag = Uuid::new_v4();
        self.modified_on = Utc::now();
    }
}
