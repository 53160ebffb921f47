//! Storage abstraction for benefactor entries and ACLs.
//!
//! One narrow set of traits serves every resource kind; they are
//! parameterised by the id type and default to [`NodeId`].
//!
//! - [`BenefactorStore`]: node → benefactor, plus the reverse lookup
//! - [`AclStore`]: ACLs keyed by owning resource
//! - [`TransactionProvider`]: atomic application of a [`ChangeSet`]
//! - [`PermissionStore`]: all of the above plus snapshot reads
//!
//! Writes never go straight to a store. They are buffered in a
//! [`UnitOfWork`](crate::UnitOfWork) and committed as one [`ChangeSet`].
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-memory reference backend

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use canopy_core::{AccessType, Acl, NodeId, PrincipalSet, ResourceKey, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Committed benefactor entries.
#[async_trait]
pub trait BenefactorStore<Id: ResourceKey = NodeId>: Send + Sync {
    /// Benefactor of `id`, or `None` if `id` has no entry.
    async fn benefactor(&self, id: Id) -> Result<Option<Id>>;

    /// Benefactors for many ids. Ids without an entry are absent from the map.
    async fn benefactors(&self, ids: &[Id]) -> Result<HashMap<Id, Id>>;

    /// Every id currently pointing at `benefactor`, itself included.
    async fn beneficiaries(&self, benefactor: Id) -> Result<HashSet<Id>>;
}

/// Committed ACLs.
#[async_trait]
pub trait AclStore<Id: ResourceKey = NodeId>: Send + Sync {
    /// The ACL owned by `id`, if any.
    async fn acl(&self, id: Id) -> Result<Option<Acl<Id>>>;

    /// ACLs for many owners. Owners without an ACL are absent from the map.
    async fn acls(&self, ids: &[Id]) -> Result<HashMap<Id, Acl<Id>>>;

    /// Owners whose ACL grants `access` to one of `principals`.
    ///
    /// This is the set-based form of the authorization predicate: a node is
    /// accessible iff its benefactor is in the returned set.
    async fn benefactors_granting(
        &self,
        principals: &PrincipalSet,
        access: AccessType,
    ) -> Result<HashSet<Id>>;
}

/// Applies buffered writes atomically.
#[async_trait]
pub trait TransactionProvider<Id: ResourceKey = NodeId>: Send + Sync {
    /// Applies every write in `changes` or none of them.
    ///
    /// Returns the store version after the commit.
    async fn commit(&self, changes: ChangeSet<Id>) -> Result<u64>;
}

/// A complete permission backend.
#[async_trait]
pub trait PermissionStore<Id: ResourceKey = NodeId>:
    BenefactorStore<Id> + AclStore<Id> + TransactionProvider<Id>
{
    /// Reads, from one point-in-time snapshot, the benefactors of `ids`,
    /// the benefactors of those benefactors, and the ACLs they own.
    ///
    /// Readers never observe a half-applied commit through this call.
    async fn resolve(&self, ids: &[Id]) -> Result<Resolution<Id>>;

    /// The members of `ids` whose benefactor owns an ACL granting `access`
    /// to one of `principals`, joined within one snapshot.
    ///
    /// This is the benefactor column joined against
    /// [`AclStore::benefactors_granting`], as a query layer would run it.
    async fn accessible(
        &self,
        ids: &[Id],
        principals: &PrincipalSet,
        access: AccessType,
    ) -> Result<HashSet<Id>>;

    /// Monotonic commit counter.
    async fn version(&self) -> u64;

    /// Backend name for diagnostics.
    fn name(&self) -> &str;
}

/// Buffered writes produced by a unit of work.
///
/// `None` deletes the entry. Keys are ordered so backends apply writes in a
/// deterministic order.
#[derive(Debug, Clone)]
pub struct ChangeSet<Id: ResourceKey = NodeId> {
    /// Benefactor upserts and removals.
    pub benefactors: BTreeMap<Id, Option<Id>>,
    /// ACL upserts and removals.
    pub acls: BTreeMap<Id, Option<Acl<Id>>>,
}

impl<Id: ResourceKey> Default for ChangeSet<Id> {
    fn default() -> Self {
        Self {
            benefactors: BTreeMap::new(),
            acls: BTreeMap::new(),
        }
    }
}

impl<Id: ResourceKey> ChangeSet<Id> {
    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.benefactors.is_empty() && self.acls.is_empty()
    }

    /// Number of rows written.
    pub fn len(&self) -> usize {
        self.benefactors.len() + self.acls.len()
    }
}

/// Result of [`PermissionStore::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution<Id: ResourceKey = NodeId> {
    /// Benefactor of every requested id that has one, and of every
    /// benefactor found.
    pub benefactors: HashMap<Id, Id>,
    /// ACLs owned by the benefactors found.
    pub acls: HashMap<Id, Acl<Id>>,
}

impl<Id: ResourceKey> Default for Resolution<Id> {
    fn default() -> Self {
        Self {
            benefactors: HashMap::new(),
            acls: HashMap::new(),
        }
    }
}
