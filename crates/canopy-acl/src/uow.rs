//! Per-operation transactional context.

use canopy_core::Result;

use crate::access_control::AccessControlStore;
use crate::benefactor::BenefactorIndex;
use crate::store::{ChangeSet, PermissionStore, TransactionProvider};

/// Read-through caches and buffered writes for one mutation.
///
/// Nothing reaches the store until [`commit`](Self::commit). Dropping a
/// unit of work without committing discards every buffered write, which is
/// how a failed propagation rolls back.
pub struct UnitOfWork<'s> {
    /// Benefactor reads and writes.
    pub benefactors: BenefactorIndex<'s>,
    /// ACL reads and writes.
    pub acls: AccessControlStore<'s>,
    store: &'s dyn PermissionStore,
}

impl<'s> UnitOfWork<'s> {
    /// Starts a unit of work against `store`.
    pub fn begin(store: &'s dyn PermissionStore) -> Self {
        Self {
            benefactors: BenefactorIndex::new(store),
            acls: AccessControlStore::new(store),
            store,
        }
    }

    /// Number of buffered writes.
    pub fn pending_len(&self) -> usize {
        self.benefactors.pending_len() + self.acls.pending_len()
    }

    /// Applies all buffered writes atomically and returns the store version.
    ///
    /// An empty unit of work does not touch the store.
    pub async fn commit(mut self) -> Result<u64> {
        let changes = ChangeSet {
            benefactors: self.benefactors.take_pending(),
            acls: self.acls.take_pending(),
        };
        if changes.is_empty() {
            return Ok(self.store.version().await);
        }
        let rows = changes.len();
        let version = self.store.commit(changes).await?;
        tracing::debug!(rows, version, backend = self.store.name(), "committed unit of work");
        Ok(version)
    }
}
