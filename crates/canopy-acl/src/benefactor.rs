//! The benefactor index: node → the node whose ACL governs it.
//!
//! [`BenefactorIndex`] is a read-through cache over a
//! [`PermissionStore`] that also buffers writes. It lives inside a
//! [`UnitOfWork`](crate::UnitOfWork) and is thrown away with it, so no cache
//! outlives the transaction that filled it.

use canopy_core::{Error, NodeId, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::store::{BenefactorStore, PermissionStore};

/// Transactional view of benefactor entries.
pub struct BenefactorIndex<'s> {
    store: &'s dyn PermissionStore,
    /// Known values: committed reads and pending writes. `None` = no entry.
    entries: HashMap<NodeId, Option<NodeId>>,
    pending: BTreeMap<NodeId, Option<NodeId>>,
}

impl<'s> BenefactorIndex<'s> {
    pub(crate) fn new(store: &'s dyn PermissionStore) -> Self {
        Self {
            store,
            entries: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Benefactor of `id`, or `None` when the node has no entry.
    pub async fn try_get(&mut self, id: NodeId) -> Result<Option<NodeId>> {
        if let Some(known) = self.entries.get(&id) {
            return Ok(*known);
        }
        let value = self.store.benefactor(id).await?;
        self.entries.insert(id, value);
        Ok(value)
    }

    /// Benefactor of `id`. A node without an entry is `NotFound`.
    pub async fn get(&mut self, id: NodeId) -> Result<NodeId> {
        self.try_get(id)
            .await?
            .ok_or_else(|| Error::not_found("benefactor entry", id))
    }

    /// Benefactors of many nodes in one store round trip.
    ///
    /// Fails with `NotFound` naming the first id without an entry.
    pub async fn get_many(&mut self, ids: &[NodeId]) -> Result<HashMap<NodeId, NodeId>> {
        let missing: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| !self.entries.contains_key(id))
            .collect();
        if !missing.is_empty() {
            let fetched = self.store.benefactors(&missing).await?;
            for id in missing {
                self.entries.insert(id, fetched.get(&id).copied());
            }
        }

        let mut result = HashMap::with_capacity(ids.len());
        for id in ids {
            match self.entries.get(id).copied().flatten() {
                Some(benefactor) => {
                    result.insert(*id, benefactor);
                }
                None => return Err(Error::not_found("benefactor entry", id)),
            }
        }
        Ok(result)
    }

    /// Points `id` at `benefactor`.
    pub fn set(&mut self, id: NodeId, benefactor: NodeId) {
        self.entries.insert(id, Some(benefactor));
        self.pending.insert(id, Some(benefactor));
    }

    /// Drops the entry for `id`.
    pub fn remove(&mut self, id: NodeId) {
        self.entries.insert(id, None);
        self.pending.insert(id, None);
    }

    /// Every node currently pointing at `benefactor`, itself included.
    ///
    /// Combines the committed reverse index with pending writes.
    pub async fn beneficiaries(&mut self, benefactor: NodeId) -> Result<HashSet<NodeId>> {
        let mut result = self.store.beneficiaries(benefactor).await?;
        for (id, value) in &self.pending {
            if *value == Some(benefactor) {
                result.insert(*id);
            } else {
                result.remove(id);
            }
        }
        Ok(result)
    }

    /// Number of buffered writes.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn take_pending(&mut self) -> BTreeMap<NodeId, Option<NodeId>> {
        std::mem::take(&mut self.pending)
    }
}
