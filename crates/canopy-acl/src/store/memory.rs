//! In-memory permission backend.

use async_trait::async_trait;
use canopy_core::{AccessType, Acl, NodeId, PrincipalSet, ResourceKey, Result};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{AclStore, BenefactorStore, ChangeSet, PermissionStore, Resolution, TransactionProvider};

struct MemoryState<Id: ResourceKey> {
    benefactors: HashMap<Id, Id>,
    beneficiaries: HashMap<Id, HashSet<Id>>,
    acls: HashMap<Id, Acl<Id>>,
    version: u64,
}

impl<Id: ResourceKey> MemoryState<Id> {
    fn set_benefactor(&mut self, id: Id, benefactor: Option<Id>) {
        if let Some(old) = self.benefactors.remove(&id) {
            if let Some(set) = self.beneficiaries.get_mut(&old) {
                set.remove(&id);
                if set.is_empty() {
                    self.beneficiaries.remove(&old);
                }
            }
        }
        if let Some(new) = benefactor {
            self.benefactors.insert(id, new);
            self.beneficiaries.entry(new).or_default().insert(id);
        }
    }
}

/// Reference backend keeping everything behind one lock.
///
/// A commit holds the write lock for its whole change set, so readers see
/// either all of it or none of it. The reverse (beneficiaries) index is
/// maintained alongside the forward map.
pub struct MemoryStore<Id: ResourceKey = NodeId> {
    state: RwLock<MemoryState<Id>>,
}

impl<Id: ResourceKey> Default for MemoryStore<Id> {
    fn default() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                benefactors: HashMap::new(),
                beneficiaries: HashMap::new(),
                acls: HashMap::new(),
                version: 0,
            }),
        }
    }
}

impl<Id: ResourceKey> MemoryStore<Id> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ACLs stored.
    pub async fn acl_count(&self) -> usize {
        self.state.read().await.acls.len()
    }
}

impl<Id: ResourceKey> std::fmt::Debug for MemoryStore<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl<Id: ResourceKey> BenefactorStore<Id> for MemoryStore<Id> {
    async fn benefactor(&self, id: Id) -> Result<Option<Id>> {
        Ok(self.state.read().await.benefactors.get(&id).copied())
    }

    async fn benefactors(&self, ids: &[Id]) -> Result<HashMap<Id, Id>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.benefactors.get(id).map(|b| (*id, *b)))
            .collect())
    }

    async fn beneficiaries(&self, benefactor: Id) -> Result<HashSet<Id>> {
        Ok(self
            .state
            .read()
            .await
            .beneficiaries
            .get(&benefactor)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl<Id: ResourceKey> AclStore<Id> for MemoryStore<Id> {
    async fn acl(&self, id: Id) -> Result<Option<Acl<Id>>> {
        Ok(self.state.read().await.acls.get(&id).cloned())
    }

    async fn acls(&self, ids: &[Id]) -> Result<HashMap<Id, Acl<Id>>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.acls.get(id).map(|acl| (*id, acl.clone())))
            .collect())
    }

    async fn benefactors_granting(
        &self,
        principals: &PrincipalSet,
        access: AccessType,
    ) -> Result<HashSet<Id>> {
        let state = self.state.read().await;
        Ok(state
            .acls
            .iter()
            .filter(|(_, acl)| acl.grants(principals, access))
            .map(|(id, _)| *id)
            .collect())
    }
}

#[async_trait]
impl<Id: ResourceKey> TransactionProvider<Id> for MemoryStore<Id> {
    async fn commit(&self, changes: ChangeSet<Id>) -> Result<u64> {
        let mut state = self.state.write().await;
        for (id, benefactor) in changes.benefactors {
            state.set_benefactor(id, benefactor);
        }
        for (id, acl) in changes.acls {
            match acl {
                Some(acl) => {
                    state.acls.insert(id, acl);
                }
                None => {
                    state.acls.remove(&id);
                }
            }
        }
        state.version += 1;
        Ok(state.version)
    }
}

#[async_trait]
impl<Id: ResourceKey> PermissionStore<Id> for MemoryStore<Id> {
    async fn resolve(&self, ids: &[Id]) -> Result<Resolution<Id>> {
        let state = self.state.read().await;
        let mut resolution = Resolution::default();
        for id in ids {
            let Some(benefactor) = state.benefactors.get(id).copied() else {
                continue;
            };
            resolution.benefactors.insert(*id, benefactor);
            if let Some(next) = state.benefactors.get(&benefactor) {
                resolution.benefactors.insert(benefactor, *next);
            }
            if !resolution.acls.contains_key(&benefactor) {
                if let Some(acl) = state.acls.get(&benefactor) {
                    resolution.acls.insert(benefactor, acl.clone());
                }
            }
        }
        Ok(resolution)
    }

    async fn accessible(
        &self,
        ids: &[Id],
        principals: &PrincipalSet,
        access: AccessType,
    ) -> Result<HashSet<Id>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter(|id| {
                state
                    .benefactors
                    .get(*id)
                    .and_then(|benefactor| state.acls.get(benefactor))
                    .is_some_and(|acl| acl.grants(principals, access))
            })
            .copied()
            .collect())
    }

    async fn version(&self) -> u64 {
        self.state.read().await.version
    }

    fn name(&self) -> &str {
        "memory"
    }
}
