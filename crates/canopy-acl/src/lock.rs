//! Serialization of mutations per tree.
//!
//! A mutation locks the root of every tree it touches before reading
//! anything, so two overlapping override/restore/move operations never
//! interleave their propagations. Authorization reads take no lock.

use canopy_core::NodeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Registry of per-root async mutexes.
#[derive(Debug, Default)]
pub struct SubtreeLocks {
    locks: Mutex<HashMap<NodeId, Arc<tokio::sync::Mutex<()>>>>,
}

/// Guards for every locked root. Dropping it releases them.
#[derive(Debug)]
pub struct SubtreeGuard {
    roots: Vec<NodeId>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl SubtreeGuard {
    /// The locked roots, ascending.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }
}

impl SubtreeLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, root: NodeId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(root).or_default().clone()
    }

    /// Locks `roots`, deduplicated and in ascending order so that callers
    /// locking overlapping sets cannot deadlock.
    pub async fn lock(&self, roots: &[NodeId]) -> SubtreeGuard {
        let mut roots = roots.to_vec();
        roots.sort();
        roots.dedup();
        let mut guards = Vec::with_capacity(roots.len());
        for root in &roots {
            guards.push(self.mutex_for(*root).lock_owned().await);
        }
        SubtreeGuard {
            roots,
            _guards: guards,
        }
    }

    /// Number of roots ever locked.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no root was ever locked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
