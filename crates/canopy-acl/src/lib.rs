//! # canopy-acl
//!
//! Permission inheritance and authorization for a tree of resources.
//!
//! Every node either owns an ACL or inherits one from an ancestor, its
//! *benefactor*. Benefactor pointers are kept flat (one hop at most), so
//! an authorization check is one benefactor lookup plus one ACL lookup,
//! independent of tree depth.
//!
//! # Layers
//!
//! - [`tree`]: view of the hierarchy, plus the moves the manager applies
//! - [`store`]: storage traits and the in-memory backend
//! - [`BenefactorIndex`] / [`AccessControlStore`]: transactional overlays,
//!   grouped into a [`UnitOfWork`]
//! - [`InheritanceResolver`]: override, restore, re-parent and delete
//! - [`AuthorizationEngine`]: single and bulk decisions, query predicates
//! - [`PermissionsManager`]: caller policy, locking and events on top
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use canopy_acl::{MemoryStore, MemoryTree, PermissionsManager};
//! use canopy_core::{AccessType, CanopyConfig, Caller, NodeId, NodeType, PrincipalId, PrincipalSet};
//!
//! # tokio_test::block_on(async {
//! let tree = Arc::new(MemoryTree::new());
//! let manager = PermissionsManager::new(
//!     tree.clone(),
//!     Arc::new(MemoryStore::new()),
//!     CanopyConfig::default(),
//! )?;
//!
//! let owner = PrincipalId::new(1);
//! tree.insert(NodeId::new(10), None, NodeType::Project).await?;
//! manager.on_node_created(NodeId::new(10), None, owner).await?;
//! tree.insert(NodeId::new(11), Some(NodeId::new(10)), NodeType::File).await?;
//! manager.on_node_created(NodeId::new(11), Some(NodeId::new(10)), owner).await?;
//!
//! let caller = Caller::new(owner, PrincipalSet::new());
//! assert!(manager.has_access(&caller, NodeId::new(11), AccessType::Read).await?);
//! assert_eq!(manager.get_benefactor(NodeId::new(11)).await?, NodeId::new(10));
//! # Ok::<(), canopy_core::Error>(())
//! # }).unwrap();
//! ```

pub mod access_control;
pub mod benefactor;
pub mod enforcement;
pub mod events;
pub mod inheritance;
pub mod lock;
pub mod manager;
pub mod policy;
pub mod principal;
pub mod store;
pub mod tree;
pub mod uow;
pub mod verify;

pub use access_control::AccessControlStore;
pub use benefactor::BenefactorIndex;
pub use enforcement::{AccessPredicate, AuthorizationEngine};
pub use events::{PermissionChange, PermissionEvent};
pub use inheritance::{InheritanceResolver, InheritanceState, Propagation};
pub use lock::{SubtreeGuard, SubtreeLocks};
pub use manager::{EffectiveAcl, PermissionsManager, UserPermissions};
pub use policy::{AuthorizationStatus, validate_acl_content};
pub use principal::{PrincipalResolver, StaticPrincipalResolver};
pub use store::{
    AclStore, BenefactorStore, ChangeSet, MemoryStore, PermissionStore, Resolution,
    TransactionProvider,
};
pub use tree::{MemoryTree, MutableResourceTree, ResourceTree, root_of};
pub use uow::UnitOfWork;
pub use verify::{InvariantReport, Violation, verify_invariants};
