//! Permission change notifications.

use canopy_core::{NodeId, NodeType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of permission change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionChange {
    /// The node now owns an ACL.
    Overridden,
    /// The node's ACL was removed; it inherits again.
    Restored,
    /// Entries of an existing ACL changed.
    AclUpdated,
    /// The node moved and its benefactor changed.
    Moved,
    /// The node and its subtree were removed.
    Deleted,
}

/// Emitted after a permission change has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEvent {
    /// Node the operation targeted.
    pub node_id: NodeId,
    /// Its type.
    pub node_type: NodeType,
    /// What happened.
    pub change: PermissionChange,
    /// Etag of the ACL written, for changes that write one.
    pub etag: Option<Uuid>,
    /// Commit time.
    pub at: DateTime<Utc>,
}

impl PermissionEvent {
    /// Creates an event stamped now.
    pub fn new(node_id: NodeId, node_type: NodeType, change: PermissionChange) -> Self {
        Self {
            node_id,
            node_type,
            change,
            etag: None,
            at: Utc::now(),
        }
    }

    /// Attaches the etag of the ACL written.
    pub fn with_etag(mut self, etag: Uuid) -> Self {
        self.etag = Some(etag);
        self
    }
}
