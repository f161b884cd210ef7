//! Error types for the membership datastore.

use jointfab_types::NodeId;

/// Errors returned by [`Datastore`](crate::Datastore) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatastoreError {
    /// No member node with this id.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// No administrator record with this node id.
    #[error("administrator {0} not found")]
    AdminNotFound(NodeId),

    /// No group key set with this id.
    #[error("group key set {0} not found")]
    KeySetNotFound(u16),

    /// The node carries no access entry with this list id.
    #[error("access entry {list_id} not found on node {node_id}")]
    AclEntryNotFound { node_id: NodeId, list_id: u16 },

    #[error("node {0} already exists")]
    NodeExists(NodeId),

    #[error("administrator {0} already exists")]
    AdminExists(NodeId),

    #[error("group key set {0} already exists")]
    KeySetExists(u16),

    #[error("group key set {key_set_id} already attached to node {node_id}")]
    KeySetAttached { node_id: NodeId, key_set_id: u16 },

    /// A bounded table is at capacity. The table is left unchanged.
    #[error("{table} table full ({max} entries)")]
    ResourceExhausted { table: &'static str, max: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A refresh finished with entries the configurator could not push.
    /// Those entries stay pending for the next cycle.
    #[error("{pending} entries still pending after push")]
    PushIncomplete { pending: usize },
}

impl DatastoreError {
    /// `true` for the unknown-id class of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound(_)
                | Self::AdminNotFound(_)
                | Self::KeySetNotFound(_)
                | Self::AclEntryNotFound { .. }
        )
    }

    /// `true` for duplicate-id errors.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::NodeExists(_)
                | Self::AdminExists(_)
                | Self::KeySetExists(_)
                | Self::KeySetAttached { .. }
        )
    }
}
