//! Records held by the membership datastore.

use jointfab_types::{AccessEntry, FabricIndex, NodeId, VendorId};
use serde::{Deserialize, Serialize};

/// Longest friendly name kept, in bytes. Longer names are truncated.
pub const MAX_FRIENDLY_NAME_LENGTH: usize = 32;

/// Provisioning state of a node or of one of its configuration entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatastoreState {
    /// Never assigned.
    #[default]
    Unknown,
    /// Desired locally, not yet confirmed on the member.
    Pending,
    /// Pushed to the member.
    Committed,
}

/// A group key set reference carried by a member node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeKeySetEntry {
    pub group_key_set_id: u16,
    pub state: DatastoreState,
}

/// An access entry the member node should hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAclEntry {
    /// Datastore-assigned id, unique within the node.
    pub list_id: u16,
    pub entry: AccessEntry,
    pub state: DatastoreState,
}

/// A member of the fabric and the configuration it should carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberNode {
    pub node_id: NodeId,
    pub fabric_index: FabricIndex,
    pub friendly_name: String,
    pub commissioning_state: DatastoreState,
    pub key_sets: Vec<NodeKeySetEntry>,
    pub acl: Vec<NodeAclEntry>,
    /// Endpoints last reported by the member's descriptor.
    pub parts: Vec<u16>,
}

impl MemberNode {
    pub(crate) fn pending(fabric_index: FabricIndex, node_id: NodeId, friendly_name: &str) -> Self {
        Self {
            node_id,
            fabric_index,
            friendly_name: bounded_friendly_name(friendly_name),
            commissioning_state: DatastoreState::Pending,
            key_sets: Vec::new(),
            acl: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Key-set references and access entries still waiting to be pushed.
    pub fn pending_entries(&self) -> usize {
        self.key_sets
            .iter()
            .filter(|k| k.state == DatastoreState::Pending)
            .count()
            + self
                .acl
                .iter()
                .filter(|a| a.state == DatastoreState::Pending)
                .count()
    }
}

/// An administrator known to the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRecord {
    pub node_id: NodeId,
    pub friendly_name: String,
    pub vendor_id: VendorId,
    /// The administrator's intermediate certificate, compact encoding.
    pub icac: Vec<u8>,
}

impl AdminRecord {
    pub fn new(node_id: NodeId, friendly_name: &str, vendor_id: VendorId, icac: Vec<u8>) -> Self {
        Self {
            node_id,
            friendly_name: bounded_friendly_name(friendly_name),
            vendor_id,
            icac,
        }
    }
}

/// Truncates `name` to at most [`MAX_FRIENDLY_NAME_LENGTH`] bytes without
/// splitting a character.
pub(crate) fn bounded_friendly_name(name: &str) -> String {
    if name.len() <= MAX_FRIENDLY_NAME_LENGTH {
        return name.to_string();
    }
    let mut end = MAX_FRIENDLY_NAME_LENGTH;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
