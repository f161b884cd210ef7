//! Pushing desired configuration to member nodes.

use jointfab_types::{AccessEntry, GroupKeySet, NodeId};

/// A push to a member node failed. The entry stays pending.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("push to node {node_id} failed: {reason}")]
pub struct PushError {
    pub node_id: NodeId,
    pub reason: String,
}

/// Delivers configuration to member nodes during a refresh cycle.
pub trait MemberConfigurator: Send {
    /// Reads the endpoint list the member reports. `Ok(None)` leaves the
    /// stored list untouched.
    fn read_parts_list(&mut self, node_id: NodeId) -> Result<Option<Vec<u16>>, PushError> {
        let _ = node_id;
        Ok(None)
    }

    fn push_group_key_set(&mut self, node_id: NodeId, key_set: &GroupKeySet)
        -> Result<(), PushError>;

    fn push_acl_entry(&mut self, node_id: NodeId, entry: &AccessEntry) -> Result<(), PushError>;
}

/// Accepts every push without contacting the member.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConfigurator;

impl MemberConfigurator for NoopConfigurator {
    fn push_group_key_set(
        &mut self,
        node_id: NodeId,
        key_set: &GroupKeySet,
    ) -> Result<(), PushError> {
        tracing::debug!(
            node_id = %node_id,
            key_set_id = key_set.group_key_set_id,
            "group key set marked delivered"
        );
        Ok(())
    }

    fn push_acl_entry(&mut self, node_id: NodeId, entry: &AccessEntry) -> Result<(), PushError> {
        tracing::debug!(
            node_id = %node_id,
            fabric_index = entry.fabric_index.get(),
            subjects = entry.subjects.len(),
            "access entry marked delivered"
        );
        Ok(())
    }
}
