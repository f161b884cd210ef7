//! The membership datastore and its refresh cycle.
//!
//! Every table is bounded by the datastore's capacity. Inserts at capacity
//! fail with [`DatastoreError::ResourceExhausted`] and leave the table as
//! it was. Listener fan-out happens after the mutation it reports.

use std::fmt;
use std::sync::Arc;

use jointfab_types::{AccessEntry, FabricIndex, GroupKeySet, NodeId, VendorId, MAX_EPOCH_KEYS};

use crate::configurator::{MemberConfigurator, NoopConfigurator};
use crate::error::DatastoreError;
use crate::listener::{DatastoreListener, Listeners};
use crate::types::{
    bounded_friendly_name, AdminRecord, DatastoreState, MemberNode, NodeAclEntry, NodeKeySetEntry,
};

/// Default bound on each table.
pub const DEFAULT_CAPACITY: usize = 32;

/// Authoritative record of the fabric's members, administrators and
/// group key sets.
pub struct Datastore {
    capacity: usize,
    anchor_node_id: Option<NodeId>,
    anchor_vendor_id: VendorId,
    nodes: Vec<MemberNode>,
    key_sets: Vec<GroupKeySet>,
    admins: Vec<AdminRecord>,
    listeners: Listeners,
    configurator: Box<dyn MemberConfigurator>,
}

impl fmt::Debug for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore")
            .field("capacity", &self.capacity)
            .field("nodes", &self.nodes.len())
            .field("key_sets", &self.key_sets.len())
            .field("admins", &self.admins.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for Datastore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Box::new(NoopConfigurator))
    }
}

/// A stored key set carries 1..=3 epoch keys.
fn check_epoch_keys(key_set: &GroupKeySet) -> Result<(), DatastoreError> {
    match key_set.epoch_keys.len() {
        0 => Err(DatastoreError::InvalidArgument("no epoch keys")),
        n if n > MAX_EPOCH_KEYS => Err(DatastoreError::InvalidArgument("more than 3 epoch keys")),
        _ => Ok(()),
    }
}

impl Datastore {
    pub fn new(capacity: usize, configurator: Box<dyn MemberConfigurator>) -> Self {
        Self {
            capacity,
            anchor_node_id: None,
            anchor_vendor_id: VendorId::NOT_SPECIFIED,
            nodes: Vec::new(),
            key_sets: Vec::new(),
            admins: Vec::new(),
            listeners: Listeners::default(),
            configurator,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ── Anchor ──────────────────────────────────────────────────────

    pub fn set_anchor_node_id(&mut self, node_id: NodeId) {
        self.anchor_node_id = Some(node_id);
    }

    pub fn anchor_node_id(&self) -> Option<NodeId> {
        self.anchor_node_id
    }

    pub fn set_anchor_vendor_id(&mut self, vendor_id: VendorId) {
        self.anchor_vendor_id = vendor_id;
    }

    pub fn anchor_vendor_id(&self) -> VendorId {
        self.anchor_vendor_id
    }

    // ── Listeners ───────────────────────────────────────────────────

    /// Registers a listener. Registering the same handle twice is a no-op.
    pub fn add_listener(&mut self, listener: Arc<dyn DatastoreListener>) {
        self.listeners.add(listener);
    }

    /// Unregisters a listener. Removing an absent handle is a no-op.
    pub fn remove_listener(&mut self, listener: &Arc<dyn DatastoreListener>) {
        self.listeners.remove(listener);
    }

    // ── Member nodes ────────────────────────────────────────────────

    pub fn nodes(&self) -> &[MemberNode] {
        &self.nodes
    }

    pub fn node(&self, node_id: NodeId) -> Option<&MemberNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    fn node_position(&self, node_id: NodeId) -> Result<usize, DatastoreError> {
        self.nodes
            .iter()
            .position(|n| n.node_id == node_id)
            .ok_or(DatastoreError::NodeNotFound(node_id))
    }

    /// Adds a node in the pending state and notifies listeners.
    pub fn add_pending_node(
        &mut self,
        fabric_index: FabricIndex,
        node_id: NodeId,
        friendly_name: &str,
    ) -> Result<(), DatastoreError> {
        if self.nodes.len() >= self.capacity {
            return Err(DatastoreError::ResourceExhausted {
                table: "node",
                max: self.capacity,
            });
        }
        if self.node(node_id).is_some() {
            return Err(DatastoreError::NodeExists(node_id));
        }

        self.nodes
            .push(MemberNode::pending(fabric_index, node_id, friendly_name));
        tracing::info!(
            node_id = %node_id,
            fabric_index = fabric_index.get(),
            "pending node added"
        );
        self.listeners.notify();
        Ok(())
    }

    /// Renames a node and notifies listeners.
    pub fn update_node(&mut self, node_id: NodeId, friendly_name: &str) -> Result<(), DatastoreError> {
        let index = self.node_position(node_id)?;
        self.nodes[index].friendly_name = bounded_friendly_name(friendly_name);
        self.listeners.notify();
        Ok(())
    }

    /// Removes a node and notifies listeners.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<MemberNode, DatastoreError> {
        let index = self.node_position(node_id)?;
        let removed = self.nodes.remove(index);
        tracing::info!(node_id = %node_id, "node removed");
        self.listeners.notify();
        Ok(removed)
    }

    /// Attaches a key set to a node in the pending state. The key set is
    /// created centrally at the next refresh if it does not yet exist.
    pub fn add_key_set_to_node(
        &mut self,
        node_id: NodeId,
        key_set_id: u16,
    ) -> Result<(), DatastoreError> {
        let index = self.node_position(node_id)?;
        let node = &mut self.nodes[index];
        if node.key_sets.iter().any(|k| k.group_key_set_id == key_set_id) {
            return Err(DatastoreError::KeySetAttached { node_id, key_set_id });
        }
        if node.key_sets.len() >= self.capacity {
            return Err(DatastoreError::ResourceExhausted {
                table: "node key set",
                max: self.capacity,
            });
        }
        node.key_sets.push(NodeKeySetEntry {
            group_key_set_id: key_set_id,
            state: DatastoreState::Pending,
        });
        Ok(())
    }

    /// Attaches an access entry to a node in the pending state and returns
    /// its list id.
    pub fn add_acl_to_node(
        &mut self,
        node_id: NodeId,
        entry: AccessEntry,
    ) -> Result<u16, DatastoreError> {
        let index = self.node_position(node_id)?;
        let node = &mut self.nodes[index];
        if entry.fabric_index != node.fabric_index {
            return Err(DatastoreError::InvalidArgument(
                "access entry fabric does not match node fabric",
            ));
        }
        if node.acl.len() >= self.capacity {
            return Err(DatastoreError::ResourceExhausted {
                table: "node access entry",
                max: self.capacity,
            });
        }
        let list_id = node
            .acl
            .iter()
            .map(|a| a.list_id)
            .max()
            .map_or(0, |id| id.saturating_add(1));
        node.acl.push(NodeAclEntry {
            list_id,
            entry,
            state: DatastoreState::Pending,
        });
        Ok(list_id)
    }

    pub fn remove_acl_from_node(
        &mut self,
        node_id: NodeId,
        list_id: u16,
    ) -> Result<AccessEntry, DatastoreError> {
        let index = self.node_position(node_id)?;
        let acl = &mut self.nodes[index].acl;
        let position = acl
            .iter()
            .position(|a| a.list_id == list_id)
            .ok_or(DatastoreError::AclEntryNotFound { node_id, list_id })?;
        Ok(acl.remove(position).entry)
    }

    /// Runs one reconciliation cycle for a node.
    ///
    /// The node goes to pending, its endpoint list is re-read, then every
    /// pending key-set reference and access entry is pushed. Entries whose
    /// push succeeds become committed; the node becomes committed only when
    /// nothing is left pending. Listeners are notified once per cycle.
    pub fn refresh_node(&mut self, node_id: NodeId) -> Result<(), DatastoreError> {
        let index = self.node_position(node_id)?;
        self.nodes[index].commissioning_state = DatastoreState::Pending;

        match self.configurator.read_parts_list(node_id) {
            Ok(Some(parts)) => self.nodes[index].parts = parts,
            Ok(None) => {}
            Err(e) => tracing::warn!(node_id = %node_id, error = %e, "parts list read failed"),
        }

        let pending = self.refresh_group_key_sets(index) + self.refresh_acl_list(index);
        if pending == 0 {
            self.nodes[index].commissioning_state = DatastoreState::Committed;
        }
        tracing::info!(node_id = %node_id, pending, "node refreshed");
        self.listeners.notify();

        if pending == 0 {
            Ok(())
        } else {
            Err(DatastoreError::PushIncomplete { pending })
        }
    }

    /// Pushes the node's pending key-set references. Returns how many are
    /// still pending.
    fn refresh_group_key_sets(&mut self, index: usize) -> usize {
        let node_id = self.nodes[index].node_id;
        let mut left_pending = 0;

        for i in 0..self.nodes[index].key_sets.len() {
            let reference = &self.nodes[index].key_sets[i];
            if reference.state != DatastoreState::Pending {
                continue;
            }
            let key_set_id = reference.group_key_set_id;

            if !self.is_group_key_set_entry_present(key_set_id) {
                if let Err(e) = self.insert_key_set(GroupKeySet::bare(key_set_id)) {
                    tracing::warn!(node_id = %node_id, key_set_id, error = %e, "key set not created");
                    left_pending += 1;
                    continue;
                }
            }
            let Some(key_set) = self.group_key_set(key_set_id).cloned() else {
                left_pending += 1;
                continue;
            };

            match self.configurator.push_group_key_set(node_id, &key_set) {
                Ok(()) => self.nodes[index].key_sets[i].state = DatastoreState::Committed,
                Err(e) => {
                    tracing::warn!(key_set_id, error = %e, "group key set push failed");
                    left_pending += 1;
                }
            }
        }
        left_pending
    }

    /// Pushes the node's pending access entries. Returns how many are still
    /// pending.
    fn refresh_acl_list(&mut self, index: usize) -> usize {
        let node = &mut self.nodes[index];
        let mut left_pending = 0;

        for item in node
            .acl
            .iter_mut()
            .filter(|a| a.state == DatastoreState::Pending)
        {
            match self.configurator.push_acl_entry(node.node_id, &item.entry) {
                Ok(()) => item.state = DatastoreState::Committed,
                Err(e) => {
                    tracing::warn!(list_id = item.list_id, error = %e, "access entry push failed");
                    left_pending += 1;
                }
            }
        }
        left_pending
    }

    // ── Group key sets ──────────────────────────────────────────────

    pub fn group_key_sets(&self) -> &[GroupKeySet] {
        &self.key_sets
    }

    pub fn group_key_set(&self, key_set_id: u16) -> Option<&GroupKeySet> {
        self.key_sets
            .iter()
            .find(|k| k.group_key_set_id == key_set_id)
    }

    pub fn is_group_key_set_entry_present(&self, key_set_id: u16) -> bool {
        self.group_key_set(key_set_id).is_some()
    }

    fn insert_key_set(&mut self, key_set: GroupKeySet) -> Result<(), DatastoreError> {
        if self.key_sets.len() >= self.capacity {
            return Err(DatastoreError::ResourceExhausted {
                table: "group key set",
                max: self.capacity,
            });
        }
        self.key_sets.push(key_set);
        Ok(())
    }

    pub fn add_group_key_set_entry(&mut self, key_set: GroupKeySet) -> Result<(), DatastoreError> {
        check_epoch_keys(&key_set)?;
        if self.is_group_key_set_entry_present(key_set.group_key_set_id) {
            return Err(DatastoreError::KeySetExists(key_set.group_key_set_id));
        }
        let key_set_id = key_set.group_key_set_id;
        self.insert_key_set(key_set)?;
        tracing::info!(key_set_id, "group key set added");
        Ok(())
    }

    pub fn remove_group_key_set_entry(&mut self, key_set_id: u16) -> Result<GroupKeySet, DatastoreError> {
        let position = self
            .key_sets
            .iter()
            .position(|k| k.group_key_set_id == key_set_id)
            .ok_or(DatastoreError::KeySetNotFound(key_set_id))?;
        Ok(self.key_sets.remove(position))
    }

    /// Replaces a key set. When the new value differs from the stored one,
    /// every node referencing it is refreshed; identical updates do nothing
    /// further.
    pub fn update_group_key_set_entry(&mut self, key_set: GroupKeySet) -> Result<(), DatastoreError> {
        check_epoch_keys(&key_set)?;
        let key_set_id = key_set.group_key_set_id;
        let stored = self
            .key_sets
            .iter_mut()
            .find(|k| k.group_key_set_id == key_set_id)
            .ok_or(DatastoreError::KeySetNotFound(key_set_id))?;

        if *stored == key_set {
            tracing::debug!(key_set_id, "group key set unchanged");
            return Ok(());
        }
        *stored = key_set;
        self.refresh_nodes(key_set_id).map(|_| ())
    }

    /// Re-pushes a key set to every node referencing it and returns the
    /// number of references touched. Listeners are notified once when at
    /// least one node was touched.
    pub fn refresh_nodes(&mut self, key_set_id: u16) -> Result<usize, DatastoreError> {
        let key_set = self
            .group_key_set(key_set_id)
            .cloned()
            .ok_or(DatastoreError::KeySetNotFound(key_set_id))?;

        let mut touched = 0;
        let mut left_pending = 0;
        for node in &mut self.nodes {
            let node_id = node.node_id;
            for reference in node
                .key_sets
                .iter_mut()
                .filter(|k| k.group_key_set_id == key_set_id)
            {
                touched += 1;
                reference.state = DatastoreState::Pending;
                match self.configurator.push_group_key_set(node_id, &key_set) {
                    Ok(()) => reference.state = DatastoreState::Committed,
                    Err(e) => {
                        tracing::warn!(key_set_id, error = %e, "group key set push failed");
                        left_pending += 1;
                    }
                }
            }
        }

        if touched > 0 {
            tracing::info!(key_set_id, nodes = touched, pending = left_pending, "nodes refreshed");
            self.listeners.notify();
        }
        if left_pending > 0 {
            return Err(DatastoreError::PushIncomplete {
                pending: left_pending,
            });
        }
        Ok(touched)
    }

    // ── Administrators ──────────────────────────────────────────────

    pub fn admins(&self) -> &[AdminRecord] {
        &self.admins
    }

    pub fn admin(&self, node_id: NodeId) -> Option<&AdminRecord> {
        self.admins.iter().find(|a| a.node_id == node_id)
    }

    pub fn is_admin_entry_present(&self, node_id: NodeId) -> bool {
        self.admin(node_id).is_some()
    }

    pub fn add_admin(&mut self, admin: AdminRecord) -> Result<(), DatastoreError> {
        if self.is_admin_entry_present(admin.node_id) {
            return Err(DatastoreError::AdminExists(admin.node_id));
        }
        if self.admins.len() >= self.capacity {
            return Err(DatastoreError::ResourceExhausted {
                table: "administrator",
                max: self.capacity,
            });
        }
        tracing::info!(node_id = %admin.node_id, vendor_id = %admin.vendor_id, "administrator added");
        self.admins.push(admin);
        Ok(())
    }

    pub fn update_admin(
        &mut self,
        node_id: NodeId,
        friendly_name: &str,
        icac: Vec<u8>,
    ) -> Result<(), DatastoreError> {
        let admin = self
            .admins
            .iter_mut()
            .find(|a| a.node_id == node_id)
            .ok_or(DatastoreError::AdminNotFound(node_id))?;
        admin.friendly_name = bounded_friendly_name(friendly_name);
        admin.icac = icac;
        Ok(())
    }

    pub fn remove_admin(&mut self, node_id: NodeId) -> Result<AdminRecord, DatastoreError> {
        let position = self
            .admins
            .iter()
            .position(|a| a.node_id == node_id)
            .ok_or(DatastoreError::AdminNotFound(node_id))?;
        Ok(self.admins.remove(position))
    }
}
