//! Per-fabric access control entries.

use std::collections::BTreeMap;

use jointfab_types::{AccessEntry, AuthMode, CaseAuthTag, FabricIndex, NodeId};
use thiserror::Error;

use crate::session::SubjectDescriptor;

/// Default number of entries each fabric may hold.
pub const DEFAULT_MAX_ENTRIES_PER_FABRIC: usize = 4;

/// Change events kept before the oldest are dropped.
pub const MAX_RETAINED_EVENTS: usize = 64;

const MAX_GROUP_ID: u64 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The entry names a different fabric than the one it is created on.
    #[error("entry fabric {entry} does not match target fabric {target}")]
    FabricMismatch {
        entry: FabricIndex,
        target: FabricIndex,
    },

    /// A subject is not valid for the entry's authentication mode.
    #[error("invalid subject {0} for authentication mode")]
    InvalidSubject(NodeId),

    /// Entries may not use passcode authentication.
    #[error("PASE is not a valid access entry authentication mode")]
    InvalidAuthMode,

    /// The fabric's entry list is full.
    #[error("access control list full ({max} entries per fabric)")]
    TableFull { max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Changed,
    Added,
    Removed,
}

/// A fabric-scoped record of an access list change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlEntryChanged {
    /// Fabric the event is scoped to: the accessing fabric of the subject
    /// that made the change. Events without one are not delivered to any
    /// fabric.
    pub fabric_index: Option<FabricIndex>,
    /// The changing administrator, for CASE subjects.
    pub admin_node_id: Option<NodeId>,
    /// Passcode id of the changing administrator, for PASE subjects.
    pub admin_passcode_id: Option<u16>,
    pub change_type: ChangeType,
    pub latest_value: AccessEntry,
}

/// Access entries for every fabric, plus the change events they produced.
#[derive(Debug)]
pub struct AccessControl {
    entries: BTreeMap<FabricIndex, Vec<AccessEntry>>,
    events: Vec<AccessControlEntryChanged>,
    max_entries_per_fabric: usize,
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES_PER_FABRIC)
    }
}

fn subject_is_valid(auth_mode: AuthMode, subject: NodeId) -> bool {
    match auth_mode {
        AuthMode::Case => {
            subject.is_operational()
                || (subject.is_case_auth_tag() && CaseAuthTag(subject.get() as u32).is_valid())
        }
        AuthMode::Group => subject.get() <= MAX_GROUP_ID && subject.get() != 0,
        AuthMode::Pase => false,
    }
}

impl AccessControl {
    pub fn new(max_entries_per_fabric: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            events: Vec::new(),
            max_entries_per_fabric,
        }
    }

    /// Validates and appends an entry to `fabric_index`'s list, returning
    /// its position.
    pub fn create_entry(
        &mut self,
        subject: &SubjectDescriptor,
        fabric_index: FabricIndex,
        entry: AccessEntry,
    ) -> Result<usize, AccessError> {
        if entry.fabric_index != fabric_index {
            return Err(AccessError::FabricMismatch {
                entry: entry.fabric_index,
                target: fabric_index,
            });
        }
        if entry.auth_mode == AuthMode::Pase {
            return Err(AccessError::InvalidAuthMode);
        }
        if let Some(bad) = entry
            .subjects
            .iter()
            .find(|s| !subject_is_valid(entry.auth_mode, **s))
        {
            return Err(AccessError::InvalidSubject(*bad));
        }

        let list = self.entries.entry(fabric_index).or_default();
        if list.len() >= self.max_entries_per_fabric {
            return Err(AccessError::TableFull {
                max: self.max_entries_per_fabric,
            });
        }
        list.push(entry.clone());
        let position = list.len() - 1;

        let (admin_node_id, admin_passcode_id) = match subject.auth_mode {
            AuthMode::Pase => (None, Some(0)),
            _ => (Some(subject.subject), None),
        };
        if self.events.len() >= MAX_RETAINED_EVENTS {
            self.events.remove(0);
        }
        self.events.push(AccessControlEntryChanged {
            fabric_index: subject.fabric_index,
            admin_node_id,
            admin_passcode_id,
            change_type: ChangeType::Added,
            latest_value: entry,
        });

        tracing::info!(
            fabric_index = fabric_index.get(),
            position,
            accessing_fabric = subject.fabric_index.map(FabricIndex::get),
            "access control entry created"
        );
        Ok(position)
    }

    /// Entries for one fabric, in creation order.
    pub fn entries(&self, fabric_index: FabricIndex) -> &[AccessEntry] {
        self.entries
            .get(&fabric_index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Drops every entry of `fabric_index` along with the change events
    /// that created them. Returns how many entries were removed.
    pub fn remove_fabric(&mut self, fabric_index: FabricIndex) -> usize {
        let removed = self.entries.remove(&fabric_index).map_or(0, |list| list.len());
        self.events
            .retain(|event| event.latest_value.fabric_index != fabric_index);
        if removed > 0 {
            tracing::debug!(fabric_index = fabric_index.get(), removed, "access entries dropped");
        }
        removed
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Change events recorded so far, oldest first.
    pub fn events(&self) -> &[AccessControlEntryChanged] {
        &self.events
    }

    /// Drains the recorded change events.
    pub fn take_events(&mut self) -> Vec<AccessControlEntryChanged> {
        std::mem::take(&mut self.events)
    }
}
