use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use jointfab_datastore::{
    AdminRecord, Datastore, DatastoreError, DatastoreListener, DatastoreState, MemberConfigurator,
    PushError,
};
use jointfab_types::{
    AccessEntry, EpochKey, FabricIndex, GroupKeySecurityPolicy, GroupKeySet, NodeId, VendorId,
};

#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
}

impl CountingListener {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DatastoreListener for CountingListener {
    fn mark_node_list_changed(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records pushes and fails them while `failing` is set.
#[derive(Clone, Default)]
struct RecordingConfigurator {
    failing: Arc<AtomicBool>,
    pushes: Arc<Mutex<Vec<(NodeId, String)>>>,
}

impl RecordingConfigurator {
    fn push(&self, node_id: NodeId, what: String) -> Result<(), PushError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PushError {
                node_id,
                reason: "unreachable".into(),
            });
        }
        self.pushes.lock().expect("lock").push((node_id, what));
        Ok(())
    }

    fn push_count(&self) -> usize {
        self.pushes.lock().expect("lock").len()
    }
}

impl MemberConfigurator for RecordingConfigurator {
    fn read_parts_list(&mut self, _node_id: NodeId) -> Result<Option<Vec<u16>>, PushError> {
        Ok(Some(vec![0, 1]))
    }

    fn push_group_key_set(&mut self, node_id: NodeId, key_set: &GroupKeySet) -> Result<(), PushError> {
        self.push(node_id, format!("keyset:{}", key_set.group_key_set_id))
    }

    fn push_acl_entry(&mut self, node_id: NodeId, entry: &AccessEntry) -> Result<(), PushError> {
        self.push(node_id, format!("acl:{}", entry.subjects.len()))
    }
}

fn fabric() -> FabricIndex {
    FabricIndex::MIN
}

fn key_set(id: u16, fill: u8) -> GroupKeySet {
    GroupKeySet {
        group_key_set_id: id,
        security_policy: GroupKeySecurityPolicy::TrustFirst,
        epoch_keys: vec![EpochKey {
            key: [fill; 16],
            start_time: 0,
        }],
    }
}

fn store_with(configurator: &RecordingConfigurator, capacity: usize) -> Datastore {
    Datastore::new(capacity, Box::new(configurator.clone()))
}

// ── Member nodes and listeners ──────────────────────────────────────

#[test]
fn add_pending_node_notifies_every_listener_once() {
    let mut store = Datastore::default();
    let first = Arc::new(CountingListener::default());
    let second = Arc::new(CountingListener::default());
    store.add_listener(first.clone());
    store.add_listener(second.clone());

    store
        .add_pending_node(fabric(), NodeId(42), "kitchen")
        .expect("add");

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    let node = store.node(NodeId(42)).expect("present");
    assert_eq!(node.commissioning_state, DatastoreState::Pending);
    assert_eq!(node.friendly_name, "kitchen");
    assert_eq!(node.fabric_index, fabric());
}

#[test]
fn registering_a_listener_twice_notifies_once() {
    let mut store = Datastore::default();
    let listener = Arc::new(CountingListener::default());
    let handle: Arc<dyn DatastoreListener> = listener.clone();
    store.add_listener(handle.clone());
    store.add_listener(handle.clone());

    store.add_pending_node(fabric(), NodeId(1), "").expect("add");
    assert_eq!(listener.calls(), 1);

    store.remove_listener(&handle);
    store.remove_listener(&handle);
    store.update_node(NodeId(1), "renamed").expect("update");
    assert_eq!(listener.calls(), 1);
}

#[test]
fn remove_unknown_node_is_not_found() {
    let mut store = Datastore::default();
    store.add_pending_node(fabric(), NodeId(1), "").expect("add");
    let listener = Arc::new(CountingListener::default());
    store.add_listener(listener.clone());

    assert_eq!(
        store.remove_node(NodeId(99)),
        Err(DatastoreError::NodeNotFound(NodeId(99)))
    );
    assert_eq!(
        store.update_node(NodeId(99), "x"),
        Err(DatastoreError::NodeNotFound(NodeId(99)))
    );
    assert_eq!(store.nodes().len(), 1);
    assert_eq!(listener.calls(), 0);

    store.remove_node(NodeId(1)).expect("remove");
    assert!(store.nodes().is_empty());
    assert_eq!(listener.calls(), 1);
}

// ── Capacity and uniqueness ─────────────────────────────────────────

#[test]
fn tables_reject_inserts_at_capacity() {
    let mut store = Datastore::default();
    for i in 0..32u64 {
        store
            .add_pending_node(fabric(), NodeId(i + 1), "")
            .expect("node");
        store
            .add_admin(AdminRecord::new(NodeId(i + 1), "", VendorId(1), Vec::new()))
            .expect("admin");
        store
            .add_group_key_set_entry(key_set(i as u16 + 1, 1))
            .expect("key set");
    }

    assert!(matches!(
        store.add_pending_node(fabric(), NodeId(100), ""),
        Err(DatastoreError::ResourceExhausted { max: 32, .. })
    ));
    assert!(matches!(
        store.add_admin(AdminRecord::new(NodeId(100), "", VendorId(1), Vec::new())),
        Err(DatastoreError::ResourceExhausted { max: 32, .. })
    ));
    assert!(matches!(
        store.add_group_key_set_entry(key_set(100, 1)),
        Err(DatastoreError::ResourceExhausted { max: 32, .. })
    ));
    assert_eq!(store.nodes().len(), 32);
    assert_eq!(store.admins().len(), 32);
    assert_eq!(store.group_key_sets().len(), 32);
}

#[test]
fn duplicate_ids_conflict_without_mutation() {
    let mut store = Datastore::default();
    store.add_group_key_set_entry(key_set(1, 0xAA)).expect("add");
    store
        .add_admin(AdminRecord::new(NodeId(5), "first", VendorId(1), vec![1]))
        .expect("add");

    assert_eq!(
        store.add_group_key_set_entry(key_set(1, 0xBB)),
        Err(DatastoreError::KeySetExists(1))
    );
    assert_eq!(store.group_key_set(1), Some(&key_set(1, 0xAA)));

    let err = store
        .add_admin(AdminRecord::new(NodeId(5), "second", VendorId(2), vec![2]))
        .expect_err("duplicate");
    assert!(err.is_conflict());
    assert_eq!(store.admin(NodeId(5)).expect("admin").friendly_name, "first");
}

// ── Refresh cycle ───────────────────────────────────────────────────

#[test]
fn refresh_commits_every_entry_with_one_notification() {
    let configurator = RecordingConfigurator::default();
    let mut store = store_with(&configurator, 32);
    store.add_pending_node(fabric(), NodeId(7), "hall").expect("add");
    store.add_group_key_set_entry(key_set(1, 1)).expect("key set");
    store.add_key_set_to_node(NodeId(7), 1).expect("attach");
    store.add_key_set_to_node(NodeId(7), 2).expect("attach");
    store
        .add_acl_to_node(NodeId(7), AccessEntry::administer(fabric(), NodeId(0x10)))
        .expect("acl");

    let listener = Arc::new(CountingListener::default());
    store.add_listener(listener.clone());

    store.refresh_node(NodeId(7)).expect("refresh");

    assert_eq!(listener.calls(), 1);
    assert_eq!(configurator.push_count(), 3);
    let node = store.node(NodeId(7)).expect("node");
    assert_eq!(node.commissioning_state, DatastoreState::Committed);
    assert!(node
        .key_sets
        .iter()
        .all(|k| k.state == DatastoreState::Committed));
    assert!(node.acl.iter().all(|a| a.state == DatastoreState::Committed));
    assert_eq!(node.parts, vec![0, 1]);
    assert!(store.is_group_key_set_entry_present(2));

    // Nothing pending: a second cycle pushes nothing new.
    store.refresh_node(NodeId(7)).expect("refresh again");
    assert_eq!(configurator.push_count(), 3);
    assert_eq!(listener.calls(), 2);
}

#[test]
fn failed_push_leaves_entries_pending() {
    let configurator = RecordingConfigurator::default();
    let mut store = store_with(&configurator, 32);
    store.add_pending_node(fabric(), NodeId(7), "").expect("add");
    store.add_key_set_to_node(NodeId(7), 3).expect("attach");
    store
        .add_acl_to_node(NodeId(7), AccessEntry::administer(fabric(), NodeId(0x10)))
        .expect("acl");
    let listener = Arc::new(CountingListener::default());
    store.add_listener(listener.clone());

    configurator.failing.store(true, Ordering::SeqCst);
    assert_eq!(
        store.refresh_node(NodeId(7)),
        Err(DatastoreError::PushIncomplete { pending: 2 })
    );
    assert_eq!(listener.calls(), 1);
    let node = store.node(NodeId(7)).expect("node");
    assert_eq!(node.commissioning_state, DatastoreState::Pending);
    assert_eq!(node.pending_entries(), 2);

    configurator.failing.store(false, Ordering::SeqCst);
    store.refresh_node(NodeId(7)).expect("retry");
    let node = store.node(NodeId(7)).expect("node");
    assert_eq!(node.commissioning_state, DatastoreState::Committed);
    assert_eq!(node.pending_entries(), 0);
}

#[test]
fn refresh_unknown_node_is_not_found() {
    let mut store = Datastore::default();
    let listener = Arc::new(CountingListener::default());
    store.add_listener(listener.clone());
    assert_eq!(
        store.refresh_node(NodeId(1)),
        Err(DatastoreError::NodeNotFound(NodeId(1)))
    );
    assert_eq!(listener.calls(), 0);
}

// ── Key set updates ─────────────────────────────────────────────────

#[test]
fn identical_key_set_update_does_not_refresh() {
    let configurator = RecordingConfigurator::default();
    let mut store = store_with(&configurator, 32);
    store.add_pending_node(fabric(), NodeId(1), "").expect("add");
    store.add_group_key_set_entry(key_set(4, 1)).expect("key set");
    store.add_key_set_to_node(NodeId(1), 4).expect("attach");
    store.refresh_node(NodeId(1)).expect("refresh");
    let pushes = configurator.push_count();

    let listener = Arc::new(CountingListener::default());
    store.add_listener(listener.clone());
    store
        .update_group_key_set_entry(key_set(4, 1))
        .expect("identical update");

    assert_eq!(configurator.push_count(), pushes);
    assert_eq!(listener.calls(), 0);
}

#[test]
fn changed_key_set_update_refreshes_referencing_nodes() {
    let configurator = RecordingConfigurator::default();
    let mut store = store_with(&configurator, 32);
    for node in [1, 2, 3] {
        store.add_pending_node(fabric(), NodeId(node), "").expect("add");
    }
    store.add_group_key_set_entry(key_set(4, 1)).expect("key set");
    store.add_key_set_to_node(NodeId(1), 4).expect("attach");
    store.add_key_set_to_node(NodeId(2), 4).expect("attach");
    let listener = Arc::new(CountingListener::default());
    store.add_listener(listener.clone());

    store
        .update_group_key_set_entry(key_set(4, 2))
        .expect("changed update");

    assert_eq!(store.group_key_set(4), Some(&key_set(4, 2)));
    assert_eq!(configurator.push_count(), 2);
    assert_eq!(listener.calls(), 1);
    for node in [1, 2] {
        let node = store.node(NodeId(node)).expect("node");
        assert_eq!(node.key_sets[0].state, DatastoreState::Committed);
    }
    assert!(store.node(NodeId(3)).expect("node").key_sets.is_empty());
}

#[test]
fn unreferenced_key_set_refresh_is_silent() {
    let mut store = Datastore::default();
    store.add_group_key_set_entry(key_set(4, 1)).expect("key set");
    let listener = Arc::new(CountingListener::default());
    store.add_listener(listener.clone());

    assert_eq!(store.refresh_nodes(4), Ok(0));
    assert_eq!(listener.calls(), 0);
    assert_eq!(
        store.refresh_nodes(5),
        Err(DatastoreError::KeySetNotFound(5))
    );
}

#[test]
fn key_set_removal() {
    let mut store = Datastore::default();
    store.add_group_key_set_entry(key_set(4, 1)).expect("key set");
    assert_eq!(store.remove_group_key_set_entry(4), Ok(key_set(4, 1)));
    assert!(!store.is_group_key_set_entry_present(4));
    assert_eq!(
        store.remove_group_key_set_entry(4),
        Err(DatastoreError::KeySetNotFound(4))
    );
    assert_eq!(
        store.update_group_key_set_entry(key_set(4, 1)),
        Err(DatastoreError::KeySetNotFound(4))
    );
}
