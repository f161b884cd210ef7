//! Change notification for the member list.

use std::sync::Arc;

/// Receives member-list change notifications.
///
/// Called synchronously after the datastore has applied the change.
pub trait DatastoreListener: Send + Sync {
    fn mark_node_list_changed(&self);
}

/// Registered listeners, notified in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    registered: Vec<Arc<dyn DatastoreListener>>,
}

impl Listeners {
    /// Registers `listener`. Returns `false` if it was already registered.
    pub(crate) fn add(&mut self, listener: Arc<dyn DatastoreListener>) -> bool {
        if self.registered.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        self.registered.push(listener);
        true
    }

    /// Unregisters `listener`. Returns `false` if it was not registered.
    pub(crate) fn remove(&mut self, listener: &Arc<dyn DatastoreListener>) -> bool {
        match self.registered.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(position) => {
                self.registered.remove(position);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.registered.len()
    }

    pub(crate) fn notify(&self) {
        for listener in &self.registered {
            listener.mark_node_list_changed();
        }
    }
}
