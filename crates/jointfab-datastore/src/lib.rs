//! Fabric membership datastore.
//!
//! Holds the authoritative record of who participates in the joint fabric:
//! member nodes with the group key sets and access entries they should
//! carry, administrators, and the central group key set list. Each
//! per-node configuration entry moves `Unknown -> Pending -> Committed`;
//! [`Datastore::refresh_node`] drives pending entries to committed by
//! pushing them through a [`MemberConfigurator`].
//!
//! Registered [`DatastoreListener`]s are told when the member list
//! changes, once per logical change, after the change is visible.
//!
//! ```rust,ignore
//! use jointfab_datastore::Datastore;
//!
//! let mut store = Datastore::default();
//! store.add_pending_node(fabric_index, NodeId(42), "kitchen")?;
//! store.add_key_set_to_node(NodeId(42), IDENTITY_PROTECTION_KEY_SET_ID)?;
//! store.refresh_node(NodeId(42))?;
//! ```

mod configurator;
mod error;
mod listener;
mod store;
mod types;

pub use configurator::{MemberConfigurator, NoopConfigurator, PushError};
pub use error::DatastoreError;
pub use listener::DatastoreListener;
pub use store::{Datastore, DEFAULT_CAPACITY};
pub use types::{
    AdminRecord, DatastoreState, MemberNode, NodeAclEntry, NodeKeySetEntry,
    MAX_FRIENDLY_NAME_LENGTH,
};
