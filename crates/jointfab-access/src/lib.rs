//! Access policy, group keys, and secure sessions.
//!
//! - [`AccessControl`] holds per-fabric access entries and records a
//!   fabric-scoped change event whenever one is created.
//! - [`GroupKeyStore`] holds per-fabric group key sets, including the
//!   identity protection key installed when a fabric is joined.
//! - [`SecureSession`] models the session a command arrived on, and yields
//!   the [`SubjectDescriptor`] access decisions are made against.

mod acl;
mod group_keys;
mod session;

pub use acl::{
    AccessControl, AccessControlEntryChanged, AccessError, ChangeType, DEFAULT_MAX_ENTRIES_PER_FABRIC,
    MAX_RETAINED_EVENTS,
};
pub use group_keys::{GroupKeyError, GroupKeyStore, DEFAULT_MAX_KEY_SETS_PER_FABRIC};
pub use session::{SecureSession, SessionError, SessionType, SubjectDescriptor};
