//! Per-command context and the node services commands operate on.

use std::sync::Arc;

use jointfab_access::{AccessControl, GroupKeyStore, SecureSession};
use jointfab_datastore::Datastore;
use jointfab_fabric::{FabricTable, FailSafeContext};

use crate::advertiser::Advertiser;
use crate::window::CommissioningWindowManager;

/// The invoking session plus transport-level state of one command.
#[derive(Debug)]
pub struct CommandContext {
    session: SecureSession,
    acks_flushed: bool,
}

impl CommandContext {
    pub fn new(session: SecureSession) -> Self {
        Self {
            session,
            acks_flushed: false,
        }
    }

    pub fn session(&self) -> &SecureSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SecureSession {
        &mut self.session
    }

    /// Acknowledges receipt of the command ahead of its response, so a slow
    /// handler does not trigger transport retransmissions.
    pub fn flush_acks_right_away(&mut self) {
        if !self.acks_flushed {
            tracing::debug!("acknowledgement flushed before slow processing");
            self.acks_flushed = true;
        }
    }

    pub fn acks_flushed(&self) -> bool {
        self.acks_flushed
    }

    pub fn into_session(self) -> SecureSession {
        self.session
    }
}

/// Everything a joint fabric command touches on this node.
pub struct NodeServices {
    pub fabrics: FabricTable,
    pub fail_safe: FailSafeContext,
    pub access_control: AccessControl,
    pub group_keys: GroupKeyStore,
    pub commissioning_window: CommissioningWindowManager,
    pub datastore: Datastore,
    pub advertiser: Arc<dyn Advertiser>,
}

impl NodeServices {
    /// Services over `fabrics` with default-sized stores.
    pub fn new(fabrics: FabricTable, advertiser: Arc<dyn Advertiser>) -> Self {
        Self {
            fabrics,
            fail_safe: FailSafeContext::new(),
            access_control: AccessControl::default(),
            group_keys: GroupKeyStore::default(),
            commissioning_window: CommissioningWindowManager::default(),
            datastore: Datastore::default(),
            advertiser,
        }
    }
}
