//! Operational advertisement restarts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jointfab_datastore::DatastoreListener;

/// Re-announces the node's operational identities on the network.
pub trait Advertiser: Send + Sync {
    fn restart_operational_advertising(&self);
}

/// Logs and counts restarts. Used where no discovery service is wired in.
#[derive(Debug, Default)]
pub struct LoggingAdvertiser {
    restarts: AtomicUsize,
}

impl LoggingAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of restarts requested so far.
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl Advertiser for LoggingAdvertiser {
    fn restart_operational_advertising(&self) {
        let count = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(count, "operational advertising restarted");
    }
}

/// Restarts advertising whenever the membership datastore's member list
/// changes.
pub struct AdvertiserListener {
    advertiser: Arc<dyn Advertiser>,
}

impl AdvertiserListener {
    pub fn new(advertiser: Arc<dyn Advertiser>) -> Self {
        Self { advertiser }
    }
}

impl DatastoreListener for AdvertiserListener {
    fn mark_node_list_changed(&self) {
        self.advertiser.restart_operational_advertising();
    }
}
