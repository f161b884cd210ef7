//! Fail-safe timer bounding a pending fabric transaction.

use std::time::{Duration, Instant};

use jointfab_types::FabricIndex;

use crate::table::FabricTable;

/// Tracks whether a provisioning fail-safe is armed and which staged
/// effects have been applied under it.
#[derive(Debug, Default)]
pub struct FailSafeContext {
    deadline: Option<Instant>,
    csr_request_for_update_noc: bool,
    add_trusted_root_cert_invoked: bool,
    add_noc_command_invoked: Option<FabricIndex>,
}

impl FailSafeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the fail-safe for `duration` from `now`.
    pub fn arm(&mut self, now: Instant, duration: Duration) {
        self.deadline = Some(now + duration);
        tracing::debug!(secs = duration.as_secs(), "fail-safe armed");
    }

    /// Disarms the fail-safe and clears every staged-effect flag.
    pub fn disarm(&mut self) {
        *self = Self::default();
    }

    pub fn is_fail_safe_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// `true` when the fail-safe is not armed. Expiry cleanup runs
    /// synchronously in [`Self::expire_if_elapsed`], so none is ever
    /// outstanding. Callers that also need the fabric table quiescent check
    /// [`FabricTable::has_pending_transaction`] alongside.
    pub fn is_fail_safe_fully_disarmed(&self) -> bool {
        !self.is_fail_safe_armed()
    }

    pub fn set_csr_request_for_update_noc(&mut self, value: bool) {
        self.csr_request_for_update_noc = value;
    }

    pub fn csr_request_for_update_noc(&self) -> bool {
        self.csr_request_for_update_noc
    }

    pub fn set_add_trusted_root_cert_invoked(&mut self) {
        self.add_trusted_root_cert_invoked = true;
    }

    pub fn add_trusted_root_cert_invoked(&self) -> bool {
        self.add_trusted_root_cert_invoked
    }

    pub fn set_add_noc_command_invoked(&mut self, fabric_index: FabricIndex) {
        self.add_noc_command_invoked = Some(fabric_index);
    }

    /// The fabric whose operational certificate was added under this
    /// fail-safe, if any.
    pub fn add_noc_command_invoked(&self) -> Option<FabricIndex> {
        self.add_noc_command_invoked
    }

    /// Reverts the pending fabric transaction and disarms when the deadline
    /// has passed. Returns `true` if it expired.
    pub fn expire_if_elapsed(&mut self, now: Instant, fabrics: &mut FabricTable) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                tracing::warn!(
                    noc_added_for = self.add_noc_command_invoked.map(FabricIndex::get),
                    "fail-safe expired, reverting pending fabric data"
                );
                fabrics.revert_pending_fabric_data();
                self.disarm();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_and_disarm() {
        let mut ctx = FailSafeContext::new();
        assert!(ctx.is_fail_safe_fully_disarmed());
        ctx.arm(Instant::now(), Duration::from_secs(60));
        assert!(ctx.is_fail_safe_armed());
        assert!(!ctx.is_fail_safe_fully_disarmed());

        ctx.set_add_trusted_root_cert_invoked();
        ctx.set_add_noc_command_invoked(FabricIndex::MIN);
        ctx.disarm();
        assert!(!ctx.add_trusted_root_cert_invoked());
        assert_eq!(ctx.add_noc_command_invoked(), None);
    }

    #[test]
    fn expiry_reverts_pending_transaction() {
        let mut table = FabricTable::in_memory(4);
        table.allocate_pending_operational_key(None).expect("csr");

        let start = Instant::now();
        let mut ctx = FailSafeContext::new();
        ctx.arm(start, Duration::from_secs(30));

        assert!(!ctx.expire_if_elapsed(start + Duration::from_secs(29), &mut table));
        assert!(table.has_pending_transaction());

        assert!(ctx.expire_if_elapsed(start + Duration::from_secs(30), &mut table));
        assert!(!table.has_pending_transaction());
        assert!(ctx.is_fail_safe_fully_disarmed());
    }

    #[test]
    fn unarmed_context_never_expires() {
        let mut table = FabricTable::in_memory(4);
        table.allocate_pending_operational_key(None).expect("csr");
        let mut ctx = FailSafeContext::new();
        assert!(!ctx.expire_if_elapsed(Instant::now(), &mut table));
        assert!(table.has_pending_transaction());
    }
}
