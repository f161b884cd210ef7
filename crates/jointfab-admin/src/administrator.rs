//! The joint fabric administrator: issues the node's own intermediate CSR
//! and admits new administrators onto the shared fabric.

use std::time::{Duration, Instant};

use jointfab_access::{SecureSession, SessionType};
use jointfab_certs::{
    compact_to_der, der_to_compact, extract_cats, extract_node_id_fabric_id, CredentialIssuer,
    MAX_COMPACT_CERT_LENGTH,
};
use jointfab_datastore::AdminRecord;
use jointfab_types::{
    AccessEntry, CatValues, FabricId, FabricIndex, GroupKeySet, ImStatus, JointFabricStatus,
    NodeId, VendorId, IDENTITY_PROTECTION_KEY_SET_ID,
};
use serde::{Deserialize, Serialize};

use crate::context::{CommandContext, NodeServices};
use crate::error::{AdmissionError, ReadError, WindowError};
use crate::reader::{MembershipReader, ReadClient};
use crate::window::JointWindowParams;

/// Longest debug text carried in an admission response, in bytes.
pub const MAX_DEBUG_TEXT_LENGTH: usize = 128;

/// How long a pending issuance may stay uncommitted before the fail-safe
/// reverts it.
pub const DEFAULT_FAIL_SAFE_TIMEOUT: Duration = Duration::from_secs(60);

/// A request to admit a new administrator.
#[derive(Debug, Clone)]
pub struct AdmitRequest {
    /// The joining administrator's intermediate certificate, compact
    /// encoding.
    pub icac: Vec<u8>,
    /// Subject granted administer privilege on the new fabric.
    pub case_admin_subject: NodeId,
}

/// The commit half of the intermediate CSR exchange: the intermediate
/// certificate signed from [`JointFabricAdministrator::issue_authority_csr`]
/// together with the identity this node takes on the new fabric.
#[derive(Debug, Clone)]
pub struct AuthoritySigningRequest {
    /// This node's signed intermediate certificate, compact encoding.
    pub icac: Vec<u8>,
    pub node_id: NodeId,
    pub fabric_id: FabricId,
    pub admin_vendor_id: VendorId,
    /// Subject granted administer privilege on the new fabric.
    pub case_admin_subject: NodeId,
}

/// Wire response to an admission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionResponse {
    pub status: ImStatus,
    pub outcome: Option<JointFabricStatus>,
    pub fabric_index: Option<FabricIndex>,
    pub debug_text: Option<String>,
}

impl AdmissionResponse {
    pub fn from_result(result: &Result<FabricIndex, AdmissionError>) -> Self {
        match result {
            Ok(index) => Self {
                status: ImStatus::Success,
                outcome: Some(JointFabricStatus::Ok),
                fabric_index: Some(*index),
                debug_text: None,
            },
            Err(e) => Self {
                status: e.im_status(),
                outcome: e.admission_outcome(),
                fabric_index: None,
                debug_text: Some(truncate_utf8(e.to_string(), MAX_DEBUG_TEXT_LENGTH)),
            },
        }
    }
}

/// Cuts `text` to at most `max` bytes without splitting a character.
pub fn truncate_utf8(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// Certificates of the existing fabrics an admission draws on.
struct AdmissionInputs {
    accessing: FabricIndex,
    root_cert: Vec<u8>,
    requester_noc: Vec<u8>,
    admin_noc: Option<Vec<u8>>,
}

/// What one issuance signs and stages, gathered before the transaction
/// starts.
struct Issuance<'a> {
    accessing: FabricIndex,
    root_cert: Vec<u8>,
    node_id: NodeId,
    fabric_id: FabricId,
    cats: Option<CatValues>,
    vendor_id: VendorId,
    icac: &'a [u8],
    admin_subject: NodeId,
}

/// Coordinates trust provisioning for the joint fabric.
pub struct JointFabricAdministrator {
    issuer: Option<Box<dyn CredentialIssuer>>,
    ecosystem_fabric_index: Option<FabricIndex>,
    administrator_fabric_index: Option<FabricIndex>,
    fail_safe_timeout: Duration,
    reader: MembershipReader,
}

impl std::fmt::Debug for JointFabricAdministrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JointFabricAdministrator")
            .field("issuer", &self.issuer.is_some())
            .field("ecosystem_fabric_index", &self.ecosystem_fabric_index)
            .field("administrator_fabric_index", &self.administrator_fabric_index)
            .field("fail_safe_timeout", &self.fail_safe_timeout)
            .finish()
    }
}

impl Default for JointFabricAdministrator {
    fn default() -> Self {
        Self::new()
    }
}

impl JointFabricAdministrator {
    /// An administrator with no issuer and no ecosystem fabric. Every
    /// issuance request fails until both are configured.
    pub fn new() -> Self {
        Self {
            issuer: None,
            ecosystem_fabric_index: None,
            administrator_fabric_index: None,
            fail_safe_timeout: DEFAULT_FAIL_SAFE_TIMEOUT,
            reader: MembershipReader::new(),
        }
    }

    pub fn with_issuer(mut self, issuer: Box<dyn CredentialIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn with_ecosystem_fabric_index(mut self, fabric_index: FabricIndex) -> Self {
        self.ecosystem_fabric_index = Some(fabric_index);
        self
    }

    pub fn with_fail_safe_timeout(mut self, timeout: Duration) -> Self {
        self.fail_safe_timeout = timeout;
        self
    }

    pub fn ecosystem_fabric_index(&self) -> Option<FabricIndex> {
        self.ecosystem_fabric_index
    }

    pub fn administrator_fabric_index(&self) -> Option<FabricIndex> {
        self.administrator_fabric_index
    }

    pub fn set_administrator_fabric_index(&mut self, fabric_index: Option<FabricIndex>) {
        self.administrator_fabric_index = fabric_index;
        tracing::info!(
            administrator_fabric_index = fabric_index.map(FabricIndex::get),
            "administrator fabric index set"
        );
    }

    pub fn membership_reader(&mut self) -> &mut MembershipReader {
        &mut self.reader
    }

    /// Starts a membership read of `target`.
    pub fn read_joint_fabric_info(
        &mut self,
        client: &mut dyn ReadClient,
        target: NodeId,
    ) -> Result<(), ReadError> {
        self.reader.read_joint_fabric_info(client, target)
    }

    /// Returns a signing request for this node's own intermediate key.
    pub fn issue_authority_csr(&mut self) -> Result<Vec<u8>, AdmissionError> {
        if self.ecosystem_fabric_index.is_none() {
            return Err(AdmissionError::NotConfigured);
        }
        let issuer = self.issuer.as_mut().ok_or(AdmissionError::IssuerMissing)?;
        issuer.prepare()?;
        let csr = issuer.obtain_ica_csr()?;
        if csr.is_empty() {
            return Err(AdmissionError::EmptyCsr);
        }
        tracing::info!(len = csr.len(), "issued intermediate CSR");
        Ok(csr)
    }

    /// Admits a new administrator: issues it an operational certificate on
    /// a new fabric sharing the accessing fabric's root, grants its subject
    /// administer privilege there, and commits.
    ///
    /// A failure before commit leaves the pending transaction for the next
    /// attempt or the fail-safe to revert. The identity protection key, the
    /// access entry and the session's fabric are rolled back so none of
    /// them outlives an uncommitted fabric.
    pub fn admit_new_administrator(
        &mut self,
        ctx: &mut CommandContext,
        services: &mut NodeServices,
        request: &AdmitRequest,
    ) -> Result<FabricIndex, AdmissionError> {
        let result = self.admit(ctx, services, request);
        match &result {
            Ok(index) => tracing::info!(
                fabric_index = index.get(),
                admin_subject = %request.case_admin_subject,
                "administrator admitted"
            ),
            Err(e) => tracing::warn!(
                status = %e.im_status(),
                outcome = ?e.admission_outcome(),
                error = %e,
                "administrator admission rejected"
            ),
        }
        result
    }

    fn admit(
        &mut self,
        ctx: &mut CommandContext,
        services: &mut NodeServices,
        request: &AdmitRequest,
    ) -> Result<FabricIndex, AdmissionError> {
        self.check_ready(services, &request.icac)?;

        // Signing is slow; acknowledge before starting.
        ctx.flush_acks_right_away();

        // 1-3. Existing credentials and vendor of the requester.
        let inputs = self.fetch_inputs(ctx.session(), services)?;
        let vendor_id = services
            .fabrics
            .find_fabric_with_index(inputs.accessing)
            .map(|f| f.vendor_id)
            .filter(|v| v.is_specified())
            .ok_or(AdmissionError::VendorIdUnspecified(inputs.accessing))?;

        // The new fabric carries the requester's identity. CATs come from
        // the local administrator when one is established.
        let (node_id, fabric_id) = extract_node_id_fabric_id(&inputs.requester_noc)?;
        let cats = extract_cats(inputs.admin_noc.as_deref().unwrap_or(&inputs.requester_noc))?;

        let new_index = self.issue(
            ctx,
            services,
            Issuance {
                accessing: inputs.accessing,
                root_cert: inputs.root_cert,
                node_id,
                fabric_id,
                cats: Some(cats),
                vendor_id,
                icac: &request.icac,
                admin_subject: request.case_admin_subject,
            },
        )?;
        record_admitted_administrator(
            services,
            new_index,
            node_id,
            vendor_id,
            &request.icac,
            request.case_admin_subject,
        );
        Ok(new_index)
    }

    /// Completes the intermediate CSR exchange: signs this node an
    /// operational certificate under the returned intermediate, on a new
    /// fabric sharing the accessing fabric's root, and commits it the same
    /// way an admission does. Returns the new fabric's index.
    pub fn complete_authority_signing(
        &mut self,
        ctx: &mut CommandContext,
        services: &mut NodeServices,
        request: &AuthoritySigningRequest,
    ) -> Result<FabricIndex, AdmissionError> {
        let result = self.sign_authority(ctx, services, request);
        match &result {
            Ok(index) => tracing::info!(
                fabric_index = index.get(),
                node_id = %request.node_id,
                fabric_id = %request.fabric_id,
                "authority signing committed"
            ),
            Err(e) => tracing::warn!(
                status = %e.im_status(),
                outcome = ?e.admission_outcome(),
                error = %e,
                "authority signing rejected"
            ),
        }
        result
    }

    fn sign_authority(
        &mut self,
        ctx: &mut CommandContext,
        services: &mut NodeServices,
        request: &AuthoritySigningRequest,
    ) -> Result<FabricIndex, AdmissionError> {
        self.check_ready(services, &request.icac)?;
        ctx.flush_acks_right_away();

        let accessing = ctx
            .session()
            .fabric_index()
            .ok_or(AdmissionError::NoAccessingFabric)?;
        let root_cert = services
            .fabrics
            .fetch_root_cert(accessing)
            .map_err(AdmissionError::CredentialLookup)?
            .to_vec();
        if !request.admin_vendor_id.is_specified() {
            return Err(AdmissionError::AdminVendorIdUnspecified);
        }

        let new_index = self.issue(
            ctx,
            services,
            Issuance {
                accessing,
                root_cert,
                node_id: request.node_id,
                fabric_id: request.fabric_id,
                cats: None,
                vendor_id: request.admin_vendor_id,
                icac: &request.icac,
                admin_subject: request.case_admin_subject,
            },
        )?;
        record_admitted_administrator(
            services,
            new_index,
            request.node_id,
            request.admin_vendor_id,
            &request.icac,
            request.case_admin_subject,
        );
        Ok(new_index)
    }

    /// Preconditions shared by both issuance flows, checked before the
    /// request is acknowledged.
    fn check_ready(&self, services: &NodeServices, icac: &[u8]) -> Result<(), AdmissionError> {
        let ecosystem = self
            .ecosystem_fabric_index
            .ok_or(AdmissionError::NotConfigured)?;
        if icac.len() > MAX_COMPACT_CERT_LENGTH {
            return Err(AdmissionError::IcacTooLarge {
                len: icac.len(),
                max: MAX_COMPACT_CERT_LENGTH,
            });
        }
        if services.fabrics.find_fabric_with_index(ecosystem).is_none() {
            return Err(AdmissionError::EcosystemFabricMissing(ecosystem));
        }
        Ok(())
    }

    /// Steps 4-13: stages a fresh transaction under an armed fail-safe,
    /// signs and stages the new fabric, then grants and commits. A commit
    /// disarms the fail-safe; any earlier failure leaves it armed so the
    /// pending transaction is reverted on expiry.
    fn issue(
        &mut self,
        ctx: &mut CommandContext,
        services: &mut NodeServices,
        issuance: Issuance<'_>,
    ) -> Result<FabricIndex, AdmissionError> {
        // 4-5. Fresh transaction staged on the accessing fabric's root.
        services
            .fail_safe
            .arm(Instant::now(), self.fail_safe_timeout);
        services.fabrics.revert_pending_fabric_data();
        services.fail_safe.set_csr_request_for_update_noc(false);
        let csr = services
            .fabrics
            .allocate_pending_operational_key(Some(issuance.accessing))
            .map_err(AdmissionError::KeyAllocation)?;
        services
            .fabrics
            .add_new_pending_trusted_root_cert(&issuance.root_cert)
            .map_err(AdmissionError::StageRoot)?;
        services.fail_safe.set_add_trusted_root_cert_invoked();

        // 6. Identity hints, immediately before signing.
        let issuer = self.issuer.as_mut().ok_or(AdmissionError::IssuerMissing)?;
        tracing::debug!(
            node_id = %issuance.node_id,
            fabric_id = %issuance.fabric_id,
            cats = issuance.cats.as_ref().map(|c| c.tags().len()),
            "issuer hints set"
        );
        issuer.prepare()?;
        issuer.set_node_id_for_next_noc_request(issuance.node_id);
        issuer.set_fabric_id_for_next_noc_request(issuance.fabric_id);
        if let Some(cats) = issuance.cats {
            issuer.set_cats_for_next_noc_request(cats);
        }

        // 7. Sign.
        let icac_der = compact_to_der(issuance.icac)?;
        let noc_der = issuer.sign_noc(&icac_der, &csr)?;
        let noc = der_to_compact(&noc_der)?;

        // 8. Stage the new fabric.
        let new_index = services
            .fabrics
            .add_new_pending_fabric_with_operational_keystore(
                &noc,
                Some(issuance.icac),
                issuance.vendor_id,
            )
            .map_err(AdmissionError::StageFabric)?;

        let saved_session = ctx.session().clone();
        if let Err(e) = Self::grant_and_commit(ctx, services, new_index, issuance.admin_subject) {
            services.group_keys.remove_fabric(new_index);
            services.access_control.remove_fabric(new_index);
            *ctx.session_mut() = saved_session;
            return Err(e);
        }
        services.fail_safe.disarm();

        // 13. The node's advertised identities changed.
        services.advertiser.restart_operational_advertising();
        Ok(new_index)
    }

    fn fetch_inputs(
        &self,
        session: &SecureSession,
        services: &NodeServices,
    ) -> Result<AdmissionInputs, AdmissionError> {
        let accessing = session
            .fabric_index()
            .ok_or(AdmissionError::NoAccessingFabric)?;
        let fabrics = &services.fabrics;
        let root_cert = fabrics
            .fetch_root_cert(accessing)
            .map_err(AdmissionError::CredentialLookup)?
            .to_vec();
        let requester_noc = fabrics
            .fetch_noc_cert(accessing)
            .map_err(AdmissionError::CredentialLookup)?
            .to_vec();
        let admin_noc = match self.administrator_fabric_index {
            Some(index) => Some(
                fabrics
                    .fetch_noc_cert(index)
                    .map_err(AdmissionError::CredentialLookup)?
                    .to_vec(),
            ),
            None => None,
        };
        Ok(AdmissionInputs {
            accessing,
            root_cert,
            requester_noc,
            admin_noc,
        })
    }

    /// Steps 9-12: identity protection key, session adoption, access entry,
    /// commit. The access entry must follow adoption: its change event is
    /// scoped by the session's fabric.
    fn grant_and_commit(
        ctx: &mut CommandContext,
        services: &mut NodeServices,
        new_index: FabricIndex,
        admin_subject: NodeId,
    ) -> Result<(), AdmissionError> {
        let compressed = services
            .fabrics
            .find_fabric_with_index(new_index)
            .ok_or(AdmissionError::StagedFabricMissing(new_index))?
            .compressed_fabric_id;
        services.group_keys.set_key_set(
            new_index,
            &compressed,
            GroupKeySet::default_identity_protection_key(),
        )?;

        if ctx.session().session_type() == SessionType::Pase {
            ctx.session_mut().adopt_fabric_index(new_index)?;
        }

        services.access_control.create_entry(
            &ctx.session().subject_descriptor(),
            new_index,
            AccessEntry::administer(new_index, admin_subject),
        )?;

        services.fail_safe.set_add_noc_command_invoked(new_index);
        services
            .fabrics
            .commit_pending_fabric_data()
            .map_err(AdmissionError::Commit)?;
        Ok(())
    }

    /// Opens a commissioning window through which a new member can join
    /// the shared fabric. The accessing fabric's vendor is recorded on the
    /// window.
    pub fn open_joint_commissioning_window(
        &self,
        ctx: &CommandContext,
        services: &mut NodeServices,
        params: JointWindowParams,
        now: Instant,
    ) -> Result<(), WindowError> {
        let result = Self::open_window(ctx, services, params, now);
        if let Err(e) = &result {
            tracing::warn!(
                status = %e.im_status(),
                cluster_status = ?e.cluster_status(),
                error = %e,
                "joint commissioning window not opened"
            );
        }
        result
    }

    fn open_window(
        ctx: &CommandContext,
        services: &mut NodeServices,
        params: JointWindowParams,
        now: Instant,
    ) -> Result<(), WindowError> {
        let fabric = ctx
            .session()
            .fabric_index()
            .and_then(|index| services.fabrics.find_fabric_with_index(index))
            .ok_or(WindowError::FabricNotFound)?;
        let (fabric_index, vendor_id) = (fabric.fabric_index, fabric.vendor_id);
        if !services.fail_safe.is_fail_safe_fully_disarmed()
            || services.fabrics.has_pending_transaction()
        {
            return Err(WindowError::FailSafeArmed);
        }
        services
            .commissioning_window
            .open_joint_commissioning_window(params, fabric_index, vendor_id, now)?;
        Ok(())
    }
}

/// Records a committed admission in the membership datastore. The fabric
/// is already committed, so failures here are logged rather than returned.
fn record_admitted_administrator(
    services: &mut NodeServices,
    fabric_index: FabricIndex,
    node_id: NodeId,
    vendor_id: VendorId,
    icac: &[u8],
    admin_subject: NodeId,
) {
    let datastore = &mut services.datastore;
    if let Err(e) = datastore.add_admin(AdminRecord::new(node_id, "", vendor_id, icac.to_vec())) {
        tracing::error!(node_id = %node_id, error = %e, "administrator record not stored");
    }
    if !datastore.is_group_key_set_entry_present(IDENTITY_PROTECTION_KEY_SET_ID) {
        if let Err(e) = datastore.add_group_key_set_entry(GroupKeySet::default_identity_protection_key()) {
            tracing::error!(error = %e, "identity protection key set not stored");
        }
    }

    let staged = datastore
        .add_pending_node(fabric_index, node_id, "")
        .and_then(|()| datastore.add_key_set_to_node(node_id, IDENTITY_PROTECTION_KEY_SET_ID))
        .and_then(|()| {
            datastore.add_acl_to_node(
                node_id,
                AccessEntry::administer(fabric_index, admin_subject),
            )
        });
    if let Err(e) = staged.and_then(|_| datastore.refresh_node(node_id)) {
        tracing::error!(node_id = %node_id, error = %e, "admitted administrator not recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_text_capped_on_char_boundary() {
        let text = "é".repeat(100);
        let capped = truncate_utf8(text, MAX_DEBUG_TEXT_LENGTH);
        assert!(capped.len() <= MAX_DEBUG_TEXT_LENGTH);
        assert_eq!(capped.len(), 128);
        assert_eq!(truncate_utf8("short".into(), MAX_DEBUG_TEXT_LENGTH), "short");
    }

    #[test]
    fn unconfigured_administrator_rejects_csr() {
        let mut admin = JointFabricAdministrator::new();
        assert!(matches!(
            admin.issue_authority_csr(),
            Err(AdmissionError::NotConfigured)
        ));
        let mut admin = JointFabricAdministrator::new().with_ecosystem_fabric_index(FabricIndex::MIN);
        assert!(matches!(
            admin.issue_authority_csr(),
            Err(AdmissionError::IssuerMissing)
        ));
    }

    #[test]
    fn error_response_carries_status_and_outcome() {
        let response = AdmissionResponse::from_result(&Err(AdmissionError::NotConfigured));
        assert_eq!(response.status, ImStatus::UnsupportedCommand);
        assert_eq!(response.outcome, None);
        assert_eq!(response.fabric_index, None);
        assert!(response.debug_text.is_some());

        let ok = AdmissionResponse::from_result(&Ok(FabricIndex::MIN));
        assert_eq!(ok.status, ImStatus::Success);
        assert_eq!(ok.outcome, Some(JointFabricStatus::Ok));
        assert_eq!(ok.fabric_index, Some(FabricIndex::MIN));
    }

    #[test]
    fn response_serializes_wire_names() {
        let json = serde_json::to_value(AdmissionResponse::from_result(&Ok(FabricIndex::MIN)))
            .expect("json");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["outcome"], "OK");
        assert_eq!(json["fabric_index"], 1);
        assert!(json["debug_text"].is_null());
    }
}
