//! Error types for the coordinator and how they surface on the wire.

use jointfab_access::{AccessError, GroupKeyError, SessionError};
use jointfab_certs::{CertError, IssuerError};
use jointfab_fabric::FabricError;
use jointfab_types::{CommissioningWindowStatus, FabricIndex, ImStatus, JointFabricStatus, NodeId};
use thiserror::Error;

/// Why an issuance or admission request failed.
///
/// Every variant maps to a coarse interaction status via
/// [`AdmissionError::im_status`]; some also carry a fine-grained
/// [`JointFabricStatus`] via [`AdmissionError::admission_outcome`].
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// No ecosystem fabric index is configured on this node.
    #[error("joint fabric ecosystem not configured")]
    NotConfigured,

    #[error("no credential issuer configured")]
    IssuerMissing,

    #[error("intermediate certificate is {len} bytes (max {max})")]
    IcacTooLarge { len: usize, max: usize },

    #[error("ecosystem fabric {0} not present")]
    EcosystemFabricMissing(FabricIndex),

    /// The request arrived on a session with no accessing fabric.
    #[error("request has no accessing fabric")]
    NoAccessingFabric,

    #[error("vendor id not specified on fabric {0}")]
    VendorIdUnspecified(FabricIndex),

    #[error("administrator vendor id not specified")]
    AdminVendorIdUnspecified,

    #[error("credential issuer returned an empty signing request")]
    EmptyCsr,

    /// A certificate of an existing fabric could not be read.
    #[error("credential lookup failed: {0}")]
    CredentialLookup(#[source] FabricError),

    #[error("operational key allocation failed: {0}")]
    KeyAllocation(#[source] FabricError),

    #[error("trusted root staging failed: {0}")]
    StageRoot(#[source] FabricError),

    #[error("fabric staging failed: {0}")]
    StageFabric(#[source] FabricError),

    #[error("staged fabric {0} disappeared")]
    StagedFabricMissing(FabricIndex),

    #[error("commit failed: {0}")]
    Commit(#[source] FabricError),

    #[error("certificate conversion failed: {0}")]
    Certificate(#[from] CertError),

    #[error("credential issuer failed: {0}")]
    Issuer(#[from] IssuerError),

    #[error("identity protection key not stored: {0}")]
    IdentityProtectionKey(#[from] GroupKeyError),

    #[error("session could not adopt the new fabric: {0}")]
    SessionAdoption(#[from] SessionError),

    #[error("administrator access entry rejected: {0}")]
    AccessEntry(#[from] AccessError),
}

impl AdmissionError {
    /// The coarse interaction status reported for this failure.
    pub fn im_status(&self) -> ImStatus {
        match self {
            Self::NotConfigured => ImStatus::UnsupportedCommand,
            Self::IcacTooLarge { .. } => ImStatus::InvalidCommand,
            Self::StageRoot(FabricError::TableFull { .. })
            | Self::AccessEntry(AccessError::TableFull { .. }) => ImStatus::ResourceExhausted,
            _ => ImStatus::Failure,
        }
    }

    /// The fine-grained admission outcome, when the failure has one.
    pub fn admission_outcome(&self) -> Option<JointFabricStatus> {
        match self {
            Self::EcosystemFabricMissing(_) => Some(JointFabricStatus::InvalidNoc),
            Self::StageRoot(FabricError::TableFull { .. }) => Some(JointFabricStatus::TableFull),
            Self::StageFabric(e) => Some(fabric_outcome(e)),
            Self::IdentityProtectionKey(GroupKeyError::TableFull { .. }) => {
                Some(JointFabricStatus::TableFull)
            }
            Self::IdentityProtectionKey(_) => Some(JointFabricStatus::InvalidNoc),
            Self::AccessEntry(AccessError::TableFull { .. }) => Some(JointFabricStatus::TableFull),
            Self::AccessEntry(_) => Some(JointFabricStatus::InvalidAdminSubject),
            _ => None,
        }
    }
}

/// Maps a fabric staging failure to the admission outcome it reports.
fn fabric_outcome(error: &FabricError) -> JointFabricStatus {
    match error {
        FabricError::TableFull { .. } => JointFabricStatus::TableFull,
        FabricError::InvalidPublicKey => JointFabricStatus::InvalidPublicKey,
        FabricError::WrongNodeId => JointFabricStatus::InvalidNodeOpId,
        FabricError::IncorrectState(_) => JointFabricStatus::MissingCsr,
        FabricError::FabricExists(_) => JointFabricStatus::FabricConflict,
        FabricError::InvalidFabricIndex(_) | FabricError::NotFound(_) => {
            JointFabricStatus::InvalidFabricIndex
        }
        _ => JointFabricStatus::InvalidNoc,
    }
}

/// Why a joint commissioning window could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("accessing fabric not found")]
    FabricNotFound,

    #[error("fail-safe is armed")]
    FailSafeArmed,

    #[error("a commissioning window is already open")]
    AlreadyOpen,

    #[error("PBKDF iteration count {0} out of range")]
    Iterations(u32),

    #[error("PBKDF salt length {0} out of range")]
    SaltLength(usize),

    #[error("commissioning timeout {secs}s outside {min}..={max}s")]
    Timeout { secs: u64, min: u64, max: u64 },

    #[error("discriminator {0:#x} exceeds 12 bits")]
    Discriminator(u16),

    #[error("passcode verifier is {0} bytes, expected 97")]
    Verifier(usize),
}

impl WindowError {
    /// The cluster-specific status, for failures that carry one.
    pub fn cluster_status(&self) -> Option<CommissioningWindowStatus> {
        match self {
            Self::FailSafeArmed | Self::AlreadyOpen => Some(CommissioningWindowStatus::Busy),
            Self::FabricNotFound
            | Self::Iterations(_)
            | Self::SaltLength(_)
            | Self::Verifier(_) => Some(CommissioningWindowStatus::PakeParameterError),
            Self::Timeout { .. } | Self::Discriminator(_) => None,
        }
    }

    /// The interaction status. Cluster-specific failures travel on
    /// `Failure`.
    pub fn im_status(&self) -> ImStatus {
        match self.cluster_status() {
            Some(_) => ImStatus::Failure,
            None => ImStatus::InvalidCommand,
        }
    }
}

/// A remote attribute read could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("read request to node {target} failed: {reason}")]
pub struct ReadError {
    pub target: NodeId,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_is_unsupported() {
        let err = AdmissionError::NotConfigured;
        assert_eq!(err.im_status(), ImStatus::UnsupportedCommand);
        assert_eq!(err.admission_outcome(), None);
    }

    #[test]
    fn staging_failures_carry_outcomes() {
        let conflict = AdmissionError::StageFabric(FabricError::FabricExists(FabricIndex::MIN));
        assert_eq!(conflict.im_status(), ImStatus::Failure);
        assert_eq!(
            conflict.admission_outcome(),
            Some(JointFabricStatus::FabricConflict)
        );

        let full = AdmissionError::StageRoot(FabricError::TableFull { max: 1 });
        assert_eq!(full.im_status(), ImStatus::ResourceExhausted);
        assert_eq!(full.admission_outcome(), Some(JointFabricStatus::TableFull));

        let missing = AdmissionError::StageFabric(FabricError::IncorrectState("no key"));
        assert_eq!(
            missing.admission_outcome(),
            Some(JointFabricStatus::MissingCsr)
        );

        let subject = AdmissionError::AccessEntry(AccessError::InvalidSubject(NodeId(0)));
        assert_eq!(
            subject.admission_outcome(),
            Some(JointFabricStatus::InvalidAdminSubject)
        );
    }

    #[test]
    fn window_statuses() {
        assert_eq!(
            WindowError::AlreadyOpen.cluster_status(),
            Some(CommissioningWindowStatus::Busy)
        );
        assert_eq!(WindowError::AlreadyOpen.im_status(), ImStatus::Failure);
        let timeout = WindowError::Timeout {
            secs: 10,
            min: 180,
            max: 900,
        };
        assert_eq!(timeout.cluster_status(), None);
        assert_eq!(timeout.im_status(), ImStatus::InvalidCommand);
    }
}
