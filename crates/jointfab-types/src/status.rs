//! Protocol-visible status codes.
//!
//! Three independent enumerations reach the requester:
//!
//! - [`ImStatus`]: the coarse interaction status attached to every command.
//! - [`JointFabricStatus`]: the fine-grained admission outcome carried in the
//!   admission response payload when the command itself was accepted.
//! - [`CommissioningWindowStatus`]: cluster-specific failures of the
//!   commissioning-window command.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse interaction status of a command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImStatus {
    Success,
    Failure,
    InvalidCommand,
    UnsupportedCommand,
    ConstraintError,
    ResourceExhausted,
}

impl ImStatus {
    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::Failure => 0x01,
            Self::UnsupportedCommand => 0x81,
            Self::InvalidCommand => 0x85,
            Self::ConstraintError => 0x87,
            Self::ResourceExhausted => 0x89,
        }
    }
}

impl fmt::Display for ImStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::UnsupportedCommand => "UNSUPPORTED_COMMAND",
            Self::ConstraintError => "CONSTRAINT_ERROR",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
        };
        write!(f, "{label}(0x{:02x})", self.code())
    }
}

/// Fine-grained outcome of an administrator admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum JointFabricStatus {
    Ok = 0,
    InvalidPublicKey = 1,
    InvalidNodeOpId = 2,
    InvalidNoc = 3,
    MissingCsr = 4,
    TableFull = 5,
    InvalidAdminSubject = 6,
    FabricConflict = 9,
    InvalidFabricIndex = 11,
}

impl JointFabricStatus {
    /// Returns the wire code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a wire code.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::InvalidPublicKey),
            2 => Some(Self::InvalidNodeOpId),
            3 => Some(Self::InvalidNoc),
            4 => Some(Self::MissingCsr),
            5 => Some(Self::TableFull),
            6 => Some(Self::InvalidAdminSubject),
            9 => Some(Self::FabricConflict),
            11 => Some(Self::InvalidFabricIndex),
            _ => None,
        }
    }
}

/// Cluster-specific status codes of the commissioning-window command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum CommissioningWindowStatus {
    /// A window is already open or a fail-safe is armed.
    Busy = 2,
    /// The PAKE parameters (verifier, iterations, salt) are unusable.
    PakeParameterError = 3,
    /// No window is open.
    WindowNotOpen = 4,
}

impl CommissioningWindowStatus {
    /// Returns the wire code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_fabric_status_round_trip() {
        for code in 0u8..=12 {
            if let Some(status) = JointFabricStatus::from_u8(code) {
                assert_eq!(status.as_u8(), code);
            }
        }
        assert_eq!(JointFabricStatus::from_u8(7), None);
        assert_eq!(JointFabricStatus::FabricConflict.as_u8(), 9);
    }

    #[test]
    fn im_status_codes_are_distinct() {
        let all = [
            ImStatus::Success,
            ImStatus::Failure,
            ImStatus::InvalidCommand,
            ImStatus::UnsupportedCommand,
            ImStatus::ConstraintError,
            ImStatus::ResourceExhausted,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
        assert_eq!(ImStatus::ResourceExhausted.to_string(), "RESOURCE_EXHAUSTED(0x89)");
    }

    #[test]
    fn statuses_serialize_as_labels() {
        assert_eq!(
            serde_json::to_string(&JointFabricStatus::InvalidAdminSubject).unwrap(),
            "\"INVALID_ADMIN_SUBJECT\""
        );
        assert_eq!(
            serde_json::to_string(&CommissioningWindowStatus::Busy).unwrap(),
            "\"BUSY\""
        );
    }
}
