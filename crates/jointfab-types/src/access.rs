//! Access-control vocabulary shared by the access store and the datastore.

use serde::{Deserialize, Serialize};

use crate::{FabricIndex, NodeId};

/// Privilege levels granted by an access entry, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Privilege {
    /// Read attributes and receive events.
    View = 1,
    /// View on behalf of another node.
    ProxyView = 2,
    /// Invoke operational commands.
    Operate = 3,
    /// Change persistent configuration.
    Manage = 4,
    /// Full administrative control, including access control itself.
    Administer = 5,
}

impl Privilege {
    /// Returns the numeric code for this privilege.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a numeric code to a `Privilege`.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::View),
            2 => Some(Self::ProxyView),
            3 => Some(Self::Operate),
            4 => Some(Self::Manage),
            5 => Some(Self::Administer),
            _ => None,
        }
    }
}

/// The authentication mode an access entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuthMode {
    /// Passcode-authenticated (lightweight, pre-operational) sessions.
    Pase = 1,
    /// Certificate-authenticated operational sessions.
    Case = 2,
    /// Group-keyed multicast messages.
    Group = 3,
}

impl AuthMode {
    /// Returns the numeric code for this mode.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a numeric code to an `AuthMode`.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Pase),
            2 => Some(Self::Case),
            3 => Some(Self::Group),
            _ => None,
        }
    }

    /// Returns the string label for this mode.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pase => "PASE",
            Self::Case => "CASE",
            Self::Group => "GROUP",
        }
    }
}

/// One access-control entry, scoped to a single fabric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    /// The fabric this entry belongs to.
    pub fabric_index: FabricIndex,
    /// The privilege granted to the subjects.
    pub privilege: Privilege,
    /// The authentication mode the subjects must use.
    pub auth_mode: AuthMode,
    /// Subject identities: operational node ids or CASE authenticated tags.
    pub subjects: Vec<NodeId>,
}

impl AccessEntry {
    /// Builds the administer-level CASE entry granted to a newly admitted
    /// administrator.
    pub fn administer(fabric_index: FabricIndex, subject: NodeId) -> Self {
        Self {
            fabric_index,
            privilege: Privilege::Administer,
            auth_mode: AuthMode::Case,
            subjects: vec![subject],
        }
    }
}
