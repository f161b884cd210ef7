//! The secure session a command arrived on.

use jointfab_types::{AuthMode, CatValues, FabricIndex, NodeId};
use thiserror::Error;

/// Subject id used for passcode sessions (passcode id 0).
const PASE_SUBJECT: NodeId = NodeId(0xFFFF_FFFB_0000_0000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// Passcode-authenticated, established before the peer joined a fabric.
    Pase,
    /// Certificate-authenticated, scoped to one fabric.
    Case,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Only passcode sessions may adopt a fabric index.
    #[error("only PASE sessions can adopt a fabric index")]
    NotPase,
}

/// Who is asking, as seen by access control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectDescriptor {
    /// The accessing fabric; `None` for a PASE session that has not yet
    /// adopted one.
    pub fabric_index: Option<FabricIndex>,
    pub auth_mode: AuthMode,
    pub subject: NodeId,
    pub cats: CatValues,
}

#[derive(Debug, Clone)]
pub struct SecureSession {
    session_type: SessionType,
    fabric_index: Option<FabricIndex>,
    peer_node_id: NodeId,
    peer_cats: CatValues,
}

impl SecureSession {
    /// A fresh passcode session with no fabric.
    pub fn pase() -> Self {
        Self {
            session_type: SessionType::Pase,
            fabric_index: None,
            peer_node_id: PASE_SUBJECT,
            peer_cats: CatValues::new(),
        }
    }

    /// An operational session on `fabric_index` with the given peer.
    pub fn case(fabric_index: FabricIndex, peer_node_id: NodeId, peer_cats: CatValues) -> Self {
        Self {
            session_type: SessionType::Case,
            fabric_index: Some(fabric_index),
            peer_node_id,
            peer_cats,
        }
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn fabric_index(&self) -> Option<FabricIndex> {
        self.fabric_index
    }

    pub fn peer_node_id(&self) -> NodeId {
        self.peer_node_id
    }

    /// Re-scopes a PASE session to a newly joined fabric so later commands
    /// on it access that fabric.
    pub fn adopt_fabric_index(&mut self, fabric_index: FabricIndex) -> Result<(), SessionError> {
        if self.session_type != SessionType::Pase {
            return Err(SessionError::NotPase);
        }
        tracing::debug!(fabric_index = fabric_index.get(), "PASE session adopted fabric");
        self.fabric_index = Some(fabric_index);
        Ok(())
    }

    pub fn subject_descriptor(&self) -> SubjectDescriptor {
        SubjectDescriptor {
            fabric_index: self.fabric_index,
            auth_mode: match self.session_type {
                SessionType::Pase => AuthMode::Pase,
                SessionType::Case => AuthMode::Case,
            },
            subject: self.peer_node_id,
            cats: self.peer_cats.clone(),
        }
    }
}
