//! The fabric transaction table.
//!
//! Holds the committed fabrics of this node plus at most one pending
//! fabric-join transaction. A join is staged step by step (operational
//! key, trusted root, operational certificate) and only becomes visible as
//! a committed fabric when [`FabricTable::commit_pending_fabric_data`]
//! succeeds. Starting a new transaction discards any uncommitted one.
//!
//! The [`FailSafeContext`] bounds how long a pending transaction may live:
//! once its deadline passes, the transaction is reverted.

mod fail_safe;
mod info;
mod store;
mod table;

pub use fail_safe::FailSafeContext;
pub use info::{compressed_fabric_id, FabricInfo, COMPRESSED_FABRIC_ID_LENGTH};
pub use store::{FabricStore, MemoryFabricStore, SqliteFabricStore, StoreError};
pub use table::{FabricTable, DEFAULT_MAX_FABRICS};

use jointfab_certs::CertError;
use jointfab_types::FabricIndex;
use thiserror::Error;

/// Errors returned by the fabric table.
#[derive(Debug, Error)]
pub enum FabricError {
    /// No committed fabric at this index.
    #[error("no fabric at index {0}")]
    NotFound(FabricIndex),

    /// The index does not name a committed fabric where one is required.
    #[error("invalid fabric index {0}")]
    InvalidFabricIndex(FabricIndex),

    /// The operation is not legal in the current transaction state.
    #[error("incorrect transaction state: {0}")]
    IncorrectState(&'static str),

    /// All fabric slots are in use.
    #[error("fabric table full ({max} fabrics)")]
    TableFull {
        /// Configured capacity.
        max: usize,
    },

    /// A certificate failed to parse or verify.
    #[error("invalid certificate: {0}")]
    CertificateInvalid(#[from] CertError),

    /// The operational certificate does not carry the pending key.
    #[error("operational certificate public key does not match the pending key")]
    InvalidPublicKey,

    /// The operational certificate's node id is not operational.
    #[error("operational certificate carries a non-operational node id")]
    WrongNodeId,

    /// A committed fabric already has this root and fabric id.
    #[error("fabric already committed at index {0}")]
    FabricExists(FabricIndex),

    /// Compressed fabric id derivation failed.
    #[error("compressed fabric id derivation failed")]
    KeyDerivation,

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
