//! Joint fabric administration.
//!
//! [`JointFabricAdministrator`] issues this node's intermediate CSR and
//! commits the certificate signed from it, admits new administrators onto
//! a fabric sharing the accessing fabric's root, and opens joint
//! commissioning windows. Commands run against a
//! [`NodeServices`] bundle holding the fabric table, fail-safe, access
//! control, group keys and the membership datastore.
//!
//! ```no_run
//! use std::sync::Arc;
//! use jointfab_admin::{JointFabricAdministrator, LoggingAdvertiser, NodeServices};
//! use jointfab_certs::LocalCredentialIssuer;
//! use jointfab_fabric::FabricTable;
//! use jointfab_types::FabricIndex;
//!
//! let services = NodeServices::new(FabricTable::in_memory(16), Arc::new(LoggingAdvertiser::new()));
//! let admin = JointFabricAdministrator::new()
//!     .with_issuer(Box::new(LocalCredentialIssuer::generate()))
//!     .with_ecosystem_fabric_index(FabricIndex::MIN);
//! # let _ = (services, admin);
//! ```

mod administrator;
mod advertiser;
mod context;
mod error;
mod reader;
mod window;

pub use administrator::{
    truncate_utf8, AdmissionResponse, AdmitRequest, AuthoritySigningRequest,
    JointFabricAdministrator, DEFAULT_FAIL_SAFE_TIMEOUT, MAX_DEBUG_TEXT_LENGTH,
};
pub use advertiser::{Advertiser, AdvertiserListener, LoggingAdvertiser};
pub use context::{CommandContext, NodeServices};
pub use error::{AdmissionError, ReadError, WindowError};
pub use reader::{
    AttributeData, AttributePath, MembershipReader, ReadClient, RemoteMembership,
    ADMINISTRATOR_FABRIC_INDEX_ATTRIBUTE_ID, DESCRIPTOR_CLUSTER_ID,
    JOINT_FABRIC_ADMINISTRATOR_CLUSTER_ID, JOINT_FABRIC_INFO_PATHS, PARTS_LIST_ATTRIBUTE_ID,
};
pub use window::{
    CommissioningWindowManager, JointWindowParams, OpenWindow, DEFAULT_MAX_COMMISSIONING_TIMEOUT,
    DEFAULT_MIN_COMMISSIONING_TIMEOUT, VERIFIER_LENGTH,
};
