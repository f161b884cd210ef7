//! Shared identifiers, access vocabulary, and status codes for the joint
//! fabric platform.
//!
//! Every other `jointfab-*` crate depends on this one for the values that
//! cross component boundaries: node and fabric identifiers, vendor ids,
//! CASE authenticated tags, privilege levels, group key sets, access
//! entries, and the protocol-visible status enumerations.
//!
//! Keeping these definitions in a leaf crate keeps the dependency graph
//! acyclic: the certificate codec, the fabric table, the access-control
//! store, and the membership datastore all agree on the same types without
//! depending on each other.

use serde::{Deserialize, Serialize};
use std::fmt;

mod access;
mod keyset;
mod status;

pub use access::{AccessEntry, AuthMode, Privilege};
pub use keyset::{
    EpochKey, GroupKeySecurityPolicy, GroupKeySet, IDENTITY_PROTECTION_KEY_SET_ID,
    DEFAULT_IPK, EPOCH_KEY_LENGTH, MAX_EPOCH_KEYS,
};
pub use status::{CommissioningWindowStatus, ImStatus, JointFabricStatus};

/// Smallest node id in the operational range.
pub const MIN_OPERATIONAL_NODE_ID: u64 = 0x0000_0000_0000_0001;
/// Largest node id in the operational range.
pub const MAX_OPERATIONAL_NODE_ID: u64 = 0xFFFF_FFEF_FFFF_FFFF;

const CASE_AUTH_TAG_MASK: u64 = 0xFFFF_FFFF_0000_0000;
const CASE_AUTH_TAG_PREFIX: u64 = 0xFFFF_FFFD_0000_0000;

/// Maximum number of CASE authenticated tags carried by one certificate.
pub const MAX_CASE_AUTH_TAGS: usize = 3;

/// A 64-bit node identifier.
///
/// The same 64-bit space carries operational node ids and CASE
/// authenticated tags used as access-control subjects; see
/// [`NodeId::is_operational`] and [`NodeId::is_case_auth_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Returns the raw identifier.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` if this id is inside the operational node id range.
    pub fn is_operational(self) -> bool {
        (MIN_OPERATIONAL_NODE_ID..=MAX_OPERATIONAL_NODE_ID).contains(&self.0)
    }

    /// Returns `true` if this id encodes a CASE authenticated tag subject.
    pub fn is_case_auth_tag(self) -> bool {
        self.0 & CASE_AUTH_TAG_MASK == CASE_AUTH_TAG_PREFIX
    }

    /// Builds the subject id that represents `tag` in an access entry.
    pub fn from_case_auth_tag(tag: CaseAuthTag) -> Self {
        Self(CASE_AUTH_TAG_PREFIX | u64::from(tag.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// A 64-bit fabric identifier, scoped by the fabric's trusted root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FabricId(pub u64);

impl FabricId {
    /// Returns the raw identifier.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Fabric id 0 is reserved and never valid on a certificate.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for FabricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// A locally-unique fabric index.
///
/// Valid indices are `1..=254`. The wire value `0` means "no fabric" and is
/// represented as `Option::<FabricIndex>::None` rather than as a value of
/// this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FabricIndex(u8);

impl FabricIndex {
    /// Smallest valid fabric index.
    pub const MIN: FabricIndex = FabricIndex(1);
    /// Largest valid fabric index.
    pub const MAX: FabricIndex = FabricIndex(254);

    /// Wraps a raw index, returning `None` for the reserved values 0 and 255.
    pub fn new(raw: u8) -> Option<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&raw) {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Returns the raw index.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FabricIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<FabricIndex> for u8 {
    fn from(index: FabricIndex) -> Self {
        index.0
    }
}

impl TryFrom<u8> for FabricIndex {
    type Error = InvalidFabricIndex;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        FabricIndex::new(raw).ok_or(InvalidFabricIndex(raw))
    }
}

/// Error returned when a raw value is outside the fabric index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid fabric index: {0}")]
pub struct InvalidFabricIndex(pub u8);

/// A 16-bit vendor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(pub u16);

impl VendorId {
    /// The "not specified" sentinel. A fabric carrying it has no known vendor.
    pub const NOT_SPECIFIED: VendorId = VendorId(0);

    /// Returns `true` unless this is the [`VendorId::NOT_SPECIFIED`] sentinel.
    pub fn is_specified(self) -> bool {
        self != Self::NOT_SPECIFIED
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// A CASE authenticated tag: 16-bit identifier, 16-bit version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseAuthTag(pub u32);

impl CaseAuthTag {
    /// The tag identifier (upper 16 bits).
    pub fn identifier(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// The tag version (lower 16 bits). Version 0 is invalid.
    pub fn version(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Returns `true` when the version is non-zero.
    pub fn is_valid(self) -> bool {
        self.version() != 0
    }
}

/// The set of CASE authenticated tags carried by one operational certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatValues(Vec<CaseAuthTag>);

/// Error returned when more than [`MAX_CASE_AUTH_TAGS`] tags are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("too many CASE authenticated tags: {0} (max 3)")]
pub struct TooManyCats(pub usize);

impl CatValues {
    /// An empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tag set, rejecting more than [`MAX_CASE_AUTH_TAGS`] entries.
    pub fn from_tags(tags: Vec<CaseAuthTag>) -> Result<Self, TooManyCats> {
        if tags.len() > MAX_CASE_AUTH_TAGS {
            return Err(TooManyCats(tags.len()));
        }
        Ok(Self(tags))
    }

    /// Appends a tag.
    pub fn push(&mut self, tag: CaseAuthTag) -> Result<(), TooManyCats> {
        if self.0.len() >= MAX_CASE_AUTH_TAGS {
            return Err(TooManyCats(self.0.len() + 1));
        }
        self.0.push(tag);
        Ok(())
    }

    /// Returns the tags in certificate order.
    pub fn tags(&self) -> &[CaseAuthTag] {
        &self.0
    }

    /// Returns `true` if no tags are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operational_node_id_range() {
        assert!(!NodeId(0).is_operational());
        assert!(NodeId(1).is_operational());
        assert!(NodeId(MAX_OPERATIONAL_NODE_ID).is_operational());
        assert!(!NodeId(MAX_OPERATIONAL_NODE_ID + 1).is_operational());
    }

    #[test]
    fn case_auth_tag_subjects() {
        let tag = CaseAuthTag(0xABCD_0001);
        let subject = NodeId::from_case_auth_tag(tag);
        assert_eq!(subject.get(), 0xFFFF_FFFD_ABCD_0001);
        assert!(subject.is_case_auth_tag());
        assert!(!subject.is_operational());
        assert!(!NodeId(42).is_case_auth_tag());
    }

    #[test]
    fn cat_accessors() {
        let tag = CaseAuthTag(0x1234_0002);
        assert_eq!(tag.identifier(), 0x1234);
        assert_eq!(tag.version(), 2);
        assert!(tag.is_valid());
        assert!(!CaseAuthTag(0x1234_0000).is_valid());
    }

    #[test]
    fn cat_values_are_bounded() {
        let mut cats = CatValues::new();
        for i in 1..=3 {
            cats.push(CaseAuthTag(i)).unwrap();
        }
        assert_eq!(cats.push(CaseAuthTag(4)), Err(TooManyCats(4)));
        assert_eq!(cats.tags().len(), 3);
        assert!(CatValues::from_tags(vec![CaseAuthTag(1); 4]).is_err());
    }

    #[test]
    fn fabric_index_rejects_reserved_values() {
        assert_eq!(FabricIndex::new(0), None);
        assert_eq!(FabricIndex::new(255), None);
        assert_eq!(FabricIndex::new(7).map(FabricIndex::get), Some(7));
        assert_eq!(FabricIndex::try_from(0u8), Err(InvalidFabricIndex(0)));
    }

    #[test]
    fn fabric_index_serde_validates() {
        let index: FabricIndex = serde_json::from_str("3").unwrap();
        assert_eq!(index.get(), 3);
        assert!(serde_json::from_str::<FabricIndex>("0").is_err());
        assert_eq!(serde_json::to_string(&index).unwrap(), "3");
    }

    #[test]
    fn vendor_id_sentinel() {
        assert!(!VendorId::NOT_SPECIFIED.is_specified());
        assert!(VendorId(0xFFF1).is_specified());
        assert_eq!(VendorId(0xFFF1).to_string(), "0xFFF1");
    }

    #[test]
    fn node_id_display_is_hex() {
        assert_eq!(NodeId(0x1B669).to_string(), "0x000000000001B669");
    }
}
