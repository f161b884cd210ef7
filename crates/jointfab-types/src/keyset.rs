//! Group key set definitions.

use serde::{Deserialize, Serialize};

/// The reserved key-set id holding a fabric's identity protection key.
pub const IDENTITY_PROTECTION_KEY_SET_ID: u16 = 0;

/// Length in bytes of one epoch key.
pub const EPOCH_KEY_LENGTH: usize = 16;

/// Maximum number of epoch keys in one key set.
pub const MAX_EPOCH_KEYS: usize = 3;

/// The well-known default identity protection key (`"temporary ipk 01"`).
pub const DEFAULT_IPK: [u8; EPOCH_KEY_LENGTH] = *b"temporary ipk 01";

/// How receivers pick among the epoch keys of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKeySecurityPolicy {
    /// Use the first key whose start time has passed.
    TrustFirst,
    /// Cache keys and synchronize epochs.
    CacheAndSync,
}

/// A time-scoped symmetric key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochKey {
    /// The key material.
    pub key: [u8; EPOCH_KEY_LENGTH],
    /// Epoch start time in microseconds; 0 means "immediately".
    pub start_time: u64,
}

/// A group key set: an id, a security policy, and up to three epoch keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKeySet {
    /// Unique key-set id.
    pub group_key_set_id: u16,
    /// Epoch key selection policy.
    pub security_policy: GroupKeySecurityPolicy,
    /// The epoch keys, oldest first. Empty for a bare placeholder entry.
    pub epoch_keys: Vec<EpochKey>,
}

impl GroupKeySet {
    /// A placeholder entry carrying only an id.
    pub fn bare(group_key_set_id: u16) -> Self {
        Self {
            group_key_set_id,
            security_policy: GroupKeySecurityPolicy::TrustFirst,
            epoch_keys: Vec::new(),
        }
    }

    /// The identity protection key set populated from [`DEFAULT_IPK`].
    pub fn default_identity_protection_key() -> Self {
        Self {
            group_key_set_id: IDENTITY_PROTECTION_KEY_SET_ID,
            security_policy: GroupKeySecurityPolicy::TrustFirst,
            epoch_keys: vec![EpochKey {
                key: DEFAULT_IPK,
                start_time: 0,
            }],
        }
    }

    /// Returns `true` if this set is the identity protection key set.
    pub fn is_identity_protection_key(&self) -> bool {
        self.group_key_set_id == IDENTITY_PROTECTION_KEY_SET_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ipk_is_well_known() {
        let ipk = GroupKeySet::default_identity_protection_key();
        assert!(ipk.is_identity_protection_key());
        assert_eq!(ipk.epoch_keys.len(), 1);
        assert_eq!(&ipk.epoch_keys[0].key, b"temporary ipk 01");
        assert_eq!(ipk.epoch_keys[0].start_time, 0);
        assert_eq!(ipk.security_policy, GroupKeySecurityPolicy::TrustFirst);
    }

    #[test]
    fn bare_key_set_has_no_keys() {
        let ks = GroupKeySet::bare(7);
        assert_eq!(ks.group_key_set_id, 7);
        assert!(ks.epoch_keys.is_empty());
        assert_ne!(ks, GroupKeySet::bare(8));
    }
}
