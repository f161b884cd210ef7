//! Per-fabric group key sets.

use std::collections::BTreeMap;

use hkdf::Hkdf;
use jointfab_types::{FabricIndex, GroupKeySet, EPOCH_KEY_LENGTH, MAX_EPOCH_KEYS};
use sha2::Sha256;
use thiserror::Error;

/// Default number of key sets each fabric may hold, the identity
/// protection key included.
pub const DEFAULT_MAX_KEY_SETS_PER_FABRIC: usize = 3;

const COMPRESSED_FABRIC_ID_LENGTH: usize = 8;
const GROUP_KEY_INFO: &[u8] = b"GroupKey v1.0";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupKeyError {
    #[error("compressed fabric id must be 8 bytes, got {0}")]
    InvalidCompressedFabricId(usize),

    #[error("key set {0} must carry between 1 and 3 epoch keys")]
    InvalidEpochKeys(u16),

    #[error("fabric {fabric_index} already holds {max} key sets")]
    TableFull { fabric_index: FabricIndex, max: usize },

    #[error("key set {key_set_id} not found on fabric {fabric_index}")]
    NotFound {
        fabric_index: FabricIndex,
        key_set_id: u16,
    },

    #[error("operational key derivation failed")]
    KeyDerivation,
}

#[derive(Debug)]
struct FabricKeySets {
    compressed_fabric_id: [u8; COMPRESSED_FABRIC_ID_LENGTH],
    sets: BTreeMap<u16, GroupKeySet>,
}

/// Group key sets for every fabric, scoped by compressed fabric id.
#[derive(Debug)]
pub struct GroupKeyStore {
    fabrics: BTreeMap<FabricIndex, FabricKeySets>,
    max_key_sets_per_fabric: usize,
}

impl Default for GroupKeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEY_SETS_PER_FABRIC)
    }
}

impl GroupKeyStore {
    pub fn new(max_key_sets_per_fabric: usize) -> Self {
        Self {
            fabrics: BTreeMap::new(),
            max_key_sets_per_fabric,
        }
    }

    /// Inserts or replaces a key set on `fabric_index`.
    pub fn set_key_set(
        &mut self,
        fabric_index: FabricIndex,
        compressed_fabric_id: &[u8],
        key_set: GroupKeySet,
    ) -> Result<(), GroupKeyError> {
        let compressed: [u8; COMPRESSED_FABRIC_ID_LENGTH] = compressed_fabric_id
            .try_into()
            .map_err(|_| GroupKeyError::InvalidCompressedFabricId(compressed_fabric_id.len()))?;
        if key_set.epoch_keys.is_empty() || key_set.epoch_keys.len() > MAX_EPOCH_KEYS {
            return Err(GroupKeyError::InvalidEpochKeys(key_set.group_key_set_id));
        }

        let fabric = self
            .fabrics
            .entry(fabric_index)
            .or_insert_with(|| FabricKeySets {
                compressed_fabric_id: compressed,
                sets: BTreeMap::new(),
            });
        if !fabric.sets.contains_key(&key_set.group_key_set_id)
            && fabric.sets.len() >= self.max_key_sets_per_fabric
        {
            return Err(GroupKeyError::TableFull {
                fabric_index,
                max: self.max_key_sets_per_fabric,
            });
        }
        fabric.compressed_fabric_id = compressed;

        tracing::debug!(
            fabric_index = fabric_index.get(),
            key_set_id = key_set.group_key_set_id,
            epoch_keys = key_set.epoch_keys.len(),
            "group key set stored"
        );
        fabric.sets.insert(key_set.group_key_set_id, key_set);
        Ok(())
    }

    pub fn get_key_set(&self, fabric_index: FabricIndex, key_set_id: u16) -> Option<&GroupKeySet> {
        self.fabrics.get(&fabric_index)?.sets.get(&key_set_id)
    }

    pub fn remove_key_set(
        &mut self,
        fabric_index: FabricIndex,
        key_set_id: u16,
    ) -> Result<GroupKeySet, GroupKeyError> {
        self.fabrics
            .get_mut(&fabric_index)
            .and_then(|f| f.sets.remove(&key_set_id))
            .ok_or(GroupKeyError::NotFound {
                fabric_index,
                key_set_id,
            })
    }

    /// Drops every key set of `fabric_index`.
    pub fn remove_fabric(&mut self, fabric_index: FabricIndex) {
        if self.fabrics.remove(&fabric_index).is_some() {
            tracing::debug!(fabric_index = fabric_index.get(), "group key sets dropped");
        }
    }

    /// Key-set ids present on a fabric, ascending.
    pub fn key_set_ids(&self, fabric_index: FabricIndex) -> Vec<u16> {
        self.fabrics
            .get(&fabric_index)
            .map(|f| f.sets.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Derives the operational group key for one epoch key of a set:
    /// `HKDF-SHA256(ikm = epoch key, salt = compressed fabric id,
    /// info = "GroupKey v1.0")`.
    pub fn operational_key(
        &self,
        fabric_index: FabricIndex,
        key_set_id: u16,
        epoch: usize,
    ) -> Result<[u8; EPOCH_KEY_LENGTH], GroupKeyError> {
        let not_found = GroupKeyError::NotFound {
            fabric_index,
            key_set_id,
        };
        let fabric = self.fabrics.get(&fabric_index).ok_or(not_found.clone())?;
        let epoch_key = fabric
            .sets
            .get(&key_set_id)
            .and_then(|s| s.epoch_keys.get(epoch))
            .ok_or(not_found)?;

        let hk = Hkdf::<Sha256>::new(Some(&fabric.compressed_fabric_id), &epoch_key.key);
        let mut out = [0u8; EPOCH_KEY_LENGTH];
        hk.expand(GROUP_KEY_INFO, &mut out)
            .map_err(|_| GroupKeyError::KeyDerivation)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jointfab_types::{EpochKey, GroupKeySecurityPolicy, IDENTITY_PROTECTION_KEY_SET_ID};

    const CFID: [u8; 8] = [0x87, 0xE1, 0xB0, 0x04, 0xE2, 0x35, 0xA1, 0x30];

    fn fabric(i: u8) -> FabricIndex {
        FabricIndex::new(i).expect("index")
    }

    fn key_set(id: u16) -> GroupKeySet {
        GroupKeySet {
            group_key_set_id: id,
            security_policy: GroupKeySecurityPolicy::TrustFirst,
            epoch_keys: vec![EpochKey {
                key: [id as u8; EPOCH_KEY_LENGTH],
                start_time: 0,
            }],
        }
    }

    #[test]
    fn stores_identity_protection_key() {
        let mut store = GroupKeyStore::default();
        store
            .set_key_set(fabric(1), &CFID, GroupKeySet::default_identity_protection_key())
            .expect("set");
        let ipk = store
            .get_key_set(fabric(1), IDENTITY_PROTECTION_KEY_SET_ID)
            .expect("ipk present");
        assert_eq!(&ipk.epoch_keys[0].key, b"temporary ipk 01");
        assert!(store.get_key_set(fabric(2), IDENTITY_PROTECTION_KEY_SET_ID).is_none());
    }

    #[test]
    fn validates_inputs() {
        let mut store = GroupKeyStore::default();
        assert_eq!(
            store.set_key_set(fabric(1), &CFID[..4], key_set(1)),
            Err(GroupKeyError::InvalidCompressedFabricId(4))
        );
        assert_eq!(
            store.set_key_set(fabric(1), &CFID, GroupKeySet::bare(5)),
            Err(GroupKeyError::InvalidEpochKeys(5))
        );
    }

    #[test]
    fn per_fabric_capacity_allows_replacement() {
        let mut store = GroupKeyStore::new(2);
        store.set_key_set(fabric(1), &CFID, key_set(1)).expect("1");
        store.set_key_set(fabric(1), &CFID, key_set(2)).expect("2");
        assert!(matches!(
            store.set_key_set(fabric(1), &CFID, key_set(3)),
            Err(GroupKeyError::TableFull { max: 2, .. })
        ));
        store.set_key_set(fabric(1), &CFID, key_set(2)).expect("replace");
        assert_eq!(store.key_set_ids(fabric(1)), vec![1, 2]);

        store.remove_key_set(fabric(1), 1).expect("remove");
        assert!(store.remove_key_set(fabric(1), 1).is_err());
        store.set_key_set(fabric(1), &CFID, key_set(3)).expect("room again");

        store.remove_fabric(fabric(1));
        assert!(store.key_set_ids(fabric(1)).is_empty());
    }

    #[test]
    fn operational_key_depends_on_fabric_scope() {
        let mut store = GroupKeyStore::default();
        store.set_key_set(fabric(1), &CFID, key_set(1)).expect("set");
        store.set_key_set(fabric(2), &[0u8; 8], key_set(1)).expect("set");
        let a = store.operational_key(fabric(1), 1, 0).expect("derive");
        let b = store.operational_key(fabric(2), 1, 0).expect("derive");
        assert_ne!(a, b);
        assert!(store.operational_key(fabric(1), 1, 1).is_err());
    }
}
