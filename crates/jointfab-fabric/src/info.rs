//! Committed fabric records.

use hkdf::Hkdf;
use jointfab_certs::PUBLIC_KEY_LENGTH;
use jointfab_types::{FabricId, FabricIndex, NodeId, VendorId};
use sha2::Sha256;

use crate::FabricError;

pub const COMPRESSED_FABRIC_ID_LENGTH: usize = 8;

const COMPRESSED_FABRIC_INFO: &[u8] = b"CompressedFabric";

/// One fabric this node belongs to. Certificates are compact-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricInfo {
    pub fabric_index: FabricIndex,
    pub vendor_id: VendorId,
    pub fabric_id: FabricId,
    /// This node's id within the fabric.
    pub node_id: NodeId,
    pub compressed_fabric_id: [u8; COMPRESSED_FABRIC_ID_LENGTH],
    pub root_cert: Vec<u8>,
    pub noc_cert: Vec<u8>,
    pub icac_cert: Option<Vec<u8>>,
}

impl FabricInfo {
    /// The compressed fabric id as a big-endian integer.
    pub fn compressed_fabric_id_u64(&self) -> u64 {
        u64::from_be_bytes(self.compressed_fabric_id)
    }
}

/// Derives the 64-bit compressed fabric id that scopes operational
/// discovery and group keys.
///
/// `HKDF-SHA256(ikm = root public key, salt = fabric id (big-endian),
/// info = "CompressedFabric")`, truncated to eight bytes.
pub fn compressed_fabric_id(
    root_public_key: &[u8; PUBLIC_KEY_LENGTH],
    fabric_id: FabricId,
) -> Result<[u8; COMPRESSED_FABRIC_ID_LENGTH], FabricError> {
    let hk = Hkdf::<Sha256>::new(Some(&fabric_id.0.to_be_bytes()), root_public_key);
    let mut out = [0u8; COMPRESSED_FABRIC_ID_LENGTH];
    hk.expand(COMPRESSED_FABRIC_INFO, &mut out)
        .map_err(|_| FabricError::KeyDerivation)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_id_depends_on_root_and_fabric() {
        let a = compressed_fabric_id(&[1; PUBLIC_KEY_LENGTH], FabricId(1)).expect("derive");
        let b = compressed_fabric_id(&[1; PUBLIC_KEY_LENGTH], FabricId(2)).expect("derive");
        let c = compressed_fabric_id(&[2; PUBLIC_KEY_LENGTH], FabricId(1)).expect("derive");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(
            a,
            compressed_fabric_id(&[1; PUBLIC_KEY_LENGTH], FabricId(1)).expect("derive")
        );
    }
}
