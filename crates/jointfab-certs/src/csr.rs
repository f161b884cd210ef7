//! Certificate signing requests.
//!
//! A request is two compact elements: the requested public key and a
//! proof-of-possession signature over a domain tag followed by that key.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::{CertError, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

const TAG_PUBLIC_KEY: u8 = 0x01;
const TAG_PROOF: u8 = 0x02;
const PROOF_DOMAIN: &[u8] = b"jointfab-csr-v1";

/// Encoded length of every request.
pub const CSR_LENGTH: usize = 3 + PUBLIC_KEY_LENGTH + 3 + SIGNATURE_LENGTH;

/// A verified certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Csr {
    public_key: [u8; PUBLIC_KEY_LENGTH],
    proof: [u8; SIGNATURE_LENGTH],
}

fn proof_message(public_key: &[u8; PUBLIC_KEY_LENGTH]) -> Vec<u8> {
    let mut message = Vec::with_capacity(PROOF_DOMAIN.len() + PUBLIC_KEY_LENGTH);
    message.extend_from_slice(PROOF_DOMAIN);
    message.extend_from_slice(public_key);
    message
}

impl Csr {
    /// Creates a request for `key`'s public half.
    pub fn new(key: &SigningKey) -> Self {
        let public_key = key.verifying_key().to_bytes();
        let proof = key.sign(&proof_message(&public_key)).to_bytes();
        Self { public_key, proof }
    }

    /// The requested public key.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.public_key
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CSR_LENGTH);
        out.push(TAG_PUBLIC_KEY);
        out.extend_from_slice(&(PUBLIC_KEY_LENGTH as u16).to_le_bytes());
        out.extend_from_slice(&self.public_key);
        out.push(TAG_PROOF);
        out.extend_from_slice(&(SIGNATURE_LENGTH as u16).to_le_bytes());
        out.extend_from_slice(&self.proof);
        out
    }

    /// Parses a request and checks its proof of possession.
    ///
    /// # Errors
    ///
    /// Any structural problem or failed proof yields [`CertError::InvalidCsr`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CertError> {
        if bytes.len() != CSR_LENGTH {
            return Err(CertError::InvalidCsr);
        }
        let (key_part, proof_part) = bytes.split_at(3 + PUBLIC_KEY_LENGTH);
        if key_part[..3] != [TAG_PUBLIC_KEY, PUBLIC_KEY_LENGTH as u8, 0]
            || proof_part[..3] != [TAG_PROOF, SIGNATURE_LENGTH as u8, 0]
        {
            return Err(CertError::InvalidCsr);
        }
        let public_key: [u8; PUBLIC_KEY_LENGTH] =
            key_part[3..].try_into().map_err(|_| CertError::InvalidCsr)?;
        let proof: [u8; SIGNATURE_LENGTH] =
            proof_part[3..].try_into().map_err(|_| CertError::InvalidCsr)?;

        let key = VerifyingKey::from_bytes(&public_key).map_err(|_| CertError::InvalidCsr)?;
        key.verify_strict(&proof_message(&public_key), &Signature::from_bytes(&proof))
            .map_err(|_| CertError::InvalidCsr)?;

        Ok(Self { public_key, proof })
    }
}
