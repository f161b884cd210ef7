//! Operational certificates for the joint fabric.
//!
//! A certificate exists in two encodings. The compact encoding is what the
//! fabric table stores and what travels in commands; the DER encoding is
//! what the credential issuer consumes and produces. Both carry the same
//! fields and the same signature, which covers the DER form of the
//! to-be-signed portion, so a certificate can be converted back and forth
//! without invalidating it.
//!
//! This crate also provides the certificate signing request used to prove
//! possession of an operational key, a [`CertificateAuthority`] helper for
//! minting root, intermediate and operational certificates, and the
//! [`CredentialIssuer`] abstraction the coordinator signs through.

mod authority;
mod cert;
mod csr;
mod der;
mod issuer;
mod tlv;

pub use authority::CertificateAuthority;
pub use cert::{Certificate, DistinguishedName, DnAttribute};
pub use csr::Csr;
pub use issuer::{CredentialIssuer, IssuerError, LocalCredentialIssuer};

use jointfab_types::{CatValues, FabricId, NodeId, TooManyCats};
use thiserror::Error;

/// Maximum size of a compact-encoded certificate.
pub const MAX_COMPACT_CERT_LENGTH: usize = 400;

/// Maximum size of a DER-encoded certificate.
pub const MAX_DER_CERT_LENGTH: usize = 600;

/// Length of an ed25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of an ed25519 signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Errors produced while encoding, decoding, or checking certificates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertError {
    /// The input ended before the structure was complete.
    #[error("certificate truncated")]
    Truncated,

    /// An element carried a different tag than the layout requires.
    #[error("unexpected tag 0x{found:02x}, expected 0x{expected:02x}")]
    UnexpectedTag {
        /// The tag the layout requires.
        expected: u8,
        /// The tag actually present.
        found: u8,
    },

    /// The structure is syntactically invalid.
    #[error("malformed certificate: {0}")]
    Malformed(&'static str),

    /// Bytes remain after the certificate.
    #[error("trailing data after certificate")]
    TrailingData,

    /// The encoding exceeds the maximum allowed size.
    #[error("encoded certificate is {len} bytes, max {max}")]
    TooLarge {
        /// Actual size.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// Well-formed, but uses an algorithm, version, or attribute this
    /// profile does not accept.
    #[error("unsupported certificate format: {0}")]
    UnsupportedFormat(&'static str),

    /// The subject distinguished name lacks a required attribute.
    #[error("certificate subject is missing {0}")]
    WrongCertDn(&'static str),

    /// The embedded public key is not a valid ed25519 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The signature does not verify under the issuer key.
    #[error("certificate signature does not verify")]
    InvalidSignature,

    /// A certificate signing request failed to parse or verify.
    #[error("invalid certificate signing request")]
    InvalidCsr,

    /// The X.509 structure failed to encode or parse.
    #[error("DER: {0}")]
    Der(#[from] x509_cert::der::Error),

    /// More CASE authenticated tags than a certificate may carry.
    #[error(transparent)]
    TooManyCats(#[from] TooManyCats),
}

/// Converts a compact-encoded certificate to DER.
pub fn compact_to_der(compact: &[u8]) -> Result<Vec<u8>, CertError> {
    Certificate::from_compact(compact)?.to_der()
}

/// Converts a DER-encoded certificate to the compact encoding.
pub fn der_to_compact(der: &[u8]) -> Result<Vec<u8>, CertError> {
    Certificate::from_der(der)?.to_compact()
}

/// Extracts the subject node id and fabric id from a compact operational
/// certificate.
///
/// # Errors
///
/// Returns [`CertError::WrongCertDn`] when either attribute is absent.
pub fn extract_node_id_fabric_id(compact: &[u8]) -> Result<(NodeId, FabricId), CertError> {
    let cert = Certificate::from_compact(compact)?;
    let node_id = cert.subject.node_id().ok_or(CertError::WrongCertDn("node id"))?;
    let fabric_id = cert
        .subject
        .fabric_id()
        .ok_or(CertError::WrongCertDn("fabric id"))?;
    Ok((node_id, fabric_id))
}

/// Extracts the CASE authenticated tags from a compact operational
/// certificate. A certificate without tags yields an empty set.
pub fn extract_cats(compact: &[u8]) -> Result<CatValues, CertError> {
    Certificate::from_compact(compact)?.subject.cats()
}

/// Extracts the subject public key from a compact certificate.
pub fn extract_public_key(compact: &[u8]) -> Result<[u8; PUBLIC_KEY_LENGTH], CertError> {
    Ok(Certificate::from_compact(compact)?.public_key)
}

/// Checks that `subject` (compact) was signed by the key in `issuer`
/// (compact).
pub fn verify_signed_by(subject: &[u8], issuer: &[u8]) -> Result<(), CertError> {
    let subject = Certificate::from_compact(subject)?;
    let issuer = Certificate::from_compact(issuer)?;
    subject.verify_signed_by(&issuer.public_key)
}
