//! Certificate model shared by both encodings.

use ed25519_dalek::{Signature, SigningKey, Signer, VerifyingKey};
use jointfab_types::{CaseAuthTag, CatValues, FabricId, NodeId};

use crate::{der, tlv, CertError, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// One attribute of a distinguished name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnAttribute {
    /// Operational node id of the subject.
    NodeId(NodeId),
    /// Identifier of an intermediate certificate authority.
    IcaId(u64),
    /// Identifier of a root certificate authority.
    RootCaId(u64),
    /// Fabric the certificate belongs to.
    FabricId(FabricId),
    /// A CASE authenticated tag; repeatable.
    CaseAuthTag(CaseAuthTag),
}

impl DnAttribute {
    /// Attribute code, shared by the compact tag and the last OID arc.
    pub fn code(&self) -> u8 {
        match self {
            Self::NodeId(_) => 1,
            Self::IcaId(_) => 3,
            Self::RootCaId(_) => 4,
            Self::FabricId(_) => 5,
            Self::CaseAuthTag(_) => 6,
        }
    }

    /// Rebuilds an attribute from its code and raw value. CAT values must
    /// fit in 32 bits.
    pub(crate) fn from_code(code: u8, value: u64) -> Result<Self, CertError> {
        match code {
            1 => Ok(Self::NodeId(NodeId(value))),
            3 => Ok(Self::IcaId(value)),
            4 => Ok(Self::RootCaId(value)),
            5 => Ok(Self::FabricId(FabricId(value))),
            6 => u32::try_from(value)
                .map(|v| Self::CaseAuthTag(CaseAuthTag(v)))
                .map_err(|_| CertError::Malformed("CASE authenticated tag exceeds 32 bits")),
            _ => Err(CertError::UnsupportedFormat("unknown DN attribute")),
        }
    }

    /// Raw numeric value.
    pub fn value(&self) -> u64 {
        match *self {
            Self::NodeId(id) => id.0,
            Self::IcaId(id) | Self::RootCaId(id) => id,
            Self::FabricId(id) => id.0,
            Self::CaseAuthTag(tag) => u64::from(tag.0),
        }
    }

    /// Width of the value in bytes.
    pub(crate) fn width(code: u8) -> usize {
        if code == 6 {
            4
        } else {
            8
        }
    }
}

/// An ordered list of DN attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    attributes: Vec<DnAttribute>,
}

impl DistinguishedName {
    /// An empty name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute.
    pub fn with(mut self, attribute: DnAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Appends an attribute in place.
    pub fn push(&mut self, attribute: DnAttribute) {
        self.attributes.push(attribute);
    }

    /// Attributes in encoding order.
    pub fn attributes(&self) -> &[DnAttribute] {
        &self.attributes
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.attributes.iter().find_map(|a| match a {
            DnAttribute::NodeId(id) => Some(*id),
            _ => None,
        })
    }

    pub fn fabric_id(&self) -> Option<FabricId> {
        self.attributes.iter().find_map(|a| match a {
            DnAttribute::FabricId(id) => Some(*id),
            _ => None,
        })
    }

    pub fn root_ca_id(&self) -> Option<u64> {
        self.attributes.iter().find_map(|a| match a {
            DnAttribute::RootCaId(id) => Some(*id),
            _ => None,
        })
    }

    pub fn ica_id(&self) -> Option<u64> {
        self.attributes.iter().find_map(|a| match a {
            DnAttribute::IcaId(id) => Some(*id),
            _ => None,
        })
    }

    /// Collects the CASE authenticated tags.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::TooManyCats`] if more than three are present.
    pub fn cats(&self) -> Result<CatValues, CertError> {
        let tags = self
            .attributes
            .iter()
            .filter_map(|a| match a {
                DnAttribute::CaseAuthTag(tag) => Some(*tag),
                _ => None,
            })
            .collect();
        Ok(CatValues::from_tags(tags)?)
    }
}

/// A decoded certificate.
///
/// Validity bounds are seconds since the epoch; `not_after == 0` means the
/// certificate has no well-defined expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub serial: u64,
    pub issuer: DistinguishedName,
    pub not_before: u32,
    pub not_after: u32,
    pub subject: DistinguishedName,
    pub public_key: [u8; PUBLIC_KEY_LENGTH],
    pub signature: [u8; SIGNATURE_LENGTH],
}

impl Certificate {
    /// Builds an unsigned certificate; call [`Certificate::sign`] next.
    pub fn unsigned(
        serial: u64,
        issuer: DistinguishedName,
        subject: DistinguishedName,
        public_key: [u8; PUBLIC_KEY_LENGTH],
    ) -> Self {
        Self {
            serial,
            issuer,
            not_before: 0,
            not_after: 0,
            subject,
            public_key,
            signature: [0; SIGNATURE_LENGTH],
        }
    }

    /// Signs the to-be-signed portion with `key`.
    pub fn sign(mut self, key: &SigningKey) -> Result<Self, CertError> {
        let tbs = der::encode_tbs(&self)?;
        self.signature = key.sign(&tbs).to_bytes();
        Ok(self)
    }

    /// Verifies the signature under `issuer_public_key`.
    pub fn verify_signed_by(
        &self,
        issuer_public_key: &[u8; PUBLIC_KEY_LENGTH],
    ) -> Result<(), CertError> {
        let key =
            VerifyingKey::from_bytes(issuer_public_key).map_err(|_| CertError::InvalidPublicKey)?;
        let signature = Signature::from_bytes(&self.signature);
        key.verify_strict(&der::encode_tbs(self)?, &signature)
            .map_err(|_| CertError::InvalidSignature)
    }

    /// Returns `true` when the certificate verifies under its own key.
    pub fn is_self_signed(&self) -> bool {
        self.verify_signed_by(&self.public_key).is_ok()
    }

    /// Parses the compact encoding.
    pub fn from_compact(bytes: &[u8]) -> Result<Self, CertError> {
        tlv::decode(bytes)
    }

    /// Produces the compact encoding.
    pub fn to_compact(&self) -> Result<Vec<u8>, CertError> {
        tlv::encode(self)
    }

    /// Parses the DER encoding.
    pub fn from_der(bytes: &[u8]) -> Result<Self, CertError> {
        der::decode(bytes)
    }

    /// Produces the DER encoding.
    pub fn to_der(&self) -> Result<Vec<u8>, CertError> {
        der::encode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn sample() -> (SigningKey, Certificate) {
        let key = SigningKey::generate(&mut OsRng);
        let subject = DistinguishedName::new()
            .with(DnAttribute::NodeId(NodeId(0xDEDE_0001)))
            .with(DnAttribute::FabricId(FabricId(7)))
            .with(DnAttribute::CaseAuthTag(CaseAuthTag(0x0001_0002)));
        let issuer = DistinguishedName::new().with(DnAttribute::RootCaId(9));
        let cert = Certificate::unsigned(42, issuer, subject, key.verifying_key().to_bytes());
        (key, cert)
    }

    #[test]
    fn dn_accessors() {
        let (_, cert) = sample();
        assert_eq!(cert.subject.node_id(), Some(NodeId(0xDEDE_0001)));
        assert_eq!(cert.subject.fabric_id(), Some(FabricId(7)));
        assert_eq!(cert.subject.root_ca_id(), None);
        assert_eq!(cert.issuer.root_ca_id(), Some(9));
        assert_eq!(cert.subject.cats().expect("cats").tags().len(), 1);
    }

    #[test]
    fn signature_covers_fields() {
        let (key, cert) = sample();
        let signed = cert.sign(&key).expect("sign");
        assert!(signed.is_self_signed());

        let mut tampered = signed.clone();
        tampered.serial += 1;
        assert_eq!(
            tampered.verify_signed_by(&signed.public_key),
            Err(CertError::InvalidSignature)
        );
    }

    #[test]
    fn too_many_cats_rejected() {
        let mut dn = DistinguishedName::new();
        for i in 1..=4 {
            dn.push(DnAttribute::CaseAuthTag(CaseAuthTag(i)));
        }
        assert!(matches!(dn.cats(), Err(CertError::TooManyCats(_))));
    }

    #[test]
    fn attribute_codes_round_trip() {
        for attr in [
            DnAttribute::NodeId(NodeId(5)),
            DnAttribute::IcaId(6),
            DnAttribute::RootCaId(7),
            DnAttribute::FabricId(FabricId(8)),
            DnAttribute::CaseAuthTag(CaseAuthTag(9)),
        ] {
            assert_eq!(DnAttribute::from_code(attr.code(), attr.value()), Ok(attr));
        }
        assert!(DnAttribute::from_code(6, u64::from(u32::MAX) + 1).is_err());
        assert!(DnAttribute::from_code(2, 0).is_err());
    }
}
