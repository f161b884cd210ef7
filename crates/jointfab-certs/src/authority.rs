//! Minting certificates from a signing key.

use ed25519_dalek::SigningKey;
use jointfab_types::{CatValues, FabricId, NodeId};

use crate::cert::{Certificate, DistinguishedName, DnAttribute};
use crate::{CertError, PUBLIC_KEY_LENGTH};

/// A certificate authority: a signing key plus the certificate that vouches
/// for it.
pub struct CertificateAuthority {
    signing_key: SigningKey,
    certificate: Certificate,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("subject", &self.certificate.subject)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Creates a self-signed root. The fabric id, when given, is stamped
    /// into the root's subject.
    pub fn new_root(
        signing_key: SigningKey,
        root_ca_id: u64,
        fabric_id: Option<FabricId>,
    ) -> Result<Self, CertError> {
        let mut subject = DistinguishedName::new().with(DnAttribute::RootCaId(root_ca_id));
        if let Some(fabric_id) = fabric_id {
            subject.push(DnAttribute::FabricId(fabric_id));
        }
        let certificate = Certificate::unsigned(
            rand::random(),
            subject.clone(),
            subject,
            signing_key.verifying_key().to_bytes(),
        )
        .sign(&signing_key)?;
        Self::from_parts(signing_key, certificate)
    }

    /// Pairs an existing certificate with its private key.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::InvalidPublicKey`] if the certificate does not
    /// carry `signing_key`'s public half.
    pub fn from_parts(signing_key: SigningKey, certificate: Certificate) -> Result<Self, CertError> {
        if certificate.public_key != signing_key.verifying_key().to_bytes() {
            return Err(CertError::InvalidPublicKey);
        }
        Ok(Self {
            signing_key,
            certificate,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.certificate.public_key
    }

    /// Issues an intermediate authority certificate for `public_key`.
    pub fn issue_intermediate(
        &self,
        ica_id: u64,
        public_key: [u8; PUBLIC_KEY_LENGTH],
    ) -> Result<Certificate, CertError> {
        let mut subject = DistinguishedName::new().with(DnAttribute::IcaId(ica_id));
        if let Some(fabric_id) = self.certificate.subject.fabric_id() {
            subject.push(DnAttribute::FabricId(fabric_id));
        }
        self.issue(subject, public_key)
    }

    /// Issues an operational certificate binding `node_id` to `fabric_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::WrongCertDn`] when `node_id` is outside the
    /// operational range or `fabric_id` is zero.
    pub fn issue_noc(
        &self,
        node_id: NodeId,
        fabric_id: FabricId,
        cats: &CatValues,
        public_key: [u8; PUBLIC_KEY_LENGTH],
    ) -> Result<Certificate, CertError> {
        if !node_id.is_operational() {
            return Err(CertError::WrongCertDn("operational node id"));
        }
        if !fabric_id.is_valid() {
            return Err(CertError::WrongCertDn("fabric id"));
        }
        let mut subject = DistinguishedName::new()
            .with(DnAttribute::NodeId(node_id))
            .with(DnAttribute::FabricId(fabric_id));
        for tag in cats.tags() {
            subject.push(DnAttribute::CaseAuthTag(*tag));
        }
        self.issue(subject, public_key)
    }

    fn issue(
        &self,
        subject: DistinguishedName,
        public_key: [u8; PUBLIC_KEY_LENGTH],
    ) -> Result<Certificate, CertError> {
        let certificate = Certificate::unsigned(
            rand::random(),
            self.certificate.subject.clone(),
            subject,
            public_key,
        )
        .sign(&self.signing_key)?;
        // Surface size violations at issuance rather than at first use.
        certificate.to_compact()?;
        certificate.to_der()?;
        Ok(certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn root_is_self_signed() {
        let root =
            CertificateAuthority::new_root(SigningKey::generate(&mut OsRng), 1, Some(FabricId(5)))
                .expect("root");
        assert!(root.certificate().is_self_signed());
        assert_eq!(root.certificate().subject.fabric_id(), Some(FabricId(5)));
        assert_eq!(root.certificate().issuer, root.certificate().subject);
    }

    #[test]
    fn intermediate_inherits_fabric_and_chains() {
        let root =
            CertificateAuthority::new_root(SigningKey::generate(&mut OsRng), 1, Some(FabricId(5)))
                .expect("root");
        let ica_key = SigningKey::generate(&mut OsRng);
        let icac = root
            .issue_intermediate(2, ica_key.verifying_key().to_bytes())
            .expect("icac");
        assert_eq!(icac.subject.fabric_id(), Some(FabricId(5)));
        assert_eq!(icac.issuer.root_ca_id(), Some(1));
        icac.verify_signed_by(&root.public_key()).expect("signed by root");
        assert!(!icac.is_self_signed());
    }

    #[test]
    fn noc_requires_operational_identity() {
        let root = CertificateAuthority::new_root(SigningKey::generate(&mut OsRng), 1, None)
            .expect("root");
        let key = [1u8; PUBLIC_KEY_LENGTH];
        assert_eq!(
            root.issue_noc(NodeId(0), FabricId(1), &CatValues::new(), key),
            Err(CertError::WrongCertDn("operational node id"))
        );
        assert_eq!(
            root.issue_noc(NodeId(1), FabricId(0), &CatValues::new(), key),
            Err(CertError::WrongCertDn("fabric id"))
        );
    }

    #[test]
    fn from_parts_checks_key() {
        let root = CertificateAuthority::new_root(SigningKey::generate(&mut OsRng), 1, None)
            .expect("root");
        let other = SigningKey::generate(&mut OsRng);
        assert!(matches!(
            CertificateAuthority::from_parts(other, root.certificate().clone()),
            Err(CertError::InvalidPublicKey)
        ));
    }
}
