//! The signing oracle the coordinator issues operational certificates
//! through.

use ed25519_dalek::SigningKey;
use jointfab_types::{CatValues, FabricId, NodeId};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::authority::CertificateAuthority;
use crate::cert::Certificate;
use crate::csr::Csr;
use crate::{CertError, PUBLIC_KEY_LENGTH};

/// Errors returned by a [`CredentialIssuer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssuerError {
    /// A required "next request" hint was not set before signing.
    #[error("{0} hint not set for this signing request")]
    MissingHint(&'static str),

    /// The supplied intermediate certificate does not carry this issuer's key.
    #[error("intermediate certificate does not match the issuer key")]
    InvalidPublicKey,

    /// The signing request failed to parse or verify.
    #[error("invalid certificate signing request")]
    InvalidCsr,

    /// Issuer storage could not be initialised.
    #[error("issuer initialisation failed: {0}")]
    Initialization(String),

    #[error(transparent)]
    Cert(#[from] CertError),
}

/// Issues operational certificates from an intermediate authority.
///
/// The identity of the next certificate is supplied as one-shot hints: every
/// call to [`CredentialIssuer::sign_noc`] consumes the hints set since the
/// previous call, whether it succeeds or not.
pub trait CredentialIssuer: Send {
    /// Per-request initialisation. Storage-backed issuers load key material
    /// here.
    fn prepare(&mut self) -> Result<(), IssuerError> {
        Ok(())
    }

    /// Returns a signing request for the issuer's own intermediate key.
    fn obtain_ica_csr(&mut self) -> Result<Vec<u8>, IssuerError>;

    fn set_node_id_for_next_noc_request(&mut self, node_id: NodeId);

    fn set_fabric_id_for_next_noc_request(&mut self, fabric_id: FabricId);

    fn set_cats_for_next_noc_request(&mut self, cats: CatValues);

    /// Signs a new operational certificate for the key in `csr`, issued by
    /// the intermediate certificate `icac_der`. Input and output are DER.
    fn sign_noc(&mut self, icac_der: &[u8], csr: &[u8]) -> Result<Vec<u8>, IssuerError>;
}

/// A [`CredentialIssuer`] holding its intermediate key in memory.
pub struct LocalCredentialIssuer {
    ica_key: SigningKey,
    next_node_id: Option<NodeId>,
    next_fabric_id: Option<FabricId>,
    next_cats: Option<CatValues>,
}

impl LocalCredentialIssuer {
    pub fn new(ica_key: SigningKey) -> Self {
        Self {
            ica_key,
            next_node_id: None,
            next_fabric_id: None,
            next_cats: None,
        }
    }

    /// An issuer with a freshly generated intermediate key.
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut OsRng))
    }

    pub fn ica_public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.ica_key.verifying_key().to_bytes()
    }
}

impl std::fmt::Debug for LocalCredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCredentialIssuer")
            .field("ica_public_key", &hex::encode(self.ica_public_key()))
            .finish_non_exhaustive()
    }
}

impl CredentialIssuer for LocalCredentialIssuer {
    fn obtain_ica_csr(&mut self) -> Result<Vec<u8>, IssuerError> {
        Ok(Csr::new(&self.ica_key).encode())
    }

    fn set_node_id_for_next_noc_request(&mut self, node_id: NodeId) {
        self.next_node_id = Some(node_id);
    }

    fn set_fabric_id_for_next_noc_request(&mut self, fabric_id: FabricId) {
        self.next_fabric_id = Some(fabric_id);
    }

    fn set_cats_for_next_noc_request(&mut self, cats: CatValues) {
        self.next_cats = Some(cats);
    }

    fn sign_noc(&mut self, icac_der: &[u8], csr: &[u8]) -> Result<Vec<u8>, IssuerError> {
        let node_id = self.next_node_id.take();
        let fabric_id = self.next_fabric_id.take();
        let cats = self.next_cats.take().unwrap_or_default();

        let node_id = node_id.ok_or(IssuerError::MissingHint("node id"))?;
        let fabric_id = fabric_id.ok_or(IssuerError::MissingHint("fabric id"))?;

        let icac = Certificate::from_der(icac_der)?;
        let authority = CertificateAuthority::from_parts(self.ica_key.clone(), icac)
            .map_err(|_| IssuerError::InvalidPublicKey)?;
        let csr = Csr::decode(csr).map_err(|_| IssuerError::InvalidCsr)?;

        let noc = authority.issue_noc(node_id, fabric_id, &cats, csr.public_key())?;
        tracing::debug!(
            node_id = %node_id,
            fabric_id = %fabric_id,
            cats = cats.tags().len(),
            "issued operational certificate"
        );
        Ok(noc.to_der()?)
    }
}
