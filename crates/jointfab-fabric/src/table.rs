//! Committed fabrics plus the single pending transaction.

use std::collections::BTreeMap;

use ed25519_dalek::SigningKey;
use jointfab_certs::{Certificate, Csr};
use jointfab_types::{FabricIndex, VendorId};
use rand::rngs::OsRng;

use crate::info::{compressed_fabric_id, FabricInfo};
use crate::store::{FabricStore, MemoryFabricStore};
use crate::FabricError;

/// Default number of fabrics a node may belong to.
pub const DEFAULT_MAX_FABRICS: usize = 16;

/// The one fabric-join operation allowed in flight.
struct PendingTransaction {
    /// The fabric the request arrived on, if any. A new fabric may share
    /// root and fabric id with it.
    for_fabric: Option<FabricIndex>,
    operational_key: SigningKey,
    root_cert: Option<Vec<u8>>,
    fabric: Option<FabricInfo>,
}

/// Committed fabrics and at most one pending join.
pub struct FabricTable {
    fabrics: BTreeMap<FabricIndex, FabricInfo>,
    operational_keys: BTreeMap<FabricIndex, SigningKey>,
    pending: Option<PendingTransaction>,
    max_fabrics: usize,
    store: Box<dyn FabricStore>,
}

impl std::fmt::Debug for FabricTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricTable")
            .field("fabrics", &self.fabrics.keys().collect::<Vec<_>>())
            .field("pending", &self.pending.is_some())
            .field("max_fabrics", &self.max_fabrics)
            .finish()
    }
}

impl FabricTable {
    /// Opens a table over `store`, loading every fabric it holds.
    pub fn open(max_fabrics: usize, store: Box<dyn FabricStore>) -> Result<Self, FabricError> {
        let mut fabrics = BTreeMap::new();
        for fabric in store.load()? {
            fabrics.insert(fabric.fabric_index, fabric);
        }
        tracing::info!(count = fabrics.len(), max_fabrics, "fabric table loaded");
        Ok(Self {
            fabrics,
            operational_keys: BTreeMap::new(),
            pending: None,
            max_fabrics,
            store,
        })
    }

    /// An empty table that persists nothing.
    pub fn in_memory(max_fabrics: usize) -> Self {
        Self {
            fabrics: BTreeMap::new(),
            operational_keys: BTreeMap::new(),
            pending: None,
            max_fabrics,
            store: Box::new(MemoryFabricStore::new()),
        }
    }

    pub fn max_fabrics(&self) -> usize {
        self.max_fabrics
    }

    /// Number of committed fabrics.
    pub fn fabric_count(&self) -> usize {
        self.fabrics.len()
    }

    /// Committed fabrics in index order.
    pub fn fabrics(&self) -> impl Iterator<Item = &FabricInfo> {
        self.fabrics.values()
    }

    pub fn has_pending_transaction(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns `true` if an operational key is held for a committed fabric.
    pub fn has_operational_key(&self, fabric_index: FabricIndex) -> bool {
        self.operational_keys.contains_key(&fabric_index)
    }

    fn committed(&self, fabric_index: FabricIndex) -> Result<&FabricInfo, FabricError> {
        self.fabrics
            .get(&fabric_index)
            .ok_or(FabricError::NotFound(fabric_index))
    }

    pub fn fetch_root_cert(&self, fabric_index: FabricIndex) -> Result<&[u8], FabricError> {
        Ok(&self.committed(fabric_index)?.root_cert)
    }

    pub fn fetch_noc_cert(&self, fabric_index: FabricIndex) -> Result<&[u8], FabricError> {
        Ok(&self.committed(fabric_index)?.noc_cert)
    }

    pub fn fetch_icac_cert(&self, fabric_index: FabricIndex) -> Result<&[u8], FabricError> {
        self.committed(fabric_index)?
            .icac_cert
            .as_deref()
            .ok_or(FabricError::NotFound(fabric_index))
    }

    /// Looks up a fabric, preferring the pending one when its tentative
    /// index matches.
    pub fn find_fabric_with_index(&self, fabric_index: FabricIndex) -> Option<&FabricInfo> {
        self.pending
            .as_ref()
            .and_then(|p| p.fabric.as_ref())
            .filter(|f| f.fabric_index == fabric_index)
            .or_else(|| self.fabrics.get(&fabric_index))
    }

    /// Discards the pending transaction, if any.
    pub fn revert_pending_fabric_data(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!(
                staged_fabric = pending.fabric.as_ref().map(|f| f.fabric_index.get()),
                "reverted pending fabric transaction"
            );
        }
    }

    /// Begins a transaction with a fresh operational key and returns a
    /// signing request for it. Any previous uncommitted transaction is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::InvalidFabricIndex`] if `for_fabric` does not
    /// name a committed fabric.
    pub fn allocate_pending_operational_key(
        &mut self,
        for_fabric: Option<FabricIndex>,
    ) -> Result<Vec<u8>, FabricError> {
        if let Some(index) = for_fabric {
            if !self.fabrics.contains_key(&index) {
                return Err(FabricError::InvalidFabricIndex(index));
            }
        }
        self.revert_pending_fabric_data();

        let operational_key = SigningKey::generate(&mut OsRng);
        let csr = Csr::new(&operational_key).encode();
        self.pending = Some(PendingTransaction {
            for_fabric,
            operational_key,
            root_cert: None,
            fabric: None,
        });
        Ok(csr)
    }

    /// Stages the trusted root of the fabric being joined.
    pub fn add_new_pending_trusted_root_cert(&mut self, root_cert: &[u8]) -> Result<(), FabricError> {
        let at_capacity = self.fabrics.len() >= self.max_fabrics;
        let max = self.max_fabrics;
        let pending = self
            .pending
            .as_mut()
            .ok_or(FabricError::IncorrectState("no operational key allocated"))?;
        if pending.root_cert.is_some() {
            return Err(FabricError::IncorrectState("trusted root already staged"));
        }
        if at_capacity {
            return Err(FabricError::TableFull { max });
        }

        let root = Certificate::from_compact(root_cert)?;
        root.verify_signed_by(&root.public_key)?;
        pending.root_cert = Some(root_cert.to_vec());
        Ok(())
    }

    /// Validates the operational certificate chain against the staged root
    /// and key, and stages the resulting fabric under a tentative index.
    pub fn add_new_pending_fabric_with_operational_keystore(
        &mut self,
        noc_cert: &[u8],
        icac_cert: Option<&[u8]>,
        vendor_id: VendorId,
    ) -> Result<FabricIndex, FabricError> {
        let pending = self
            .pending
            .as_ref()
            .ok_or(FabricError::IncorrectState("no operational key allocated"))?;
        let root_bytes = pending
            .root_cert
            .as_deref()
            .ok_or(FabricError::IncorrectState("no trusted root staged"))?;
        if pending.fabric.is_some() {
            return Err(FabricError::IncorrectState("fabric already staged"));
        }

        let root = Certificate::from_compact(root_bytes)?;
        let noc = Certificate::from_compact(noc_cert)?;
        let icac = icac_cert.map(Certificate::from_compact).transpose()?;

        match &icac {
            Some(icac) => {
                icac.verify_signed_by(&root.public_key)?;
                noc.verify_signed_by(&icac.public_key)?;
            }
            None => noc.verify_signed_by(&root.public_key)?,
        }

        if noc.public_key != pending.operational_key.verifying_key().to_bytes() {
            return Err(FabricError::InvalidPublicKey);
        }
        let node_id = noc.subject.node_id().ok_or(FabricError::WrongNodeId)?;
        if !node_id.is_operational() {
            return Err(FabricError::WrongNodeId);
        }
        let fabric_id = noc
            .subject
            .fabric_id()
            .filter(|id| id.is_valid())
            .ok_or(jointfab_certs::CertError::WrongCertDn("fabric id"))?;
        for issuer in std::iter::once(&root).chain(icac.as_ref()) {
            if issuer.subject.fabric_id().is_some_and(|id| id != fabric_id) {
                return Err(jointfab_certs::CertError::WrongCertDn("consistent fabric id").into());
            }
        }

        let compressed = compressed_fabric_id(&root.public_key, fabric_id)?;
        if let Some(existing) = self.fabrics.values().find(|f| {
            Some(f.fabric_index) != pending.for_fabric && f.compressed_fabric_id == compressed
        }) {
            return Err(FabricError::FabricExists(existing.fabric_index));
        }
        if self.fabrics.len() >= self.max_fabrics {
            return Err(FabricError::TableFull {
                max: self.max_fabrics,
            });
        }
        let fabric_index = self.next_free_index().ok_or(FabricError::TableFull {
            max: self.max_fabrics,
        })?;

        let fabric = FabricInfo {
            fabric_index,
            vendor_id,
            fabric_id,
            node_id,
            compressed_fabric_id: compressed,
            root_cert: root_bytes.to_vec(),
            noc_cert: noc_cert.to_vec(),
            icac_cert: icac_cert.map(<[u8]>::to_vec),
        };
        tracing::debug!(
            fabric_index = fabric_index.get(),
            compressed_fabric_id = %hex::encode_upper(compressed),
            node_id = %node_id,
            "staged pending fabric"
        );
        if let Some(pending) = self.pending.as_mut() {
            pending.fabric = Some(fabric);
        }
        Ok(fabric_index)
    }

    /// Promotes the staged fabric to a committed one.
    ///
    /// The fabric is persisted before it becomes visible; if persistence
    /// fails the transaction stays pending.
    pub fn commit_pending_fabric_data(&mut self) -> Result<FabricIndex, FabricError> {
        let staged = self
            .pending
            .as_ref()
            .and_then(|p| p.fabric.as_ref())
            .ok_or(FabricError::IncorrectState("no fabric staged"))?;
        self.store.insert(staged)?;

        let pending = self
            .pending
            .take()
            .ok_or(FabricError::IncorrectState("no fabric staged"))?;
        let fabric = pending
            .fabric
            .ok_or(FabricError::IncorrectState("no fabric staged"))?;
        let fabric_index = fabric.fabric_index;
        tracing::info!(
            fabric_index = fabric_index.get(),
            fabric_id = %fabric.fabric_id,
            vendor_id = %fabric.vendor_id,
            "committed fabric"
        );
        self.operational_keys
            .insert(fabric_index, pending.operational_key);
        self.fabrics.insert(fabric_index, fabric);
        Ok(fabric_index)
    }

    fn next_free_index(&self) -> Option<FabricIndex> {
        (FabricIndex::MIN.get()..=FabricIndex::MAX.get())
            .filter_map(FabricIndex::new)
            .find(|index| !self.fabrics.contains_key(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_requires_allocated_key() {
        let mut table = FabricTable::in_memory(DEFAULT_MAX_FABRICS);
        assert!(matches!(
            table.add_new_pending_trusted_root_cert(&[]),
            Err(FabricError::IncorrectState(_))
        ));
    }

    #[test]
    fn allocate_for_unknown_fabric_rejected() {
        let mut table = FabricTable::in_memory(DEFAULT_MAX_FABRICS);
        let index = FabricIndex::new(4).expect("index");
        assert!(matches!(
            table.allocate_pending_operational_key(Some(index)),
            Err(FabricError::InvalidFabricIndex(i)) if i == index
        ));
        assert!(!table.has_pending_transaction());
    }

    #[test]
    fn allocate_returns_verifiable_csr() {
        let mut table = FabricTable::in_memory(DEFAULT_MAX_FABRICS);
        let csr = table.allocate_pending_operational_key(None).expect("csr");
        Csr::decode(&csr).expect("valid csr");
        assert!(table.has_pending_transaction());
        table.revert_pending_fabric_data();
        assert!(!table.has_pending_transaction());
    }

    #[test]
    fn commit_without_staged_fabric_rejected() {
        let mut table = FabricTable::in_memory(DEFAULT_MAX_FABRICS);
        table.allocate_pending_operational_key(None).expect("csr");
        assert!(matches!(
            table.commit_pending_fabric_data(),
            Err(FabricError::IncorrectState(_))
        ));
        assert!(table.has_pending_transaction());
    }

    #[test]
    fn zero_capacity_table_is_always_full() {
        let mut table = FabricTable::in_memory(0);
        table.allocate_pending_operational_key(None).expect("csr");
        assert!(matches!(
            table.add_new_pending_trusted_root_cert(&[]),
            Err(FabricError::TableFull { max: 0 })
        ));
    }
}
