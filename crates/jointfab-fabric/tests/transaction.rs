use ed25519_dalek::SigningKey;
use jointfab_certs::{CertError, CertificateAuthority, Csr};
use jointfab_db::{create_pool, run_migrations, DbRuntimeSettings};
use jointfab_fabric::{FabricError, FabricTable, SqliteFabricStore};
use jointfab_types::{CatValues, FabricId, FabricIndex, NodeId, VendorId};
use rand::rngs::OsRng;

struct Pki {
    root: CertificateAuthority,
    ica: CertificateAuthority,
}

impl Pki {
    fn new() -> Self {
        let root = CertificateAuthority::new_root(SigningKey::generate(&mut OsRng), 1, None)
            .expect("root");
        let ica_key = SigningKey::generate(&mut OsRng);
        let icac = root
            .issue_intermediate(2, ica_key.verifying_key().to_bytes())
            .expect("icac");
        let ica = CertificateAuthority::from_parts(ica_key, icac).expect("ica");
        Self { root, ica }
    }

    fn root_compact(&self) -> Vec<u8> {
        self.root.certificate().to_compact().expect("root compact")
    }

    fn icac_compact(&self) -> Vec<u8> {
        self.ica.certificate().to_compact().expect("icac compact")
    }

    fn noc_for(&self, csr: &[u8], node_id: NodeId, fabric_id: FabricId) -> Vec<u8> {
        let key = Csr::decode(csr).expect("csr").public_key();
        self.ica
            .issue_noc(node_id, fabric_id, &CatValues::new(), key)
            .expect("noc")
            .to_compact()
            .expect("noc compact")
    }
}

fn join(
    table: &mut FabricTable,
    pki: &Pki,
    node_id: u64,
    fabric_id: u64,
    for_fabric: Option<FabricIndex>,
) -> Result<FabricIndex, FabricError> {
    let csr = table.allocate_pending_operational_key(for_fabric)?;
    table.add_new_pending_trusted_root_cert(&pki.root_compact())?;
    let noc = pki.noc_for(&csr, NodeId(node_id), FabricId(fabric_id));
    table.add_new_pending_fabric_with_operational_keystore(
        &noc,
        Some(&pki.icac_compact()),
        VendorId(0xFFF1),
    )?;
    table.commit_pending_fabric_data()
}

// ── Transaction discipline ──────────────────────────────────────────

#[test]
fn commit_publishes_fabric() {
    let pki = Pki::new();
    let mut table = FabricTable::in_memory(4);
    let index = join(&mut table, &pki, 0x10, 0xAA, None).expect("join");

    assert_eq!(index, FabricIndex::MIN);
    assert!(!table.has_pending_transaction());
    assert!(table.has_operational_key(index));
    let fabric = table.find_fabric_with_index(index).expect("committed");
    assert_eq!(fabric.node_id, NodeId(0x10));
    assert_eq!(fabric.fabric_id, FabricId(0xAA));
    assert_eq!(fabric.vendor_id, VendorId(0xFFF1));
    assert_eq!(table.fetch_root_cert(index).expect("root"), pki.root_compact());
    assert_eq!(table.fetch_icac_cert(index).expect("icac"), pki.icac_compact());
}

#[test]
fn second_transaction_discards_first() {
    let pki = Pki::new();
    let mut table = FabricTable::in_memory(4);

    let first_csr = table.allocate_pending_operational_key(None).expect("csr");
    table
        .add_new_pending_trusted_root_cert(&pki.root_compact())
        .expect("root");
    let stale_noc = pki.noc_for(&first_csr, NodeId(1), FabricId(1));

    let second_csr = table.allocate_pending_operational_key(None).expect("csr");
    assert_ne!(first_csr, second_csr);

    // The root staged under the first transaction is gone.
    assert!(matches!(
        table.add_new_pending_fabric_with_operational_keystore(
            &stale_noc,
            Some(&pki.icac_compact()),
            VendorId(1)
        ),
        Err(FabricError::IncorrectState(_))
    ));

    table
        .add_new_pending_trusted_root_cert(&pki.root_compact())
        .expect("root");
    // A certificate for the first key no longer matches.
    assert!(matches!(
        table.add_new_pending_fabric_with_operational_keystore(
            &stale_noc,
            Some(&pki.icac_compact()),
            VendorId(1)
        ),
        Err(FabricError::InvalidPublicKey)
    ));

    let noc = pki.noc_for(&second_csr, NodeId(2), FabricId(2));
    table
        .add_new_pending_fabric_with_operational_keystore(&noc, Some(&pki.icac_compact()), VendorId(1))
        .expect("stage");
    let index = table.commit_pending_fabric_data().expect("commit");
    let fabric = table.find_fabric_with_index(index).expect("fabric");
    assert_eq!(fabric.node_id, NodeId(2));
    assert_eq!(fabric.fabric_id, FabricId(2));
    assert_eq!(table.fabric_count(), 1);
}

#[test]
fn pending_fabric_visible_only_through_find() {
    let pki = Pki::new();
    let mut table = FabricTable::in_memory(4);
    let csr = table.allocate_pending_operational_key(None).expect("csr");
    table
        .add_new_pending_trusted_root_cert(&pki.root_compact())
        .expect("root");
    let noc = pki.noc_for(&csr, NodeId(5), FabricId(5));
    let index = table
        .add_new_pending_fabric_with_operational_keystore(&noc, Some(&pki.icac_compact()), VendorId(1))
        .expect("stage");

    assert!(table.find_fabric_with_index(index).is_some());
    assert!(matches!(
        table.fetch_root_cert(index),
        Err(FabricError::NotFound(_))
    ));
    assert_eq!(table.fabric_count(), 0);

    table.revert_pending_fabric_data();
    assert!(table.find_fabric_with_index(index).is_none());
}

// ── Validation ──────────────────────────────────────────────────────

#[test]
fn root_must_be_self_signed() {
    let pki = Pki::new();
    let mut table = FabricTable::in_memory(4);
    table.allocate_pending_operational_key(None).expect("csr");
    assert!(matches!(
        table.add_new_pending_trusted_root_cert(&pki.icac_compact()),
        Err(FabricError::CertificateInvalid(CertError::InvalidSignature))
    ));
}

#[test]
fn chain_from_foreign_root_rejected() {
    let pki = Pki::new();
    let other = Pki::new();
    let mut table = FabricTable::in_memory(4);
    let csr = table.allocate_pending_operational_key(None).expect("csr");
    table
        .add_new_pending_trusted_root_cert(&other.root_compact())
        .expect("root");
    let noc = pki.noc_for(&csr, NodeId(1), FabricId(1));
    assert!(matches!(
        table.add_new_pending_fabric_with_operational_keystore(&noc, Some(&pki.icac_compact()), VendorId(1)),
        Err(FabricError::CertificateInvalid(CertError::InvalidSignature))
    ));
}

#[test]
fn duplicate_fabric_identity_conflicts() {
    let pki = Pki::new();
    let mut table = FabricTable::in_memory(4);
    let first = join(&mut table, &pki, 1, 0xF1, None).expect("first");

    assert!(matches!(
        join(&mut table, &pki, 2, 0xF1, None),
        Err(FabricError::FabricExists(i)) if i == first
    ));

    // Joining on behalf of the fabric that shares the identity is allowed.
    let second = join(&mut table, &pki, 3, 0xF1, Some(first)).expect("joint fabric");
    assert_ne!(first, second);
    assert!(matches!(
        join(&mut table, &pki, 4, 0xF1, Some(first)),
        Err(FabricError::FabricExists(i)) if i == second
    ));
}

#[test]
fn capacity_enforced() {
    let pki = Pki::new();
    let mut table = FabricTable::in_memory(2);
    join(&mut table, &pki, 1, 1, None).expect("first");
    join(&mut table, &pki, 1, 2, None).expect("second");

    table.allocate_pending_operational_key(None).expect("csr");
    assert!(matches!(
        table.add_new_pending_trusted_root_cert(&pki.root_compact()),
        Err(FabricError::TableFull { max: 2 })
    ));
    assert_eq!(table.fabric_count(), 2);
}

#[test]
fn indices_reuse_lowest_free_slot() {
    let pki = Pki::new();
    let mut table = FabricTable::in_memory(4);
    let a = join(&mut table, &pki, 1, 1, None).expect("a");
    let b = join(&mut table, &pki, 1, 2, None).expect("b");
    assert_eq!((a.get(), b.get()), (1, 2));
}

// ── Persistence ─────────────────────────────────────────────────────

#[test]
fn committed_fabrics_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("node.db");
    let pool = create_pool(path.to_str().expect("utf-8"), DbRuntimeSettings::default())
        .expect("pool");
    run_migrations(&pool.get().expect("conn")).expect("migrate");

    let pki = Pki::new();
    let index = {
        let mut table =
            FabricTable::open(4, Box::new(SqliteFabricStore::new(pool.clone()))).expect("open");
        join(&mut table, &pki, 0x77, 0x88, None).expect("join")
    };

    let table = FabricTable::open(4, Box::new(SqliteFabricStore::new(pool))).expect("reopen");
    let fabric = table.find_fabric_with_index(index).expect("reloaded");
    assert_eq!(fabric.node_id, NodeId(0x77));
    assert_eq!(fabric.fabric_id, FabricId(0x88));
    assert_eq!(table.fetch_noc_cert(index).expect("noc").len(), fabric.noc_cert.len());
}
