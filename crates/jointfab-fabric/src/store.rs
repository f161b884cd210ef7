//! Durable storage for committed fabrics.

use jointfab_db::DbPool;
use jointfab_types::{FabricId, FabricIndex, NodeId, VendorId};
use rusqlite::params;
use thiserror::Error;

use crate::info::{FabricInfo, COMPRESSED_FABRIC_ID_LENGTH};

/// Errors raised by a [`FabricStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored row cannot be turned back into a fabric.
    #[error("corrupt fabric row: {0}")]
    Corrupt(String),
}

/// Where committed fabrics live between restarts.
pub trait FabricStore: Send {
    /// Loads every committed fabric.
    fn load(&self) -> Result<Vec<FabricInfo>, StoreError>;

    /// Persists a newly committed fabric.
    fn insert(&mut self, fabric: &FabricInfo) -> Result<(), StoreError>;
}

/// A store that keeps fabrics in memory only.
#[derive(Debug, Default)]
pub struct MemoryFabricStore {
    fabrics: Vec<FabricInfo>,
}

impl MemoryFabricStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FabricStore for MemoryFabricStore {
    fn load(&self) -> Result<Vec<FabricInfo>, StoreError> {
        Ok(self.fabrics.clone())
    }

    fn insert(&mut self, fabric: &FabricInfo) -> Result<(), StoreError> {
        self.fabrics.push(fabric.clone());
        Ok(())
    }
}

/// A store backed by the `fabrics` table.
pub struct SqliteFabricStore {
    pool: DbPool,
}

impl SqliteFabricStore {
    /// Wraps a pool whose database has already been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_fabric(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<FabricInfo, StoreError>> {
    let index: i64 = row.get(0)?;
    let vendor_id: i64 = row.get(1)?;
    let fabric_id: i64 = row.get(2)?;
    let node_id: i64 = row.get(3)?;
    let compressed: Vec<u8> = row.get(4)?;
    let root_cert: Vec<u8> = row.get(5)?;
    let noc_cert: Vec<u8> = row.get(6)?;
    let icac_cert: Option<Vec<u8>> = row.get(7)?;

    let fabric_index = match u8::try_from(index).ok().and_then(FabricIndex::new) {
        Some(i) => i,
        None => return Ok(Err(StoreError::Corrupt(format!("fabric index {index}")))),
    };
    let vendor_id = match u16::try_from(vendor_id) {
        Ok(v) => VendorId(v),
        Err(_) => return Ok(Err(StoreError::Corrupt(format!("vendor id {vendor_id}")))),
    };
    let compressed_fabric_id: [u8; COMPRESSED_FABRIC_ID_LENGTH] = match compressed.try_into() {
        Ok(c) => c,
        Err(_) => {
            return Ok(Err(StoreError::Corrupt(format!(
                "compressed fabric id length at index {fabric_index}"
            ))))
        }
    };

    // 64-bit identifiers are stored bit-for-bit in signed columns.
    Ok(Ok(FabricInfo {
        fabric_index,
        vendor_id,
        fabric_id: FabricId(fabric_id as u64),
        node_id: NodeId(node_id as u64),
        compressed_fabric_id,
        root_cert,
        noc_cert,
        icac_cert,
    }))
}

impl FabricStore for SqliteFabricStore {
    fn load(&self) -> Result<Vec<FabricInfo>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT fabric_index, vendor_id, fabric_id, node_id, compressed_fabric_id,
                    root_cert, noc_cert, icac_cert
             FROM fabrics ORDER BY fabric_index",
        )?;
        let rows = stmt.query_map([], row_to_fabric)?;
        let mut fabrics = Vec::new();
        for row in rows {
            fabrics.push(row??);
        }
        Ok(fabrics)
    }

    fn insert(&mut self, fabric: &FabricInfo) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO fabrics (fabric_index, vendor_id, fabric_id, node_id,
                compressed_fabric_id, root_cert, noc_cert, icac_cert)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                i64::from(fabric.fabric_index.get()),
                i64::from(fabric.vendor_id.0),
                fabric.fabric_id.0 as i64,
                fabric.node_id.0 as i64,
                &fabric.compressed_fabric_id[..],
                &fabric.root_cert,
                &fabric.noc_cert,
                &fabric.icac_cert,
            ],
        )?;
        tracing::debug!(
            fabric_index = fabric.fabric_index.get(),
            "fabric persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jointfab_db::{create_pool, run_migrations, DbRuntimeSettings};

    fn fabric(index: u8) -> FabricInfo {
        FabricInfo {
            fabric_index: FabricIndex::new(index).expect("index"),
            vendor_id: VendorId(0xFFF1),
            fabric_id: FabricId(u64::MAX - 1),
            node_id: NodeId(0xFFFF_FFEF_0000_0001),
            compressed_fabric_id: [index; COMPRESSED_FABRIC_ID_LENGTH],
            root_cert: vec![1, 2, 3],
            noc_cert: vec![4, 5, 6],
            icac_cert: None,
        }
    }

    fn sqlite_store() -> (tempfile::TempDir, SqliteFabricStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fabrics.db");
        let pool = create_pool(
            path.to_str().expect("utf-8 path"),
            DbRuntimeSettings::default(),
        )
        .expect("pool");
        run_migrations(&pool.get().expect("conn")).expect("migrations");
        (dir, SqliteFabricStore::new(pool))
    }

    #[test]
    fn sqlite_store_preserves_full_width_ids() {
        let (_dir, mut store) = sqlite_store();
        let mut second = fabric(2);
        second.icac_cert = Some(vec![9, 9]);
        second.fabric_id = FabricId(7);
        store.insert(&fabric(1)).expect("insert");
        store.insert(&second).expect("insert");

        let loaded = store.load().expect("load");
        assert_eq!(loaded, vec![fabric(1), second]);
    }

    #[test]
    fn sqlite_store_rejects_duplicate_index() {
        let (_dir, mut store) = sqlite_store();
        store.insert(&fabric(1)).expect("insert");
        assert!(matches!(
            store.insert(&fabric(1)),
            Err(StoreError::Database(_))
        ));
    }

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryFabricStore::new();
        store.insert(&fabric(3)).expect("insert");
        assert_eq!(store.load().expect("load"), vec![fabric(3)]);
    }
}
