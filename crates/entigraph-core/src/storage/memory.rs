//! In-memory medium.
//!
//! A copy-on-write `BTreeMap`: snapshots clone the `Arc`, and `apply` only
//! copies the map when a snapshot is still alive.

use super::{ReadView, StorageMedium, StoreRead, Table, WriteBatch, WriteOp};
use crate::GraphError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

type Entries = BTreeMap<(Table, Vec<u8>), Vec<u8>>;

/// Volatile medium for tests, benchmarks and embedded use.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: RwLock<Arc<Entries>>,
}

impl MemoryMedium {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemorySnapshot {
    entries: Arc<Entries>,
}

impl StoreRead for MemorySnapshot {
    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, GraphError> {
        Ok(self.entries.get(&(table, key.to_vec())).cloned())
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, GraphError> {
        Ok(self
            .entries
            .range((table, prefix.to_vec())..)
            .take_while(|((t, k), _)| *t == table && k.starts_with(prefix))
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl StorageMedium for MemoryMedium {
    fn snapshot(&self) -> Result<ReadView, GraphError> {
        let entries = Arc::clone(&self.entries.read());
        Ok(ReadView::new(Box::new(MemorySnapshot { entries })))
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), GraphError> {
        let mut guard = self.entries.write();
        let entries = Arc::make_mut(&mut guard);
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { table, key, value } => {
                    entries.insert((table, key), value);
                }
                WriteOp::Delete { table, key } => {
                    entries.remove(&(table, key));
                }
            }
        }
        Ok(())
    }
}
