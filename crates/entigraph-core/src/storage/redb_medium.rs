//! # redb-backed Medium
//!
//! A disk-backed medium using the redb embedded database.
//!
//! redb provides what the store asks of a medium:
//! - Crash safety (copy-on-write B-trees)
//! - MVCC read transactions, used here as snapshots
//! - Atomic commits, used here for write batches
//!
//! Each logical [`Table`] maps to one redb table with byte keys and values.

use super::{ReadView, StorageMedium, StoreRead, Table, WriteBatch, WriteOp, io_error};
use crate::GraphError;
use redb::{Database, ReadTransaction, ReadableDatabase, TableDefinition};
use std::path::Path;

const VERSIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("versions");
const IDENTITIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("identities");
const METADATA: TableDefinition<&[u8], &[u8]> = TableDefinition::new("metadata");
const TYPE_INDEX: TableDefinition<&[u8], &[u8]> = TableDefinition::new("type_index");
const LINKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("links");
const LOGIN_CODES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("login_codes");

fn definition(table: Table) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    match table {
        Table::Versions => VERSIONS,
        Table::Identities => IDENTITIES,
        Table::Metadata => METADATA,
        Table::TypeIndex => TYPE_INDEX,
        Table::Links => LINKS,
        Table::LoginCodes => LOGIN_CODES,
    }
}

/// A disk-backed medium using redb.
pub struct RedbMedium {
    db: Database,
}

impl std::fmt::Debug for RedbMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbMedium").finish_non_exhaustive()
    }
}

impl RedbMedium {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(io_error)?;
        for table in Table::ALL {
            let _ = write_txn.open_table(definition(table)).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        tracing::debug!(path = %path.as_ref().display(), "opened redb medium");
        Ok(Self { db })
    }
}

struct RedbSnapshot {
    txn: ReadTransaction,
}

impl StoreRead for RedbSnapshot {
    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, GraphError> {
        let handle = self.txn.open_table(definition(table)).map_err(io_error)?;
        Ok(handle
            .get(key)
            .map_err(io_error)?
            .map(|guard| guard.value().to_vec()))
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, GraphError> {
        let handle = self.txn.open_table(definition(table)).map_err(io_error)?;
        let mut entries = Vec::new();
        for entry in handle.range(prefix..).map_err(io_error)? {
            let (key, value) = entry.map_err(io_error)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.value().to_vec()));
        }
        Ok(entries)
    }
}

impl StorageMedium for RedbMedium {
    fn snapshot(&self) -> Result<ReadView, GraphError> {
        let txn = self.db.begin_read().map_err(io_error)?;
        Ok(ReadView::new(Box::new(RedbSnapshot { txn })))
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), GraphError> {
        let write_txn = self.db.begin_write().map_err(io_error)?;
        let ops = batch.into_ops();
        for table in Table::ALL {
            if !ops.iter().any(|op| op.table() == table) {
                continue;
            }
            let mut handle = write_txn.open_table(definition(table)).map_err(io_error)?;
            for op in ops.iter().filter(|op| op.table() == table) {
                match op {
                    WriteOp::Put { key, value, .. } => {
                        handle
                            .insert(key.as_slice(), value.as_slice())
                            .map_err(io_error)?;
                    }
                    WriteOp::Delete { key, .. } => {
                        handle.remove(key.as_slice()).map_err(io_error)?;
                    }
                }
            }
        }
        write_txn.commit().map_err(io_error)?;
        Ok(())
    }
}
