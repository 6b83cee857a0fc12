//! # Storage Media
//!
//! The store never relies on a storage engine's own transactions. It needs
//! exactly two things from a medium:
//! - `snapshot()`: a point-in-time view supporting point reads and ordered
//!   prefix scans
//! - `apply()`: an all-or-nothing write batch
//!
//! Everything else (atomic multi-step sequences, isolation, rollback) is built
//! on top by [`crate::transaction`].

pub mod keys;
mod memory;
mod redb_medium;

pub use memory::MemoryMedium;
pub use redb_medium::RedbMedium;

use crate::GraphError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Logical tables. Each medium maps them to its own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// (account, entity id) -> version record
    Versions,
    /// (account, metadata id) -> identity record (version chain, head first)
    Identities,
    /// (account, metadata id) -> shared metadata
    Metadata,
    /// (account, type, metadata id) -> ()
    TypeIndex,
    /// (account, source entity id, path, index) -> link
    Links,
    /// (account, login id) -> login code
    LoginCodes,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Versions,
        Table::Identities,
        Table::Metadata,
        Table::TypeIndex,
        Table::Links,
        Table::LoginCodes,
    ];
}

/// Read access to a consistent state of the store.
pub trait StoreRead {
    /// Point read. `Ok(None)` when the key is absent.
    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, GraphError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, GraphError>;
}

/// An owned point-in-time view handed out by a medium.
pub struct ReadView {
    inner: Box<dyn StoreRead>,
}

impl std::fmt::Debug for ReadView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadView").finish_non_exhaustive()
    }
}

impl ReadView {
    #[must_use]
    pub fn new(inner: Box<dyn StoreRead>) -> Self {
        Self { inner }
    }
}

impl StoreRead for ReadView {
    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, GraphError> {
        self.inner.read(table, key)
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, GraphError> {
        self.inner.scan(table, prefix)
    }
}

/// One mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        table: Table,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        table: Table,
        key: Vec<u8>,
    },
}

impl WriteOp {
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            WriteOp::Put { table, .. } | WriteOp::Delete { table, .. } => *table,
        }
    }
}

/// Writes applied by a medium as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put { table, key, value });
    }

    pub fn delete(&mut self, table: Table, key: Vec<u8>) {
        self.ops.push(WriteOp::Delete { table, key });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// A durable medium behind the store.
///
/// `apply` must be atomic with respect to `snapshot`: a view sees either none
/// or all of a batch.
pub trait StorageMedium: Send + Sync + std::fmt::Debug {
    fn snapshot(&self) -> Result<ReadView, GraphError>;

    fn apply(&self, batch: WriteBatch) -> Result<(), GraphError>;
}

// =============================================================================
// RECORD CODEC
// =============================================================================

/// Encode a record with postcard.
pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, GraphError> {
    postcard::to_allocvec(record).map_err(|e| GraphError::Serialization(e.to_string()))
}

/// Decode a postcard record.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GraphError> {
    postcard::from_bytes(bytes).map_err(|e| GraphError::Serialization(e.to_string()))
}

/// Map any medium failure to `StorageIo`.
pub(crate) fn io_error(e: impl std::fmt::Display) -> GraphError {
    GraphError::StorageIo(e.to_string())
}
