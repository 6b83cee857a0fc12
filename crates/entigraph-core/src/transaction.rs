//! # Transaction Coordinator
//!
//! A [`Transaction`] is the explicit handle passed to the closure given to
//! [`crate::Store::run_transaction`]. It is built from three pieces:
//! - a lazily taken snapshot of the medium, used for plain reads
//! - a private write set, overlaid on every read the transaction makes
//! - the locks it has taken, held until commit or rollback
//!
//! Commit turns the write set into one [`WriteBatch`]; the medium applies it
//! atomically, so other readers see all of it or none of it. Rollback is
//! simply dropping the handle: the write set is discarded and the locks are
//! released, which also covers a panic unwinding through the closure.
//!
//! Read-modify-write steps use *locking reads*: take the lock for the
//! structure first, then read its latest committed state (not the
//! snapshot), so two transactions can never build on the same head.

use crate::locks::{LockKey, TxnId};
use crate::storage::{ReadView, StoreRead, Table, WriteBatch, encode};
use crate::store::StoreInner;
use crate::{GraphError, Store};
use serde::Serialize;
use std::cell::OnceCell;
use std::collections::BTreeMap;

type WriteSet = BTreeMap<(Table, Vec<u8>), Option<Vec<u8>>>;

/// Handle for one running transaction.
///
/// Exposes the entity, link and login-code operations (see the `impl`
/// blocks in [`crate::entity_store`], [`crate::link_graph`] and
/// [`crate::login_codes`]) plus every read trait through [`StoreRead`].
/// It cannot open another transaction.
pub struct Transaction<'s> {
    store: &'s StoreInner,
    id: TxnId,
    snapshot: OnceCell<ReadView>,
    writes: WriteSet,
    locks: Vec<LockKey>,
    committed: bool,
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("pending_writes", &self.writes.len())
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl<'s> Transaction<'s> {
    pub(crate) fn begin(store: &'s StoreInner) -> Self {
        let id = store.next_txn_id();
        tracing::debug!(txn = id, "transaction started");
        Self {
            store,
            id,
            snapshot: OnceCell::new(),
            writes: WriteSet::new(),
            locks: Vec::new(),
            committed: false,
        }
    }

    /// This transaction's number, as it appears in logs and conflicts.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Number of buffered writes not yet committed.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn store(&self) -> &'s StoreInner {
        self.store
    }

    // =========================================================================
    // LOCKS
    // =========================================================================

    /// Take `key` until this transaction ends.
    pub(crate) fn lock(&mut self, key: LockKey) -> Result<(), GraphError> {
        if self.store.locks.acquire(key, self.id)? {
            self.locks.push(key);
        }
        Ok(())
    }

    // =========================================================================
    // READS
    // =========================================================================

    fn view(&self) -> Result<&ReadView, GraphError> {
        if let Some(view) = self.snapshot.get() {
            return Ok(view);
        }
        let view = self.store.medium.snapshot()?;
        Ok(self.snapshot.get_or_init(|| view))
    }

    fn overlay_read<F>(&self, table: Table, key: &[u8], base: F) -> Result<Option<Vec<u8>>, GraphError>
    where
        F: FnOnce() -> Result<Option<Vec<u8>>, GraphError>,
    {
        match self.writes.get(&(table, key.to_vec())) {
            Some(pending) => Ok(pending.clone()),
            None => base(),
        }
    }

    fn overlay_scan(
        &self,
        table: Table,
        prefix: &[u8],
        base: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = base.into_iter().collect();
        for ((t, key), pending) in self.writes.range((table, prefix.to_vec())..) {
            if *t != table || !key.starts_with(prefix) {
                break;
            }
            match pending {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }

    /// Read the latest committed value (plus own writes), bypassing the
    /// snapshot. Only meaningful while holding the lock that guards `key`.
    pub(crate) fn read_latest(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, GraphError> {
        self.overlay_read(table, key, || self.store.medium.snapshot()?.read(table, key))
    }

    /// Scan the latest committed state (plus own writes).
    pub(crate) fn scan_latest(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, GraphError> {
        let base = self.store.medium.snapshot()?.scan(table, prefix)?;
        Ok(self.overlay_scan(table, prefix, base))
    }

    /// A read view over the latest committed state plus own writes.
    ///
    /// Used after taking locks, when the snapshot may predate the holder
    /// that was waited on.
    pub(crate) fn latest(&self) -> LatestView<'_, 's> {
        LatestView { txn: self }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    pub(crate) fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert((table, key), Some(value));
    }

    pub(crate) fn put_record<T: Serialize>(
        &mut self,
        table: Table,
        key: Vec<u8>,
        record: &T,
    ) -> Result<(), GraphError> {
        let value = encode(record)?;
        self.put(table, key, value);
        Ok(())
    }

    pub(crate) fn delete(&mut self, table: Table, key: Vec<u8>) {
        self.writes.insert((table, key), None);
    }

    // =========================================================================
    // COMPLETION
    // =========================================================================

    /// Apply the write set as one batch. Locks are released on drop.
    pub(crate) fn commit(mut self) -> Result<(), GraphError> {
        // Release the snapshot first so the medium need not preserve it.
        self.snapshot.take();

        let mut batch = WriteBatch::new();
        for ((table, key), pending) in std::mem::take(&mut self.writes) {
            match pending {
                Some(value) => batch.put(table, key, value),
                None => batch.delete(table, key),
            }
        }
        let writes = batch.len();
        if !batch.is_empty() {
            self.store.medium.apply(batch)?;
        }
        self.committed = true;
        tracing::debug!(txn = self.id, writes, "transaction committed");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!(
                txn = self.id,
                discarded = self.writes.len(),
                "transaction rolled back"
            );
        }
        self.store.locks.release_all(self.id, &self.locks);
    }
}

impl StoreRead for Transaction<'_> {
    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, GraphError> {
        self.overlay_read(table, key, || self.view()?.read(table, key))
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, GraphError> {
        let base = self.view()?.scan(table, prefix)?;
        Ok(self.overlay_scan(table, prefix, base))
    }
}

/// Latest-committed reads through a transaction's write set.
pub(crate) struct LatestView<'t, 's> {
    txn: &'t Transaction<'s>,
}

impl StoreRead for LatestView<'_, '_> {
    fn read(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, GraphError> {
        self.txn.read_latest(table, key)
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, GraphError> {
        self.txn.scan_latest(table, prefix)
    }
}

// =============================================================================
// NESTING GUARD
// =============================================================================

/// Marks the current thread as inside a transaction for `store`.
pub(crate) struct ActiveGuard<'s> {
    store: &'s StoreInner,
    thread: std::thread::ThreadId,
}

impl<'s> ActiveGuard<'s> {
    pub(crate) fn enter(store: &'s StoreInner) -> Result<Self, GraphError> {
        let thread = std::thread::current().id();
        let mut active = store.active_threads.lock();
        if active.contains(&thread) {
            return Err(GraphError::NestedTransaction);
        }
        active.push(thread);
        drop(active);
        Ok(Self { store, thread })
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.store.active_threads.lock().retain(|t| *t != self.thread);
    }
}

impl Store {
    /// Run `f` as one atomic, isolated unit.
    ///
    /// `f` receives the transaction handle. If it returns `Ok`, the write
    /// set is committed; if it returns `Err` (or panics), everything it did
    /// is discarded and the error is returned unchanged. Calling
    /// `run_transaction` again from inside `f` on the same thread fails with
    /// [`GraphError::NestedTransaction`].
    pub fn run_transaction<T, F>(&self, f: F) -> Result<T, GraphError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, GraphError>,
    {
        let _active = ActiveGuard::enter(self.inner())?;
        let mut txn = Transaction::begin(self.inner());
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }
}
