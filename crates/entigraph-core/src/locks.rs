//! # Lock Table
//!
//! Exclusive, blocking, per-key locks owned by transactions.
//!
//! Only the structures that need mutual exclusion across transactions are
//! locked: an identity's version chain, an explicit entity id during
//! creation, a source version's link groups, and a login code's counter.
//! Locks are held until the owning transaction commits or rolls back.

use crate::{AccountId, EntityId, GraphError, LoginId, MetadataId};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Opaque transaction number.
pub type TxnId = u64;

/// What a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// The version chain (head pointer) of one identity.
    Identity(AccountId, MetadataId),
    /// An entity id being claimed by a create.
    Version(AccountId, EntityId),
    /// Every link group of one source version.
    LinkSource(AccountId, EntityId),
    /// One login code record.
    LoginCode(AccountId, LoginId),
}

/// Blocking lock manager with a wait timeout.
#[derive(Debug)]
pub struct LockTable {
    held: Mutex<BTreeMap<LockKey, TxnId>>,
    released: Condvar,
    timeout: Duration,
}

impl LockTable {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(BTreeMap::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Take `key` for `owner`, waiting for the current holder if needed.
    ///
    /// Re-acquiring a key already held by `owner` is a no-op. Returns
    /// `Ok(true)` when the lock is newly taken. Waiting past the timeout
    /// yields `Conflict`.
    pub fn acquire(&self, key: LockKey, owner: TxnId) -> Result<bool, GraphError> {
        let deadline = Instant::now() + self.timeout;
        let mut held = self.held.lock();
        loop {
            match held.get(&key) {
                None => {
                    held.insert(key, owner);
                    return Ok(true);
                }
                Some(&holder) if holder == owner => return Ok(false),
                Some(&holder) => {
                    if self.released.wait_until(&mut held, deadline).timed_out()
                        && held.get(&key).is_some_and(|&h| h != owner)
                    {
                        tracing::warn!(?key, txn = owner, holder, "lock wait timed out");
                        return Err(GraphError::Conflict(format!(
                            "timed out waiting for {:?} held by transaction {}",
                            key, holder
                        )));
                    }
                }
            }
        }
    }

    /// Release every key in `keys` owned by `owner` and wake waiters.
    pub fn release_all(&self, owner: TxnId, keys: &[LockKey]) {
        if keys.is_empty() {
            return;
        }
        let mut held = self.held.lock();
        for key in keys {
            if held.get(key) == Some(&owner) {
                held.remove(key);
            }
        }
        drop(held);
        self.released.notify_all();
    }

    /// Number of keys currently held by any transaction.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}
