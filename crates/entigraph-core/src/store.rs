//! # Store
//!
//! The shareable entry point. A [`Store`] is a cheap `Arc` handle over a
//! storage medium, the lock table, the id source and the clock.
//!
//! Reads on the store run against a fresh committed snapshot. Writes on the
//! store each run in their own transaction; group several of them with
//! [`Store::run_transaction`].

use crate::aggregation::{AggregateOperation, AggregateResult, Aggregator, Collection};
use crate::config::StoreConfig;
use crate::entity_store::{EntityReader, NewEntity, StoreStats};
use crate::identity::{Clock, IdSource, IdentityGenerator, SystemClock};
use crate::link_graph::{LinkReader, NewLink};
use crate::locks::{LockTable, TxnId};
use crate::login_codes::LoginCodeReader;
use crate::storage::{MemoryMedium, ReadView, RedbMedium, StorageMedium};
use crate::{
    AccountId, EntityId, EntityMetadata, EntityVersion, GraphError, HistoryEntry, Link, LinkGroup,
    LoginCode, LoginId, MetadataId, PropertyValue,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

pub(crate) struct StoreInner {
    pub(crate) medium: Arc<dyn StorageMedium>,
    pub(crate) locks: LockTable,
    pub(crate) ids: IdentityGenerator,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: StoreConfig,
    /// Threads currently inside `run_transaction`.
    pub(crate) active_threads: Mutex<Vec<ThreadId>>,
    next_txn: AtomicU64,
}

impl StoreInner {
    pub(crate) fn next_txn_id(&self) -> TxnId {
        self.next_txn.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handle to a versioned entity graph.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("medium", &self.inner.medium)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Store`] from its collaborators.
pub struct StoreBuilder {
    medium: Arc<dyn StorageMedium>,
    ids: IdentityGenerator,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl StoreBuilder {
    #[must_use]
    pub fn new(medium: Arc<dyn StorageMedium>) -> Self {
        Self {
            medium,
            ids: IdentityGenerator::default(),
            clock: Arc::new(SystemClock),
            config: StoreConfig::default(),
        }
    }

    #[must_use]
    pub fn ids(mut self, source: Arc<dyn IdSource>) -> Self {
        self.ids = IdentityGenerator::new(source);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> Store {
        Store {
            inner: Arc::new(StoreInner {
                medium: self.medium,
                locks: LockTable::new(self.config.lock_timeout()),
                ids: self.ids,
                clock: self.clock,
                config: self.config,
                active_threads: Mutex::new(Vec::new()),
                next_txn: AtomicU64::new(1),
            }),
        }
    }
}

impl Store {
    #[must_use]
    pub fn builder(medium: Arc<dyn StorageMedium>) -> StoreBuilder {
        StoreBuilder::new(medium)
    }

    /// A volatile store with random ids and the system clock.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::builder(Arc::new(MemoryMedium::new())).build()
    }

    /// A volatile store with injected ids and clock.
    #[must_use]
    pub fn in_memory_with(ids: Arc<dyn IdSource>, clock: Arc<dyn Clock>) -> Self {
        Self::builder(Arc::new(MemoryMedium::new()))
            .ids(ids)
            .clock(clock)
            .build()
    }

    /// Open (or create) a redb-backed store.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self, GraphError> {
        let medium = RedbMedium::open(path)?;
        Ok(Self::builder(Arc::new(medium)).config(config).build())
    }

    pub(crate) fn inner(&self) -> &StoreInner {
        &self.inner
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// A consistent view of everything committed so far.
    pub fn snapshot(&self) -> Result<ReadView, GraphError> {
        self.inner.medium.snapshot()
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    pub fn create_entity(&self, new: NewEntity) -> Result<EntityVersion, GraphError> {
        self.run_transaction(|txn| txn.create_entity(new))
    }

    pub fn get_entity(
        &self,
        account_id: AccountId,
        entity_id: EntityId,
        latest: bool,
    ) -> Result<Option<EntityVersion>, GraphError> {
        self.snapshot()?.get_entity(account_id, entity_id, latest)
    }

    pub fn update_entity(
        &self,
        account_id: AccountId,
        entity_id: EntityId,
        expected_type: Option<&str>,
        properties: PropertyValue,
    ) -> Result<Vec<EntityVersion>, GraphError> {
        self.run_transaction(|txn| txn.update_entity(account_id, entity_id, expected_type, properties))
    }

    pub fn update_entity_metadata(
        &self,
        account_id: AccountId,
        metadata_id: MetadataId,
        extra: PropertyValue,
    ) -> Result<EntityMetadata, GraphError> {
        self.run_transaction(|txn| txn.update_entity_metadata(account_id, metadata_id, extra))
    }

    pub fn archive_entity(
        &self,
        account_id: AccountId,
        entity_id: EntityId,
    ) -> Result<EntityVersion, GraphError> {
        self.run_transaction(|txn| txn.archive_entity(account_id, entity_id))
    }

    pub fn get_entities_by_type(
        &self,
        account_id: AccountId,
        entity_type: &str,
        latest_only: bool,
    ) -> Result<Vec<EntityVersion>, GraphError> {
        self.snapshot()?
            .get_entities_by_type(account_id, entity_type, latest_only)
    }

    pub fn get_account_entities(&self, account_id: AccountId) -> Result<Vec<EntityVersion>, GraphError> {
        self.snapshot()?.get_account_entities(account_id)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<EntityVersion>, GraphError> {
        self.snapshot()?.get_user_by_email(email)
    }

    pub fn get_user_by_shortname(&self, shortname: &str) -> Result<Option<EntityVersion>, GraphError> {
        self.snapshot()?.get_user_by_shortname(shortname)
    }

    pub fn get_entity_history(
        &self,
        account_id: AccountId,
        entity_id: EntityId,
    ) -> Result<Option<Vec<HistoryEntry>>, GraphError> {
        self.snapshot()?.get_entity_history(account_id, entity_id)
    }

    pub fn get_entity_metadata(
        &self,
        account_id: AccountId,
        metadata_id: MetadataId,
    ) -> Result<Option<EntityMetadata>, GraphError> {
        self.snapshot()?.get_entity_metadata(account_id, metadata_id)
    }

    pub fn stats(&self) -> Result<StoreStats, GraphError> {
        self.snapshot()?.stats()
    }

    // =========================================================================
    // LINKS
    // =========================================================================

    pub fn create_link(&self, new: NewLink) -> Result<Link, GraphError> {
        self.run_transaction(|txn| txn.create_link(new))
    }

    pub fn delete_link(
        &self,
        source_account_id: AccountId,
        source_entity_id: EntityId,
        path: &str,
        index: usize,
    ) -> Result<bool, GraphError> {
        self.run_transaction(|txn| txn.delete_link(source_account_id, source_entity_id, path, index))
    }

    pub fn get_link_group(
        &self,
        source_account_id: AccountId,
        source_entity_id: EntityId,
        path: &str,
    ) -> Result<Vec<Link>, GraphError> {
        self.snapshot()?
            .get_link_group(source_account_id, source_entity_id, path)
    }

    pub fn get_link_groups(
        &self,
        source_account_id: AccountId,
        source_entity_id: EntityId,
    ) -> Result<Vec<LinkGroup>, GraphError> {
        self.snapshot()?
            .get_link_groups(source_account_id, source_entity_id)
    }

    pub fn get_linked_entities(
        &self,
        source_account_id: AccountId,
        source_entity_id: EntityId,
        path: &str,
    ) -> Result<Vec<EntityVersion>, GraphError> {
        self.snapshot()?
            .get_linked_entities(source_account_id, source_entity_id, path)
    }

    // =========================================================================
    // LOGIN CODES
    // =========================================================================

    pub fn create_login_code(
        &self,
        account_id: AccountId,
        user_entity_id: EntityId,
        login_code: impl Into<String>,
    ) -> Result<LoginCode, GraphError> {
        let login_code = login_code.into();
        self.run_transaction(|txn| txn.create_login_code(account_id, user_entity_id, login_code))
    }

    pub fn get_login_code(
        &self,
        account_id: AccountId,
        login_id: LoginId,
    ) -> Result<Option<LoginCode>, GraphError> {
        self.snapshot()?.get_login_code(account_id, login_id)
    }

    pub fn get_login_codes(
        &self,
        account_id: AccountId,
        user_entity_id: EntityId,
    ) -> Result<Vec<LoginCode>, GraphError> {
        self.snapshot()?.get_login_codes(account_id, user_entity_id)
    }

    pub fn increment_login_code_attempts(
        &self,
        account_id: AccountId,
        login_id: LoginId,
    ) -> Result<LoginCode, GraphError> {
        self.run_transaction(|txn| txn.increment_login_code_attempts(account_id, login_id))
    }

    // =========================================================================
    // AGGREGATION
    // =========================================================================

    /// Aggregate over a committed snapshot with the configured page limits.
    pub fn aggregate(
        &self,
        collection: &Collection,
        operation: &AggregateOperation,
    ) -> Result<AggregateResult, GraphError> {
        self.snapshot()?
            .aggregate(collection, operation, self.inner.config.page_limits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn redb_store_survives_reopen() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("graph.redb");
        let account = AccountId(uuid::Uuid::new_v4());

        let created = {
            let store = Store::open(&path, StoreConfig::default()).expect("open");
            store
                .create_entity(
                    NewEntity::new(account, EntityId(uuid::Uuid::new_v4()), "Page", PropertyValue::from("x"))
                        .versioned(),
                )
                .expect("create")
        };

        let store = Store::open(&path, StoreConfig::default()).expect("reopen");
        let fetched = store
            .get_entity(account, created.entity_id, true)
            .expect("get")
            .expect("present");
        assert_eq!(fetched, created);
        assert_eq!(store.stats().expect("stats").identities, 1);
    }

    #[test]
    fn builder_applies_config() {
        let config = StoreConfig::default().with_lock_timeout(Duration::from_millis(25));
        let store = Store::builder(Arc::new(MemoryMedium::new()))
            .config(config)
            .build();
        assert_eq!(store.config().lock_timeout_ms, 25);
    }

    #[test]
    fn transaction_ids_increase() {
        let store = Store::in_memory();
        let first = store.run_transaction(|txn| Ok(txn.id())).expect("first");
        let second = store.run_transaction(|txn| Ok(txn.id())).expect("second");
        assert!(second > first);
    }
}
