//! # Entity Store
//!
//! Versioned entities, their identities and shared metadata.
//!
//! ## Layout
//!
//! | Table        | Key                       | Value            |
//! |--------------|---------------------------|------------------|
//! | `versions`   | account, entity id        | [`VersionRecord`] |
//! | `identities` | account, metadata id      | [`IdentityRecord`] |
//! | `metadata`   | account, metadata id      | [`EntityMetadata`] |
//! | `type_index` | account, type, metadata id | empty           |
//!
//! The identity record owns the version chain (head first). Version records
//! are immutable once a newer head exists; a non-versioned entity has a
//! single version whose entity id equals its metadata id, overwritten in
//! place.
//!
//! Reads go through [`EntityReader`], implemented for every [`StoreRead`]
//! (a committed [`crate::storage::ReadView`] or a running [`Transaction`]).
//! Writes are methods on [`Transaction`].

use crate::identity::strictly_after;
use crate::locks::LockKey;
use crate::primitives::{
    ARCHIVED_PROPERTY, EMAIL_ADDRESS_FIELD, MAX_TYPE_LENGTH, USER_EMAILS_PROPERTY, USER_ENTITY_TYPE,
    USER_SHORTNAME_PROPERTY,
};
use crate::storage::{StoreRead, Table, decode, keys};
use crate::transaction::Transaction;
use crate::{
    AccountId, EntityId, EntityMetadata, EntityVersion, GraphError, HistoryEntry, MetadataId,
    PropertyValue,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// STORED RECORDS
// =============================================================================

/// One stored version, without the shared metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VersionRecord {
    pub entity_id: EntityId,
    pub metadata_id: MetadataId,
    pub created_by_id: EntityId,
    pub entity_type: String,
    pub versioned: bool,
    pub properties: PropertyValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The identity's chain of versions, head first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct IdentityRecord {
    pub metadata_id: MetadataId,
    pub entity_type: String,
    pub versioned: bool,
    pub created_by_id: EntityId,
    pub created_at: DateTime<Utc>,
    pub versions: Vec<HistoryEntry>,
}

impl IdentityRecord {
    fn head(&self) -> Result<HistoryEntry, GraphError> {
        self.versions.first().copied().ok_or_else(|| {
            GraphError::Serialization(format!("identity {} has no versions", self.metadata_id))
        })
    }
}

// =============================================================================
// INPUTS
// =============================================================================

/// Arguments of [`Transaction::create_entity`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub account_id: AccountId,
    pub created_by_id: EntityId,
    pub entity_type: String,
    pub properties: PropertyValue,
    pub versioned: bool,
    /// Explicit id for the first version. Generated when `None`.
    pub entity_id: Option<EntityId>,
}

impl NewEntity {
    /// A non-versioned entity with a generated id.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        created_by_id: EntityId,
        entity_type: impl Into<String>,
        properties: PropertyValue,
    ) -> Self {
        Self {
            account_id,
            created_by_id,
            entity_type: entity_type.into(),
            properties,
            versioned: false,
            entity_id: None,
        }
    }

    /// Keep every past version on update.
    #[must_use]
    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    #[must_use]
    pub fn with_entity_id(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }
}

fn validate_type(entity_type: &str) -> Result<(), GraphError> {
    if entity_type.is_empty() {
        return Err(GraphError::InvalidInput("entity type must not be empty".to_string()));
    }
    if entity_type.len() > MAX_TYPE_LENGTH {
        return Err(GraphError::InvalidInput(format!(
            "entity type exceeds {} bytes",
            MAX_TYPE_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// RECORD ACCESS
// =============================================================================

pub(crate) fn load_version<R: StoreRead + ?Sized>(
    reader: &R,
    account: AccountId,
    entity_id: EntityId,
) -> Result<Option<VersionRecord>, GraphError> {
    reader
        .read(Table::Versions, &keys::version_key(account, entity_id))?
        .map(|bytes| decode(&bytes))
        .transpose()
}

pub(crate) fn load_identity<R: StoreRead + ?Sized>(
    reader: &R,
    account: AccountId,
    metadata_id: MetadataId,
) -> Result<Option<IdentityRecord>, GraphError> {
    reader
        .read(Table::Identities, &keys::identity_key(account, metadata_id))?
        .map(|bytes| decode(&bytes))
        .transpose()
}

fn load_metadata<R: StoreRead + ?Sized>(
    reader: &R,
    account: AccountId,
    metadata_id: MetadataId,
) -> Result<Option<EntityMetadata>, GraphError> {
    reader
        .read(Table::Metadata, &keys::identity_key(account, metadata_id))?
        .map(|bytes| decode(&bytes))
        .transpose()
}

fn assemble<R: StoreRead + ?Sized>(
    reader: &R,
    account: AccountId,
    record: VersionRecord,
) -> Result<EntityVersion, GraphError> {
    let metadata = load_metadata(reader, account, record.metadata_id)?.unwrap_or_else(|| {
        EntityMetadata {
            account_id: account,
            metadata_id: record.metadata_id,
            extra: PropertyValue::object(),
        }
    });
    Ok(EntityVersion {
        account_id: account,
        entity_id: record.entity_id,
        metadata_id: record.metadata_id,
        created_by_id: record.created_by_id,
        entity_type: record.entity_type,
        versioned: record.versioned,
        properties: record.properties,
        metadata,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

fn head_of<R: StoreRead + ?Sized>(
    reader: &R,
    account: AccountId,
    identity: &IdentityRecord,
) -> Result<Option<EntityVersion>, GraphError> {
    let head = identity.head()?;
    load_version(reader, account, head.entity_id)?
        .map(|record| assemble(reader, account, record))
        .transpose()
}

fn chain_of<R: StoreRead + ?Sized>(
    reader: &R,
    account: AccountId,
    identity: &IdentityRecord,
) -> Result<Vec<EntityVersion>, GraphError> {
    let mut versions = Vec::with_capacity(identity.versions.len());
    for entry in &identity.versions {
        if let Some(record) = load_version(reader, account, entry.entity_id)? {
            versions.push(assemble(reader, account, record)?);
        }
    }
    Ok(versions)
}

fn sort_identities(identities: &mut [IdentityRecord]) {
    identities.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.metadata_id.cmp(&b.metadata_id))
    });
}

/// Head of the oldest `User` identity, across all accounts, whose
/// properties satisfy `matches`.
fn find_user<R: StoreRead + ?Sized>(
    reader: &R,
    matches: impl Fn(&PropertyValue) -> bool,
) -> Result<Option<EntityVersion>, GraphError> {
    let mut users = Vec::new();
    for (key, _) in reader.scan(Table::TypeIndex, &[])? {
        let (account_id, entity_type, metadata_id) = keys::split_type_key(&key)?;
        if entity_type != USER_ENTITY_TYPE {
            continue;
        }
        if let Some(identity) = load_identity(reader, account_id, metadata_id)? {
            users.push((account_id, identity));
        }
    }
    users.sort_by(|(_, a), (_, b)| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.metadata_id.cmp(&b.metadata_id))
    });

    for (account_id, identity) in &users {
        if let Some(head) = head_of(reader, *account_id, identity)? {
            if matches(&head.properties) {
                return Ok(Some(head));
            }
        }
    }
    Ok(None)
}

fn has_email(properties: &PropertyValue, email: &str) -> bool {
    match properties.get_path(USER_EMAILS_PROPERTY) {
        Some(PropertyValue::Array(entries)) => entries.iter().any(|entry| {
            matches!(
                entry.get_path(EMAIL_ADDRESS_FIELD),
                Some(PropertyValue::String(address)) if address == email
            )
        }),
        _ => false,
    }
}

// =============================================================================
// READS
// =============================================================================

/// Counts of stored records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub identities: usize,
    pub versions: usize,
    pub links: usize,
    pub login_codes: usize,
}

/// Entity queries over any consistent read state.
pub trait EntityReader: StoreRead {
    /// Fetch a version. With `latest`, resolve to the identity's current
    /// head whichever version id was passed.
    fn get_entity(
        &self,
        account_id: AccountId,
        entity_id: EntityId,
        latest: bool,
    ) -> Result<Option<EntityVersion>, GraphError> {
        let Some(record) = load_version(self, account_id, entity_id)? else {
            return Ok(None);
        };
        if !latest {
            return assemble(self, account_id, record).map(Some);
        }
        match load_identity(self, account_id, record.metadata_id)? {
            Some(identity) if identity.head()?.entity_id != entity_id => {
                head_of(self, account_id, &identity)
            }
            _ => assemble(self, account_id, record).map(Some),
        }
    }

    /// Every version of the identity owning `entity_id`, head first.
    fn get_entity_versions(
        &self,
        account_id: AccountId,
        entity_id: EntityId,
    ) -> Result<Vec<EntityVersion>, GraphError> {
        let Some(record) = load_version(self, account_id, entity_id)? else {
            return Ok(Vec::new());
        };
        match load_identity(self, account_id, record.metadata_id)? {
            Some(identity) => chain_of(self, account_id, &identity),
            None => Ok(vec![assemble(self, account_id, record)?]),
        }
    }

    /// `(entityId, createdAt)` of every version of the identity, head first.
    fn get_entity_history(
        &self,
        account_id: AccountId,
        entity_id: EntityId,
    ) -> Result<Option<Vec<HistoryEntry>>, GraphError> {
        let Some(record) = load_version(self, account_id, entity_id)? else {
            return Ok(None);
        };
        Ok(load_identity(self, account_id, record.metadata_id)?.map(|identity| identity.versions))
    }

    fn get_entity_metadata(
        &self,
        account_id: AccountId,
        metadata_id: MetadataId,
    ) -> Result<Option<EntityMetadata>, GraphError> {
        load_metadata(self, account_id, metadata_id)
    }

    /// Entities of one type, oldest identity first.
    ///
    /// With `latest_only` each identity contributes its head; otherwise its
    /// whole chain, head first.
    fn get_entities_by_type(
        &self,
        account_id: AccountId,
        entity_type: &str,
        latest_only: bool,
    ) -> Result<Vec<EntityVersion>, GraphError> {
        let mut identities = Vec::new();
        for (key, _) in self.scan(Table::TypeIndex, &keys::type_prefix(account_id, entity_type))? {
            let metadata_id = keys::metadata_from_type_key(&key)?;
            if let Some(identity) = load_identity(self, account_id, metadata_id)? {
                identities.push(identity);
            }
        }
        sort_identities(&mut identities);

        let mut entities = Vec::new();
        for identity in &identities {
            if latest_only {
                entities.extend(head_of(self, account_id, identity)?);
            } else {
                entities.extend(chain_of(self, account_id, identity)?);
            }
        }
        Ok(entities)
    }

    /// The latest version of every identity in the account, oldest first.
    fn get_account_entities(&self, account_id: AccountId) -> Result<Vec<EntityVersion>, GraphError> {
        let mut identities = self
            .scan(Table::Identities, &keys::account_prefix(account_id))?
            .into_iter()
            .map(|(_, bytes)| decode::<IdentityRecord>(&bytes))
            .collect::<Result<Vec<_>, _>>()?;
        sort_identities(&mut identities);

        let mut entities = Vec::with_capacity(identities.len());
        for identity in &identities {
            entities.extend(head_of(self, account_id, identity)?);
        }
        Ok(entities)
    }

    /// The user whose latest version lists `email` under
    /// `properties.emails[*].address`. Exact match, any account.
    fn get_user_by_email(&self, email: &str) -> Result<Option<EntityVersion>, GraphError> {
        find_user(self, |properties| has_email(properties, email))
    }

    /// The user whose latest version has `properties.shortname == shortname`.
    fn get_user_by_shortname(&self, shortname: &str) -> Result<Option<EntityVersion>, GraphError> {
        find_user(self, |properties| {
            matches!(
                properties.get_path(USER_SHORTNAME_PROPERTY),
                Some(PropertyValue::String(name)) if name == shortname
            )
        })
    }

    /// Record counts across all accounts.
    fn stats(&self) -> Result<StoreStats, GraphError> {
        Ok(StoreStats {
            identities: self.scan(Table::Identities, &[])?.len(),
            versions: self.scan(Table::Versions, &[])?.len(),
            links: self.scan(Table::Links, &[])?.len(),
            login_codes: self.scan(Table::LoginCodes, &[])?.len(),
        })
    }
}

impl<T: StoreRead + ?Sized> EntityReader for T {}

// =============================================================================
// WRITES
// =============================================================================

impl Transaction<'_> {
    /// Create the first version of a new identity.
    pub fn create_entity(&mut self, new: NewEntity) -> Result<EntityVersion, GraphError> {
        validate_type(&new.entity_type)?;
        let account = new.account_id;

        let entity_id = match new.entity_id {
            Some(explicit) => {
                self.lock(LockKey::Version(account, explicit))?;
                let taken = self
                    .read_latest(Table::Versions, &keys::version_key(account, explicit))?
                    .is_some()
                    || self
                        .read_latest(
                            Table::Identities,
                            &keys::identity_key(account, MetadataId(explicit.0)),
                        )?
                        .is_some();
                if taken {
                    return Err(GraphError::AlreadyExists(format!(
                        "entity {} in account {}",
                        explicit, account
                    )));
                }
                explicit
            }
            None => self.store().ids.new_version_id(),
        };
        let metadata_id = if new.versioned {
            self.store().ids.new_identity()
        } else {
            MetadataId(entity_id.0)
        };
        let now = self.store().clock.now();

        let record = VersionRecord {
            entity_id,
            metadata_id,
            created_by_id: new.created_by_id,
            entity_type: new.entity_type.clone(),
            versioned: new.versioned,
            properties: new.properties,
            created_at: now,
            updated_at: now,
        };
        let identity = IdentityRecord {
            metadata_id,
            entity_type: new.entity_type.clone(),
            versioned: new.versioned,
            created_by_id: new.created_by_id,
            created_at: now,
            versions: vec![HistoryEntry {
                entity_id,
                created_at: now,
            }],
        };
        let metadata = EntityMetadata {
            account_id: account,
            metadata_id,
            extra: PropertyValue::object(),
        };

        self.put_record(Table::Versions, keys::version_key(account, entity_id), &record)?;
        self.put_record(Table::Identities, keys::identity_key(account, metadata_id), &identity)?;
        self.put_record(Table::Metadata, keys::identity_key(account, metadata_id), &metadata)?;
        self.put(
            Table::TypeIndex,
            keys::type_index_key(account, &new.entity_type, metadata_id),
            Vec::new(),
        );

        tracing::debug!(txn = self.id(), %account, %entity_id, entity_type = %new.entity_type, "entity created");
        Ok(EntityVersion {
            account_id: account,
            entity_id: record.entity_id,
            metadata_id,
            created_by_id: record.created_by_id,
            entity_type: record.entity_type,
            versioned: record.versioned,
            properties: record.properties,
            metadata,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Lock the identity owning `entity_id` and return it, freshly read.
    fn lock_identity_of(
        &mut self,
        account: AccountId,
        entity_id: EntityId,
    ) -> Result<IdentityRecord, GraphError> {
        let not_found = || GraphError::NotFound(format!("entity {} in account {}", entity_id, account));
        let record = load_version(&self.latest(), account, entity_id)?.ok_or_else(not_found)?;
        self.lock(LockKey::Identity(account, record.metadata_id))?;
        load_identity(&self.latest(), account, record.metadata_id)?.ok_or_else(not_found)
    }

    /// Replace the properties of the identity owning `entity_id`.
    ///
    /// Always applies to the current head, whichever version id was passed.
    /// Versioned identities gain a new head (which inherits the old head's
    /// link groups); non-versioned ones are overwritten in place. Returns
    /// every version, head first.
    pub fn update_entity(
        &mut self,
        account_id: AccountId,
        entity_id: EntityId,
        expected_type: Option<&str>,
        properties: PropertyValue,
    ) -> Result<Vec<EntityVersion>, GraphError> {
        let mut identity = self.lock_identity_of(account_id, entity_id)?;
        if let Some(expected) = expected_type
            && expected != identity.entity_type
        {
            return Err(GraphError::TypeMismatch {
                expected: expected.to_string(),
                actual: identity.entity_type.clone(),
            });
        }

        let head_entry = identity.head()?;
        let head = load_version(&self.latest(), account_id, head_entry.entity_id)?.ok_or_else(|| {
            GraphError::NotFound(format!("head version {} in account {}", head_entry.entity_id, account_id))
        })?;
        let now = self.store().clock.now();

        if identity.versioned {
            let new_id = self.store().ids.new_version_id();
            let created_at = strictly_after(now, head.created_at);
            let record = VersionRecord {
                entity_id: new_id,
                created_at,
                updated_at: created_at,
                properties,
                ..head
            };
            identity.versions.insert(
                0,
                HistoryEntry {
                    entity_id: new_id,
                    created_at,
                },
            );
            self.put_record(Table::Versions, keys::version_key(account_id, new_id), &record)?;
            self.put_record(
                Table::Identities,
                keys::identity_key(account_id, identity.metadata_id),
                &identity,
            )?;
            self.carry_links(account_id, head_entry.entity_id, new_id)?;
            tracing::debug!(txn = self.id(), account = %account_id, head = %new_id, versions = identity.versions.len(), "entity version appended");
        } else {
            let record = VersionRecord {
                updated_at: strictly_after(now, head.updated_at),
                properties,
                ..head
            };
            self.put_record(
                Table::Versions,
                keys::version_key(account_id, record.entity_id),
                &record,
            )?;
            tracing::debug!(txn = self.id(), account = %account_id, entity = %record.entity_id, "entity overwritten");
        }

        chain_of(&self.latest(), account_id, &identity)
    }

    /// Merge `extra` into the identity's shared metadata.
    pub fn update_entity_metadata(
        &mut self,
        account_id: AccountId,
        metadata_id: MetadataId,
        extra: PropertyValue,
    ) -> Result<EntityMetadata, GraphError> {
        self.lock(LockKey::Identity(account_id, metadata_id))?;
        let mut metadata = load_metadata(&self.latest(), account_id, metadata_id)?.ok_or_else(|| {
            GraphError::NotFound(format!("metadata {} in account {}", metadata_id, account_id))
        })?;
        metadata.extra.merge(extra);
        self.put_record(
            Table::Metadata,
            keys::identity_key(account_id, metadata_id),
            &metadata,
        )?;
        Ok(metadata)
    }

    /// Flag the identity's latest version as archived. Nothing is deleted.
    pub fn archive_entity(
        &mut self,
        account_id: AccountId,
        entity_id: EntityId,
    ) -> Result<EntityVersion, GraphError> {
        let identity = self.lock_identity_of(account_id, entity_id)?;
        let head = head_of(&self.latest(), account_id, &identity)?.ok_or_else(|| {
            GraphError::NotFound(format!("entity {} in account {}", entity_id, account_id))
        })?;
        let mut properties = head.properties;
        properties.set(ARCHIVED_PROPERTY, true);

        let versions = self.update_entity(account_id, entity_id, None, properties)?;
        versions.into_iter().next().ok_or_else(|| {
            GraphError::NotFound(format!("entity {} in account {}", entity_id, account_id))
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::identity::{ManualClock, SequentialIds};
    use chrono::TimeDelta;
    use std::sync::Arc;
    use uuid::Uuid;

    fn account() -> AccountId {
        AccountId(Uuid::from_u128(0xA))
    }

    fn user() -> EntityId {
        EntityId(Uuid::from_u128(0xB))
    }

    fn page(title: &str) -> NewEntity {
        NewEntity::new(
            account(),
            user(),
            "Page",
            PropertyValue::from_pairs([("title", title)]),
        )
    }

    #[test]
    fn create_and_get_non_versioned() {
        let store = Store::in_memory();
        let created = store.create_entity(page("a")).expect("create");

        assert_eq!(created.entity_id.0, created.metadata_id.0);
        assert_eq!(created.created_at, created.updated_at);
        assert!(!created.versioned);

        let fetched = store
            .get_entity(account(), created.entity_id, false)
            .expect("get")
            .expect("present");
        assert_eq!(fetched, created);
    }

    #[test]
    fn missing_entity_is_absent_not_error() {
        let store = Store::in_memory();
        let missing = EntityId(Uuid::from_u128(404));
        assert!(store.get_entity(account(), missing, true).expect("get").is_none());
        assert!(store.get_entity_history(account(), missing).expect("history").is_none());
    }

    #[test]
    fn explicit_id_collision_is_already_exists() {
        let store = Store::in_memory();
        let id = EntityId(Uuid::from_u128(7));
        store.create_entity(page("a").with_entity_id(id)).expect("first");
        let again = store.create_entity(page("b").with_entity_id(id));
        assert!(matches!(again, Err(GraphError::AlreadyExists(_))));

        // Same id in another account is fine.
        let mut other = page("c").with_entity_id(id);
        other.account_id = AccountId(Uuid::from_u128(0xC));
        store.create_entity(other).expect("other account");
    }

    #[test]
    fn type_is_validated() {
        let store = Store::in_memory();
        let empty = NewEntity::new(account(), user(), "", PropertyValue::Null);
        assert!(matches!(store.create_entity(empty), Err(GraphError::InvalidInput(_))));

        let long = NewEntity::new(account(), user(), "x".repeat(MAX_TYPE_LENGTH + 1), PropertyValue::Null);
        assert!(matches!(store.create_entity(long), Err(GraphError::InvalidInput(_))));
    }

    #[test]
    fn versioned_update_appends_and_retargets_to_head() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Store::in_memory_with(
            Arc::new(SequentialIds::starting_at(100)),
            Arc::clone(&clock) as Arc<dyn crate::Clock>,
        );
        let first = store.create_entity(page("v1").versioned()).expect("create");

        clock.advance(TimeDelta::seconds(1));
        let after_second = store
            .update_entity(account(), first.entity_id, Some("Page"), PropertyValue::from_pairs([("title", "v2")]))
            .expect("update");
        assert_eq!(after_second.len(), 2);

        // Updating through the stale id still appends on top of the head.
        clock.advance(TimeDelta::seconds(1));
        let chain = store
            .update_entity(account(), first.entity_id, None, PropertyValue::from_pairs([("title", "v3")]))
            .expect("update");
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].properties.get_path("title"), Some(&PropertyValue::from("v3")));
        assert_eq!(chain[2].entity_id, first.entity_id);
        assert_eq!(chain[2].created_at, first.created_at);
        assert!(chain.windows(2).all(|w| w[0].created_at > w[1].created_at));
        assert!(chain.iter().all(|v| v.metadata_id == first.metadata_id));

        // History is frozen.
        let old = store
            .get_entity(account(), first.entity_id, false)
            .expect("get")
            .expect("present");
        assert_eq!(old.properties, first.properties);

        let latest = store
            .get_entity(account(), first.entity_id, true)
            .expect("get")
            .expect("present");
        assert_eq!(latest.entity_id, chain[0].entity_id);
    }

    #[test]
    fn stalled_clock_still_orders_versions() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Store::in_memory_with(
            Arc::new(SequentialIds::starting_at(1)),
            clock as Arc<dyn crate::Clock>,
        );
        let first = store.create_entity(page("v1").versioned()).expect("create");
        for n in 0..4_i64 {
            store
                .update_entity(account(), first.entity_id, None, PropertyValue::from(n))
                .expect("update");
        }
        let chain = store
            .update_entity(account(), first.entity_id, None, PropertyValue::from(4_i64))
            .expect("update");
        assert_eq!(chain.len(), 6);
        assert!(chain.windows(2).all(|w| w[0].created_at > w[1].created_at));
    }

    #[test]
    fn non_versioned_update_overwrites_in_place() {
        let store = Store::in_memory();
        let created = store.create_entity(page("a")).expect("create");
        let chain = store
            .update_entity(account(), created.entity_id, Some("Page"), PropertyValue::from_pairs([("title", "b")]))
            .expect("update");

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].entity_id, created.entity_id);
        assert_eq!(chain[0].created_at, created.created_at);
        assert!(chain[0].updated_at > created.updated_at);
    }

    #[test]
    fn type_mismatch_leaves_store_unchanged() {
        let store = Store::in_memory();
        let created = store.create_entity(page("a").versioned()).expect("create");
        let before = store.stats().expect("stats");

        let result = store.update_entity(account(), created.entity_id, Some("Block"), PropertyValue::Null);
        assert!(matches!(
            result,
            Err(GraphError::TypeMismatch { ref expected, ref actual }) if expected == "Block" && actual == "Page"
        ));
        assert_eq!(store.stats().expect("stats"), before);
    }

    #[test]
    fn update_of_unknown_entity_is_not_found() {
        let store = Store::in_memory();
        let result = store.update_entity(account(), EntityId(Uuid::from_u128(1)), None, PropertyValue::Null);
        assert!(matches!(result, Err(GraphError::NotFound(_))));
    }

    #[test]
    fn metadata_is_shared_and_merged() {
        let store = Store::in_memory();
        let created = store.create_entity(page("a").versioned()).expect("create");
        store
            .update_entity(account(), created.entity_id, None, PropertyValue::from_pairs([("title", "b")]))
            .expect("update");

        store
            .update_entity_metadata(account(), created.metadata_id, PropertyValue::from_pairs([("color", "red")]))
            .expect("metadata");
        let merged = store
            .update_entity_metadata(account(), created.metadata_id, PropertyValue::from_pairs([("size", 3_i64)]))
            .expect("metadata");
        assert_eq!(merged.extra.get_path("color"), Some(&PropertyValue::from("red")));
        assert_eq!(merged.extra.get_path("size"), Some(&PropertyValue::Integer(3)));

        let versions = store
            .run_transaction(|txn| txn.get_entity_versions(account(), created.entity_id))
            .expect("versions");
        assert!(versions.iter().all(|v| v.metadata == merged));

        let missing = store.update_entity_metadata(account(), MetadataId(Uuid::from_u128(9)), PropertyValue::Null);
        assert!(matches!(missing, Err(GraphError::NotFound(_))));
    }

    #[test]
    fn archive_sets_flag_on_new_head() {
        let store = Store::in_memory();
        let created = store.create_entity(page("a").versioned()).expect("create");
        let archived = store.archive_entity(account(), created.entity_id).expect("archive");

        assert!(archived.is_archived());
        assert_ne!(archived.entity_id, created.entity_id);
        assert_eq!(archived.properties.get_path("title"), Some(&PropertyValue::from("a")));

        let history = store
            .get_entity_history(account(), created.entity_id)
            .expect("history")
            .expect("present");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].entity_id, archived.entity_id);
    }

    #[test]
    fn listing_by_type_and_account() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Store::in_memory_with(
            Arc::new(SequentialIds::starting_at(500)),
            Arc::clone(&clock) as Arc<dyn crate::Clock>,
        );
        let a = store.create_entity(page("a").versioned()).expect("a");
        clock.advance(TimeDelta::seconds(1));
        let b = store.create_entity(page("b")).expect("b");
        clock.advance(TimeDelta::seconds(1));
        store
            .create_entity(NewEntity::new(account(), user(), "Block", PropertyValue::Null))
            .expect("block");
        store
            .update_entity(account(), a.entity_id, None, PropertyValue::from_pairs([("title", "a2")]))
            .expect("update");

        let latest = store.get_entities_by_type(account(), "Page", true).expect("by type");
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].metadata_id, a.metadata_id);
        assert_eq!(latest[0].properties.get_path("title"), Some(&PropertyValue::from("a2")));
        assert_eq!(latest[1].entity_id, b.entity_id);

        let all = store.get_entities_by_type(account(), "Page", false).expect("by type");
        assert_eq!(all.len(), 3);

        assert_eq!(store.get_account_entities(account()).expect("account").len(), 3);
        assert!(store.get_entities_by_type(account(), "Pag", true).expect("prefix").is_empty());
        assert!(
            store
                .get_account_entities(AccountId(Uuid::from_u128(0xFF)))
                .expect("other account")
                .is_empty()
        );
    }

    #[test]
    fn users_found_by_email_and_shortname() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Store::in_memory_with(
            Arc::new(SequentialIds::starting_at(700)),
            Arc::clone(&clock) as Arc<dyn crate::Clock>,
        );
        let properties = |email: &str, shortname: &str| {
            PropertyValue::from(serde_json::json!({
                "shortname": shortname,
                "emails": [
                    { "address": format!("old-{email}"), "primary": false },
                    { "address": email, "primary": true, "verified": false },
                ],
            }))
        };
        let other_account = AccountId(Uuid::from_u128(0xC));

        let alice = store
            .create_entity(
                NewEntity::new(account(), user(), "User", properties("alice@example.com", "alice"))
                    .versioned(),
            )
            .expect("alice");
        clock.advance(TimeDelta::seconds(1));
        let bob = store
            .create_entity(NewEntity::new(other_account, user(), "User", properties("bob@example.com", "bob")))
            .expect("bob");
        store
            .create_entity(NewEntity::new(account(), user(), "Org", properties("org@example.com", "bigco")))
            .expect("org");

        let found = store.get_user_by_email("alice@example.com").expect("lookup").expect("alice");
        assert_eq!(found.entity_id, alice.entity_id);
        let found = store.get_user_by_email("old-bob@example.com").expect("lookup").expect("bob");
        assert_eq!(found.entity_id, bob.entity_id);
        assert_eq!(found.account_id, other_account);
        let found = store.get_user_by_shortname("bob").expect("lookup").expect("bob");
        assert_eq!(found.entity_id, bob.entity_id);

        // Only users, exact matches, latest version.
        assert!(store.get_user_by_shortname("bigco").expect("lookup").is_none());
        assert!(store.get_user_by_email("ALICE@example.com").expect("lookup").is_none());
        let chain = store
            .update_entity(account(), alice.entity_id, None, properties("alice@new.example", "alice2"))
            .expect("update");
        assert!(store.get_user_by_shortname("alice").expect("lookup").is_none());
        let found = store.get_user_by_shortname("alice2").expect("lookup").expect("alice2");
        assert_eq!(found.entity_id, chain[0].entity_id);
    }
}
