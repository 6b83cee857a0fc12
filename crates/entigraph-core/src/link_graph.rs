//! # Link Graph
//!
//! Directed, path-labelled, ordered edges from an entity version to another
//! entity. Links live in their own table keyed by
//! `(account, source, path, index)`, so a group is one prefix scan and
//! graph cycles never become ownership cycles.
//!
//! Indices inside a `(source, path)` group are always `0..len`. Insertion
//! and deletion rewrite the affected tail of the group while holding the
//! source's link lock, so concurrent inserts are ordered by commit and
//! never share a slot.

use crate::entity_store::{EntityReader, load_version};
use crate::locks::LockKey;
use crate::primitives::MAX_LINK_PATH_LENGTH;
use crate::storage::{StoreRead, Table, decode, keys};
use crate::transaction::Transaction;
use crate::{AccountId, EntityId, EntityVersion, GraphError, Link, LinkGroup};

/// Arguments of [`Transaction::create_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub source_account_id: AccountId,
    pub source_entity_id: EntityId,
    pub destination_account_id: AccountId,
    pub destination_entity_id: EntityId,
    /// Pin to one destination version instead of following its head.
    pub destination_version_id: Option<EntityId>,
    pub path: String,
    /// Insert position. Appends when `None`.
    pub index: Option<i64>,
}

impl NewLink {
    #[must_use]
    pub fn new(
        source_account_id: AccountId,
        source_entity_id: EntityId,
        destination_account_id: AccountId,
        destination_entity_id: EntityId,
        path: impl Into<String>,
    ) -> Self {
        Self {
            source_account_id,
            source_entity_id,
            destination_account_id,
            destination_entity_id,
            destination_version_id: None,
            path: path.into(),
            index: None,
        }
    }

    #[must_use]
    pub fn at_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn pinned_to(mut self, version: EntityId) -> Self {
        self.destination_version_id = Some(version);
        self
    }
}

fn validate_path(path: &str) -> Result<(), GraphError> {
    if path.is_empty() {
        return Err(GraphError::InvalidInput("link path must not be empty".to_string()));
    }
    if path.len() > MAX_LINK_PATH_LENGTH {
        return Err(GraphError::InvalidInput(format!(
            "link path exceeds {} bytes",
            MAX_LINK_PATH_LENGTH
        )));
    }
    Ok(())
}

fn decode_links(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Vec<Link>, GraphError> {
    entries
        .into_iter()
        .map(|(_, bytes)| decode::<Link>(&bytes))
        .collect()
}

// =============================================================================
// READS
// =============================================================================

/// Link queries over any consistent read state.
pub trait LinkReader: StoreRead {
    /// One group, in index order. Empty when the group does not exist.
    fn get_link_group(
        &self,
        source_account_id: AccountId,
        source_entity_id: EntityId,
        path: &str,
    ) -> Result<Vec<Link>, GraphError> {
        decode_links(self.scan(
            Table::Links,
            &keys::link_group_prefix(source_account_id, source_entity_id, path),
        )?)
    }

    /// Every group of a source version, ordered by path.
    fn get_link_groups(
        &self,
        source_account_id: AccountId,
        source_entity_id: EntityId,
    ) -> Result<Vec<LinkGroup>, GraphError> {
        let links = decode_links(self.scan(
            Table::Links,
            &keys::link_source_prefix(source_account_id, source_entity_id),
        )?)?;

        let mut groups: Vec<LinkGroup> = Vec::new();
        for link in links {
            match groups.last_mut() {
                Some(group) if group.path == link.path => group.links.push(link),
                _ => groups.push(LinkGroup {
                    source_account_id,
                    source_entity_id,
                    path: link.path.clone(),
                    links: vec![link],
                }),
            }
        }
        groups.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(groups)
    }

    /// What a link points at: its pinned version, or the destination's head.
    fn resolve_link(&self, link: &Link) -> Result<Option<EntityVersion>, GraphError> {
        match link.destination_version_id {
            Some(version) => self.get_entity(link.destination_account_id, version, false),
            None => self.get_entity(link.destination_account_id, link.destination_entity_id, true),
        }
    }

    /// Resolved destinations of one group in link order. Dangling links are
    /// skipped.
    fn get_linked_entities(
        &self,
        source_account_id: AccountId,
        source_entity_id: EntityId,
        path: &str,
    ) -> Result<Vec<EntityVersion>, GraphError> {
        let mut entities = Vec::new();
        for link in self.get_link_group(source_account_id, source_entity_id, path)? {
            entities.extend(self.resolve_link(&link)?);
        }
        Ok(entities)
    }
}

impl<T: StoreRead + ?Sized> LinkReader for T {}

// =============================================================================
// WRITES
// =============================================================================

impl Transaction<'_> {
    fn put_link(&mut self, link: &Link) -> Result<(), GraphError> {
        self.put_record(
            Table::Links,
            keys::link_key(
                link.source_account_id,
                link.source_entity_id,
                &link.path,
                link.index,
            ),
            link,
        )
    }

    fn locked_group(
        &mut self,
        account: AccountId,
        source: EntityId,
        path: &str,
    ) -> Result<Vec<Link>, GraphError> {
        self.lock(LockKey::LinkSource(account, source))?;
        decode_links(self.scan_latest(Table::Links, &keys::link_group_prefix(account, source, path))?)
    }

    /// Insert a link at `index` (or append), shifting later links up by one.
    pub fn create_link(&mut self, new: NewLink) -> Result<Link, GraphError> {
        validate_path(&new.path)?;
        let latest = self.latest();
        if load_version(&latest, new.source_account_id, new.source_entity_id)?.is_none() {
            return Err(GraphError::NotFound(format!(
                "source entity {} in account {}",
                new.source_entity_id, new.source_account_id
            )));
        }
        let destination = load_version(&latest, new.destination_account_id, new.destination_entity_id)?
            .ok_or_else(|| {
                GraphError::NotFound(format!(
                    "destination entity {} in account {}",
                    new.destination_entity_id, new.destination_account_id
                ))
            })?;
        if let Some(pinned) = new.destination_version_id {
            let same_identity = load_version(&latest, new.destination_account_id, pinned)?
                .is_some_and(|version| version.metadata_id == destination.metadata_id);
            if !same_identity {
                return Err(GraphError::NotFound(format!(
                    "destination version {} of entity {}",
                    pinned, new.destination_entity_id
                )));
            }
        }

        let group = self.locked_group(new.source_account_id, new.source_entity_id, &new.path)?;
        let len = group.len();
        let index = match new.index {
            None => len,
            Some(i) => match usize::try_from(i) {
                Ok(position) if position <= len => position,
                _ => return Err(GraphError::InvalidIndex { index: i, len }),
            },
        };

        for mut moved in group.into_iter().skip(index) {
            moved.index += 1;
            self.put_link(&moved)?;
        }
        let link = Link {
            source_account_id: new.source_account_id,
            source_entity_id: new.source_entity_id,
            destination_account_id: new.destination_account_id,
            destination_entity_id: new.destination_entity_id,
            destination_version_id: new.destination_version_id,
            path: new.path,
            index,
        };
        self.put_link(&link)?;
        tracing::debug!(txn = self.id(), source = %link.source_entity_id, path = %link.path, index, "link created");
        Ok(link)
    }

    /// Remove the link at `index`, shifting later links down by one.
    /// `Ok(false)` when there is no such link.
    pub fn delete_link(
        &mut self,
        source_account_id: AccountId,
        source_entity_id: EntityId,
        path: &str,
        index: usize,
    ) -> Result<bool, GraphError> {
        let group = self.locked_group(source_account_id, source_entity_id, path)?;
        let len = group.len();
        if index >= len {
            return Ok(false);
        }

        for mut moved in group.into_iter().skip(index + 1) {
            moved.index -= 1;
            self.put_link(&moved)?;
        }
        self.delete(
            Table::Links,
            keys::link_key(source_account_id, source_entity_id, path, len - 1),
        );
        tracing::debug!(txn = self.id(), source = %source_entity_id, path, index, "link deleted");
        Ok(true)
    }

    /// Copy every group of `from` onto the new head `to`.
    pub(crate) fn carry_links(
        &mut self,
        account: AccountId,
        from: EntityId,
        to: EntityId,
    ) -> Result<(), GraphError> {
        self.lock(LockKey::LinkSource(account, from))?;
        let links = decode_links(self.scan_latest(Table::Links, &keys::link_source_prefix(account, from))?)?;
        for mut link in links {
            link.source_entity_id = to;
            self.put_link(&link)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
