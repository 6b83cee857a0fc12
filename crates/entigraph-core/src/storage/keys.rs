//! Binary key layouts.
//!
//! Ids are written as their 16 raw bytes and strings are length-prefixed
//! (u32 big-endian), so a prefix scan addresses exactly one account, one
//! type, one link source or one link group. Link indices are u32 big-endian
//! so byte order equals index order.

use crate::{AccountId, EntityId, GraphError, LoginId, MetadataId};

const ID_LEN: usize = 16;

fn with_account(account: AccountId, extra: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN + extra);
    key.extend_from_slice(account.as_bytes());
    key
}

fn push_str(key: &mut Vec<u8>, s: &str) {
    key.extend_from_slice(&(s.len() as u32).to_be_bytes());
    key.extend_from_slice(s.as_bytes());
}

fn read_id(bytes: &[u8], offset: usize) -> Result<[u8; ID_LEN], GraphError> {
    bytes
        .get(offset..offset + ID_LEN)
        .and_then(|slice| <[u8; ID_LEN]>::try_from(slice).ok())
        .ok_or_else(|| GraphError::Serialization("truncated key".to_string()))
}

/// Every key of one account in an account-scoped table.
#[must_use]
pub fn account_prefix(account: AccountId) -> Vec<u8> {
    with_account(account, 0)
}

#[must_use]
pub fn version_key(account: AccountId, entity: EntityId) -> Vec<u8> {
    let mut key = with_account(account, ID_LEN);
    key.extend_from_slice(entity.as_bytes());
    key
}

#[must_use]
pub fn identity_key(account: AccountId, metadata: MetadataId) -> Vec<u8> {
    let mut key = with_account(account, ID_LEN);
    key.extend_from_slice(metadata.as_bytes());
    key
}

/// Prefix of every identity of `entity_type` in `account`.
#[must_use]
pub fn type_prefix(account: AccountId, entity_type: &str) -> Vec<u8> {
    let mut key = with_account(account, 4 + entity_type.len() + ID_LEN);
    push_str(&mut key, entity_type);
    key
}

#[must_use]
pub fn type_index_key(account: AccountId, entity_type: &str, metadata: MetadataId) -> Vec<u8> {
    let mut key = type_prefix(account, entity_type);
    key.extend_from_slice(metadata.as_bytes());
    key
}

/// Recover the metadata id from a type index key.
pub fn metadata_from_type_key(key: &[u8]) -> Result<MetadataId, GraphError> {
    let offset = key
        .len()
        .checked_sub(ID_LEN)
        .ok_or_else(|| GraphError::Serialization("truncated key".to_string()))?;
    read_id(key, offset).map(MetadataId::from_bytes)
}

/// Split a type index key into account, type and metadata id.
pub fn split_type_key(key: &[u8]) -> Result<(AccountId, &str, MetadataId), GraphError> {
    let truncated = || GraphError::Serialization("truncated key".to_string());
    let account = AccountId::from_bytes(read_id(key, 0)?);
    let len = key
        .get(ID_LEN..ID_LEN + 4)
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .map(|bytes| u32::from_be_bytes(bytes) as usize)
        .ok_or_else(truncated)?;
    let start = ID_LEN + 4;
    let entity_type = key
        .get(start..start + len)
        .ok_or_else(truncated)
        .and_then(|bytes| {
            std::str::from_utf8(bytes)
                .map_err(|e| GraphError::Serialization(format!("type in key: {}", e)))
        })?;
    let metadata = MetadataId::from_bytes(read_id(key, start + len)?);
    Ok((account, entity_type, metadata))
}

/// Prefix of every link group of one source version.
#[must_use]
pub fn link_source_prefix(account: AccountId, source: EntityId) -> Vec<u8> {
    let mut key = with_account(account, ID_LEN);
    key.extend_from_slice(source.as_bytes());
    key
}

/// Prefix of one `(source, path)` group.
#[must_use]
pub fn link_group_prefix(account: AccountId, source: EntityId, path: &str) -> Vec<u8> {
    let mut key = link_source_prefix(account, source);
    push_str(&mut key, path);
    key
}

#[must_use]
pub fn link_key(account: AccountId, source: EntityId, path: &str, index: usize) -> Vec<u8> {
    let mut key = link_group_prefix(account, source, path);
    key.extend_from_slice(&(index as u32).to_be_bytes());
    key
}

#[must_use]
pub fn login_code_key(account: AccountId, login: LoginId) -> Vec<u8> {
    let mut key = with_account(account, ID_LEN);
    key.extend_from_slice(login.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn account() -> AccountId {
        AccountId(Uuid::from_u128(1))
    }

    #[test]
    fn group_prefix_does_not_capture_longer_paths() {
        let source = EntityId(Uuid::from_u128(2));
        let short = link_group_prefix(account(), source, "a");
        let long_key = link_key(account(), source, "ab", 0);
        assert!(!long_key.starts_with(&short));
        assert!(link_key(account(), source, "a", 3).starts_with(&short));
    }

    #[test]
    fn link_keys_sort_by_index() {
        let source = EntityId(Uuid::from_u128(2));
        let k2 = link_key(account(), source, "p", 2);
        let k10 = link_key(account(), source, "p", 10);
        assert!(k2 < k10);
    }

    #[test]
    fn type_key_yields_metadata_id() {
        let metadata = MetadataId(Uuid::from_u128(99));
        let key = type_index_key(account(), "Page", metadata);
        assert!(key.starts_with(&type_prefix(account(), "Page")));
        assert_eq!(metadata_from_type_key(&key).expect("decode"), metadata);
        assert!(metadata_from_type_key(&[1, 2]).is_err());
    }

    #[test]
    fn type_key_splits_into_parts() {
        let metadata = MetadataId(Uuid::from_u128(9));
        let key = type_index_key(account(), "User", metadata);
        let (acc, entity_type, meta) = split_type_key(&key).expect("split");
        assert_eq!(acc, account());
        assert_eq!(entity_type, "User");
        assert_eq!(meta, metadata);
        assert!(split_type_key(&key[..key.len() - 1]).is_err());
    }

    #[test]
    fn type_prefixes_are_disjoint() {
        let page = type_prefix(account(), "Page");
        let pages = type_index_key(account(), "Pages", MetadataId(Uuid::from_u128(5)));
        assert!(!pages.starts_with(&page));
    }
}
