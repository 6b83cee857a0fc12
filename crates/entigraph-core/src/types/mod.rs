//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the store:
//! - Identifiers (`AccountId`, `EntityId`, `MetadataId`, `LoginId`)
//! - Entity records (`EntityVersion`, `EntityMetadata`, `HistoryEntry`)
//! - Link records (`Link`, `LinkGroup`)
//! - Login codes (`LoginCode`)
//! - Error types (`GraphError`)
//!
//! Property payloads live in [`properties`].

pub mod properties;

pub use properties::PropertyValue;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Raw 16-byte form, used for storage keys.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Rebuild from the raw 16-byte form.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = GraphError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| GraphError::InvalidInput(format!("invalid id '{}': {}", s, e)))
            }
        }
    };
}

uuid_id! {
    /// Tenant namespace. Every entity, link and login code lives in exactly one account.
    AccountId
}

uuid_id! {
    /// Identifier of one entity version. Unique per version within an account.
    EntityId
}

uuid_id! {
    /// Version-independent identity of a mutable entity.
    ///
    /// Assigned once at creation and shared by every version in the chain.
    MetadataId
}

uuid_id! {
    /// Identifier of a login code record.
    LoginId
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Auxiliary data shared by every version of one identity.
///
/// Mutated in place, unlike `properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub account_id: AccountId,
    pub metadata_id: MetadataId,
    pub extra: PropertyValue,
}

/// One immutable snapshot of an entity.
///
/// `metadata` is attached when the version is read, so all versions of the
/// same identity observe the same record.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityVersion {
    pub account_id: AccountId,
    pub entity_id: EntityId,
    pub metadata_id: MetadataId,
    pub created_by_id: EntityId,
    pub entity_type: String,
    pub versioned: bool,
    pub properties: PropertyValue,
    pub metadata: EntityMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityVersion {
    /// Whether the archive flag is set on this version's properties.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        matches!(
            self.properties.get_path(crate::primitives::ARCHIVED_PROPERTY),
            Some(PropertyValue::Bool(true))
        )
    }
}

/// One entry of an identity's version chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub entity_id: EntityId,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// LINKS
// =============================================================================

/// A directed, path-labelled edge from one entity version to another entity.
///
/// `destination_version_id` pins the link to an exact version; when it is
/// `None` the link resolves to the destination's latest version at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub source_account_id: AccountId,
    pub source_entity_id: EntityId,
    pub destination_account_id: AccountId,
    pub destination_entity_id: EntityId,
    pub destination_version_id: Option<EntityId>,
    pub path: String,
    pub index: usize,
}

/// All links sharing one `(source, path)` pair, in index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkGroup {
    pub source_account_id: AccountId,
    pub source_entity_id: EntityId,
    pub path: String,
    pub links: Vec<Link>,
}

// =============================================================================
// LOGIN CODES
// =============================================================================

/// Ephemeral login code. Never versioned; only the attempt counter changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCode {
    pub account_id: AccountId,
    pub login_id: LoginId,
    pub user_entity_id: EntityId,
    pub login_code: String,
    pub number_of_attempts: u32,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by the store.
///
/// A missing row on a plain lookup is `Ok(None)`, never an error.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An identity, version, metadata record or login code is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An explicit entity id is already taken in the account.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The expected type of an update disagrees with the stored type.
    #[error("Type mismatch: expected '{expected}', found '{actual}'")]
    TypeMismatch { expected: String, actual: String },

    /// A link position outside `0..=len`.
    #[error("Invalid link index {index} for group of length {len}")]
    InvalidIndex { index: i64, len: usize },

    /// A transaction was opened while another one is running on the same thread.
    #[error("Nested transactions are not allowed")]
    NestedTransaction,

    /// The transaction lost a lock race and was aborted. Safe to retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The storage medium failed. Fatal to the in-flight transaction.
    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Caller input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GraphError {
    /// Whether the caller may retry the whole transaction.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================
