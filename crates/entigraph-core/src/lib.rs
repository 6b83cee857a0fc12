//! # entigraph-core
//!
//! Versioned entity graph store.
//!
//! The store persists typed entities inside account namespaces, keeps every
//! past version of a versioned entity, maintains ordered, path-labelled links
//! between entities, and answers filter/sort/paginate queries over entity
//! collections.
//!
//! ## Architecture
//!
//! - [`identity`]: id and timestamp generation
//! - [`entity_store`]: versions, identities and shared metadata
//! - [`link_graph`]: ordered edges keyed by `(source, path, index)`
//! - [`login_codes`]: attempt-counted login code records
//! - [`transaction`]: atomic, isolated multi-step sequences
//! - [`aggregation`]: filter, then sort, then paginate
//! - [`storage`]: the narrow snapshot/apply medium interface (memory, redb)
//!
//! ## Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - The storage engine's own transactions are never relied upon: atomicity
//!   and isolation come from write sets, snapshots and per-key locks
//! - History is permanent; archiving is a property flag

// =============================================================================
// MODULES
// =============================================================================

pub mod aggregation;
pub mod config;
pub mod entity_store;
pub mod identity;
pub mod link_graph;
pub mod locks;
pub mod login_codes;
pub mod primitives;
pub mod storage;
pub mod store;
pub mod transaction;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    AccountId, EntityId, EntityMetadata, EntityVersion, GraphError, HistoryEntry, Link, LinkGroup,
    LoginCode, LoginId, MetadataId, PropertyValue,
};

// =============================================================================
// RE-EXPORTS: Store
// =============================================================================

pub use aggregation::{
    AggregateOperation, AggregateResult, Aggregator, Collection, Filter, FilterOperator,
    MultiFilter, MultiFilterOperator, ResolvedOperation, SortField, aggregate_entities,
};
pub use config::{PageLimits, StoreConfig};
pub use entity_store::{EntityReader, NewEntity, StoreStats};
pub use identity::{
    Clock, IdSource, IdentityGenerator, ManualClock, RandomIds, SequentialIds, SystemClock,
};
pub use link_graph::{LinkReader, NewLink};
pub use login_codes::LoginCodeReader;
pub use storage::{MemoryMedium, ReadView, RedbMedium, StorageMedium, StoreRead};
pub use store::{Store, StoreBuilder};
pub use transaction::Transaction;
