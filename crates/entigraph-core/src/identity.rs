//! # Identity Model
//!
//! Generation of identity and version identifiers, plus the clock used for
//! `created_at` / `updated_at`.
//!
//! Both the random source and the clock are traits so the store can be
//! driven deterministically in tests.

use crate::{EntityId, LoginId, MetadataId};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// ID SOURCES
// =============================================================================

/// Source of UUID-class identifiers. Must never repeat a value.
pub trait IdSource: Send + Sync {
    fn next_uuid(&self) -> Uuid;
}

/// Random v4 UUIDs. The default source.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Monotonic counter-based UUIDs, for reproducible fixtures.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: Mutex<u128>,
}

impl SequentialIds {
    /// Start counting at `start`.
    #[must_use]
    pub fn starting_at(start: u128) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

impl IdSource for SequentialIds {
    fn next_uuid(&self) -> Uuid {
        let mut next = self.next.lock();
        let id = Uuid::from_u128(*next);
        *next = next.saturating_add(1);
        id
    }
}

/// Hands out metadata ids for fresh identities and entity ids for versions.
#[derive(Clone)]
pub struct IdentityGenerator {
    source: Arc<dyn IdSource>,
}

impl std::fmt::Debug for IdentityGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityGenerator").finish_non_exhaustive()
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new(Arc::new(RandomIds))
    }
}

impl IdentityGenerator {
    #[must_use]
    pub fn new(source: Arc<dyn IdSource>) -> Self {
        Self { source }
    }

    /// A metadata id for a brand-new identity.
    #[must_use]
    pub fn new_identity(&self) -> MetadataId {
        MetadataId(self.source.next_uuid())
    }

    /// An entity id for a new version.
    #[must_use]
    pub fn new_version_id(&self) -> EntityId {
        EntityId(self.source.next_uuid())
    }

    #[must_use]
    pub fn new_login_id(&self) -> LoginId {
        LoginId(self.source.next_uuid())
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Wall clock used for version timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// `chrono::Utc::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a settable instant.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Smallest step between two versions of the same identity.
pub(crate) fn min_step() -> TimeDelta {
    TimeDelta::microseconds(1)
}

/// A timestamp strictly after `previous`, as close to `now` as possible.
pub(crate) fn strictly_after(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + min_step();
    if now < floor { floor } else { now }
}
