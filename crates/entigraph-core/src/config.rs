//! # Store Configuration
//!
//! Runtime knobs for the store. All fields have defaults, so an empty
//! `[store]` table (or none at all) is a valid configuration.

use crate::primitives::{DEFAULT_ITEMS_PER_PAGE, DEFAULT_LOCK_TIMEOUT_MS, MAX_ITEMS_PER_PAGE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a transaction waits on a lock before failing with `Conflict`.
    pub lock_timeout_ms: u64,
    /// Aggregation page size when the caller omits `itemsPerPage`.
    pub default_items_per_page: u64,
    /// Aggregation page size ceiling.
    pub max_items_per_page: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            default_items_per_page: DEFAULT_ITEMS_PER_PAGE,
            max_items_per_page: MAX_ITEMS_PER_PAGE,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Page limits for the aggregation engine, kept internally consistent.
    #[must_use]
    pub fn page_limits(&self) -> PageLimits {
        let max = self.max_items_per_page.max(1);
        PageLimits {
            default_items_per_page: self.default_items_per_page.clamp(1, max),
            max_items_per_page: max,
        }
    }
}

/// Page size policy applied by [`crate::aggregation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_items_per_page: u64,
    pub max_items_per_page: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        StoreConfig::default().page_limits()
    }
}
