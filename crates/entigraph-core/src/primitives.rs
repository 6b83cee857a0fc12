//! # Store Primitives
//!
//! Compiled-in limits and defaults for the store.
//! Runtime overrides go through [`crate::config::StoreConfig`].

/// Default page size for aggregation when the caller gives none.
pub const DEFAULT_ITEMS_PER_PAGE: u64 = 10;

/// Upper bound on a single aggregation page.
///
/// Larger requests are clamped, never rejected.
pub const MAX_ITEMS_PER_PAGE: u64 = 1000;

/// How long a transaction waits for a lock before aborting with `Conflict`.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of an entity type discriminator.
pub const MAX_TYPE_LENGTH: usize = 256;

/// Maximum length of a link path.
pub const MAX_LINK_PATH_LENGTH: usize = 1024;

/// Property key that marks an entity as archived.
pub const ARCHIVED_PROPERTY: &str = "archived";

// =============================================================================
// USER LOOKUPS
// =============================================================================

/// Entity type searched by the user lookups.
pub const USER_ENTITY_TYPE: &str = "User";

/// Array of `{ address, .. }` records on a user.
pub const USER_EMAILS_PROPERTY: &str = "emails";

/// Field of one email record holding the address.
pub const EMAIL_ADDRESS_FIELD: &str = "address";

/// Unique handle of a user.
pub const USER_SHORTNAME_PROPERTY: &str = "shortname";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_size_is_ten() {
        assert_eq!(DEFAULT_ITEMS_PER_PAGE, 10);
    }
}
