//! # CLI Command Implementations
//!
//! Each command runs against an opened [`Store`] and returns the JSON
//! document to print, so commands can be driven directly from tests.

use super::{LinkAction, LoginCodeAction};
use crate::config::AppConfig;
use crate::output::{AggregateResponse, EntityJson, MetadataJson, StatusResponse, entities_json};
use entigraph_core::{
    AccountId, AggregateOperation, Collection, EntityId, GraphError, LoginId, MetadataId,
    NewEntity, NewLink, PropertyValue, Store,
};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

// =============================================================================
// HELPERS
// =============================================================================

/// Open (or create) the redb store at `database`.
pub fn open_store(database: &Path, config: &AppConfig) -> Result<Store, GraphError> {
    tracing::debug!(database = %database.display(), "opening store");
    Store::open(database, config.store)
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, GraphError> {
    serde_json::to_value(value).map_err(|e| GraphError::Serialization(e.to_string()))
}

/// Parse a JSON argument into a property tree.
pub fn parse_properties(text: &str) -> Result<PropertyValue, GraphError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(PropertyValue::from)
        .map_err(|e| GraphError::InvalidInput(format!("invalid JSON '{}': {}", text, e)))
}

fn not_found(what: impl std::fmt::Display) -> GraphError {
    GraphError::NotFound(what.to_string())
}

// =============================================================================
// INIT / STATUS
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(database: &Path, config: &AppConfig, force: bool) -> Result<serde_json::Value, GraphError> {
    if database.exists() {
        if !force {
            return Err(GraphError::AlreadyExists(format!(
                "database '{}' (use --force to overwrite)",
                database.display()
            )));
        }
        std::fs::remove_file(database).map_err(|e| {
            GraphError::StorageIo(format!("Cannot remove '{}': {}", database.display(), e))
        })?;
    }

    let store = open_store(database, config)?;
    tracing::info!(database = %database.display(), "initialized database");
    cmd_status(&store, database)
}

/// Show store statistics.
pub fn cmd_status(store: &Store, database: &Path) -> Result<serde_json::Value, GraphError> {
    to_json(&StatusResponse {
        database: database.display().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stats: store.stats()?,
        config: *store.config(),
    })
}

// =============================================================================
// ENTITY COMMANDS
// =============================================================================

/// Arguments of [`cmd_create`].
#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub account: AccountId,
    pub entity_type: String,
    pub properties: String,
    pub versioned: bool,
    pub entity_id: Option<EntityId>,
    pub created_by: Option<EntityId>,
}

pub fn cmd_create(store: &Store, args: CreateArgs) -> Result<serde_json::Value, GraphError> {
    let properties = parse_properties(&args.properties)?;
    let created_by = args.created_by.unwrap_or(EntityId(Uuid::nil()));

    let mut new = NewEntity::new(args.account, created_by, args.entity_type, properties);
    if args.versioned {
        new = new.versioned();
    }
    if let Some(entity_id) = args.entity_id {
        new = new.with_entity_id(entity_id);
    }

    let entity = store.create_entity(new)?;
    tracing::info!(account = %entity.account_id, entity = %entity.entity_id, "entity created");
    to_json(&EntityJson::from(&entity))
}

pub fn cmd_get(
    store: &Store,
    account: AccountId,
    entity: EntityId,
    latest: bool,
) -> Result<serde_json::Value, GraphError> {
    let found = store
        .get_entity(account, entity, latest)?
        .ok_or_else(|| not_found(format!("entity {} in account {}", entity, account)))?;
    to_json(&EntityJson::from(&found))
}

/// Print the whole chain after the update, newest first.
pub fn cmd_update(
    store: &Store,
    account: AccountId,
    entity: EntityId,
    properties: &str,
    expected_type: Option<&str>,
) -> Result<serde_json::Value, GraphError> {
    let properties = parse_properties(properties)?;
    let versions = store.update_entity(account, entity, expected_type, properties)?;
    to_json(&entities_json(&versions))
}

pub fn cmd_archive(
    store: &Store,
    account: AccountId,
    entity: EntityId,
) -> Result<serde_json::Value, GraphError> {
    let head = store.archive_entity(account, entity)?;
    to_json(&EntityJson::from(&head))
}

pub fn cmd_history(
    store: &Store,
    account: AccountId,
    entity: EntityId,
) -> Result<serde_json::Value, GraphError> {
    let history = store
        .get_entity_history(account, entity)?
        .ok_or_else(|| not_found(format!("entity {} in account {}", entity, account)))?;
    to_json(&history)
}

pub fn cmd_metadata(
    store: &Store,
    account: AccountId,
    metadata_id: MetadataId,
    extra: Option<&str>,
) -> Result<serde_json::Value, GraphError> {
    let metadata = match extra {
        Some(text) => store.update_entity_metadata(account, metadata_id, parse_properties(text)?)?,
        None => store
            .get_entity_metadata(account, metadata_id)?
            .ok_or_else(|| not_found(format!("metadata {} in account {}", metadata_id, account)))?,
    };
    to_json(&MetadataJson::from(&metadata))
}

pub fn cmd_list(
    store: &Store,
    account: AccountId,
    entity_type: Option<&str>,
    all_versions: bool,
) -> Result<serde_json::Value, GraphError> {
    let entities = match entity_type {
        Some(entity_type) => store.get_entities_by_type(account, entity_type, !all_versions)?,
        None => store.get_account_entities(account)?,
    };
    to_json(&entities_json(&entities))
}

/// Look a user up by email, or by shortname when no email is given.
pub fn cmd_user(
    store: &Store,
    email: Option<&str>,
    shortname: Option<&str>,
) -> Result<serde_json::Value, GraphError> {
    let found = match (email, shortname) {
        (Some(email), _) => store
            .get_user_by_email(email)?
            .ok_or_else(|| not_found(format!("user with email '{}'", email)))?,
        (None, Some(shortname)) => store
            .get_user_by_shortname(shortname)?
            .ok_or_else(|| not_found(format!("user with shortname '{}'", shortname)))?,
        (None, None) => {
            return Err(GraphError::InvalidInput(
                "user lookup needs --email or --shortname".to_string(),
            ));
        }
    };
    to_json(&EntityJson::from(&found))
}

// =============================================================================
// LINK COMMANDS
// =============================================================================

pub fn cmd_link(store: &Store, action: LinkAction) -> Result<serde_json::Value, GraphError> {
    match action {
        LinkAction::Create {
            account,
            source,
            destination,
            destination_account,
            pin,
            path,
            index,
        } => {
            let mut new = NewLink::new(
                account,
                source,
                destination_account.unwrap_or(account),
                destination,
                path,
            );
            new.destination_version_id = pin;
            new.index = index;
            to_json(&store.create_link(new)?)
        }
        LinkAction::Delete {
            account,
            source,
            path,
            index,
        } => {
            let deleted = store.delete_link(account, source, &path, index)?;
            Ok(serde_json::json!({ "deleted": deleted }))
        }
        LinkAction::List {
            account,
            source,
            path: Some(path),
            resolve: true,
        } => to_json(&entities_json(&store.get_linked_entities(account, source, &path)?)),
        LinkAction::List {
            account,
            source,
            path: Some(path),
            resolve: false,
        } => to_json(&store.get_link_group(account, source, &path)?),
        LinkAction::List {
            account,
            source,
            path: None,
            ..
        } => to_json(&store.get_link_groups(account, source)?),
    }
}

// =============================================================================
// AGGREGATE COMMAND
// =============================================================================

pub fn cmd_aggregate(
    store: &Store,
    account: AccountId,
    entity_type: Option<String>,
    source: Option<EntityId>,
    path: Option<String>,
    operation: &str,
) -> Result<serde_json::Value, GraphError> {
    let collection = match (entity_type, source, path) {
        (Some(entity_type), None, None) => Collection::EntityType {
            account_id: account,
            entity_type,
        },
        (None, Some(source_entity_id), Some(path)) => Collection::LinkGroup {
            source_account_id: account,
            source_entity_id,
            path,
        },
        _ => {
            return Err(GraphError::InvalidInput(
                "aggregate needs --type, or --source with --path".to_string(),
            ));
        }
    };
    let operation: AggregateOperation = serde_json::from_str(operation)
        .map_err(|e| GraphError::InvalidInput(format!("invalid operation: {}", e)))?;

    let result = store.aggregate(&collection, &operation)?;
    to_json(&AggregateResponse::from(&result))
}

// =============================================================================
// LOGIN CODE COMMANDS
// =============================================================================

fn login_code(store: &Store, account: AccountId, login_id: LoginId) -> Result<serde_json::Value, GraphError> {
    let code = store
        .get_login_code(account, login_id)?
        .ok_or_else(|| not_found(format!("login code {} in account {}", login_id, account)))?;
    to_json(&code)
}

pub fn cmd_login_code(store: &Store, action: LoginCodeAction) -> Result<serde_json::Value, GraphError> {
    match action {
        LoginCodeAction::Create {
            account,
            user,
            code,
        } => to_json(&store.create_login_code(account, user, code)?),
        LoginCodeAction::Get { account, login_id } => login_code(store, account, login_id),
        LoginCodeAction::List { account, user } => to_json(&store.get_login_codes(account, user)?),
        LoginCodeAction::Attempt { account, login_id } => {
            to_json(&store.increment_login_code_attempts(account, login_id)?)
        }
    }
}
