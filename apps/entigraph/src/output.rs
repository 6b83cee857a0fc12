//! # Output Types
//!
//! JSON shapes printed by the CLI. Core records that already serialize in
//! wire form (`Link`, `LinkGroup`, `LoginCode`, `HistoryEntry`, `StoreStats`,
//! `ResolvedOperation`) are printed as they are; entities and metadata carry
//! property trees and are converted here.

use chrono::{DateTime, Utc};
use entigraph_core::{
    AccountId, AggregateResult, EntityId, EntityMetadata, EntityVersion, MetadataId,
    ResolvedOperation, StoreConfig, StoreStats,
};
use serde::Serialize;

// =============================================================================
// ENTITIES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataJson {
    pub account_id: AccountId,
    pub metadata_id: MetadataId,
    pub extra: serde_json::Value,
}

impl From<&EntityMetadata> for MetadataJson {
    fn from(metadata: &EntityMetadata) -> Self {
        Self {
            account_id: metadata.account_id,
            metadata_id: metadata.metadata_id,
            extra: metadata.extra.to_json(),
        }
    }
}

/// One entity version.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityJson {
    pub account_id: AccountId,
    pub entity_id: EntityId,
    pub metadata_id: MetadataId,
    pub created_by_id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub versioned: bool,
    pub archived: bool,
    pub properties: serde_json::Value,
    pub metadata: MetadataJson,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&EntityVersion> for EntityJson {
    fn from(entity: &EntityVersion) -> Self {
        Self {
            account_id: entity.account_id,
            entity_id: entity.entity_id,
            metadata_id: entity.metadata_id,
            created_by_id: entity.created_by_id,
            entity_type: entity.entity_type.clone(),
            versioned: entity.versioned,
            archived: entity.is_archived(),
            properties: entity.properties.to_json(),
            metadata: MetadataJson::from(&entity.metadata),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[must_use]
pub fn entities_json(entities: &[EntityVersion]) -> Vec<EntityJson> {
    entities.iter().map(EntityJson::from).collect()
}

// =============================================================================
// AGGREGATION
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResponse {
    pub results: Vec<EntityJson>,
    pub operation: ResolvedOperation,
}

impl From<&AggregateResult> for AggregateResponse {
    fn from(result: &AggregateResult) -> Self {
        Self {
            results: entities_json(&result.results),
            operation: result.operation.clone(),
        }
    }
}

// =============================================================================
// STATUS
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub database: String,
    pub version: String,
    #[serde(flatten)]
    pub stats: StoreStats,
    pub config: StoreConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use entigraph_core::{NewEntity, PropertyValue, Store};
    use uuid::Uuid;

    #[test]
    fn entity_json_uses_wire_names() {
        let store = Store::in_memory();
        let entity = store
            .create_entity(NewEntity::new(
                AccountId(Uuid::from_u128(1)),
                EntityId(Uuid::from_u128(2)),
                "Page",
                PropertyValue::from(serde_json::json!({ "title": "Hi", "archived": true })),
            ))
            .expect("create");

        let json = serde_json::to_value(EntityJson::from(&entity)).expect("json");
        assert_eq!(json["type"], "Page");
        assert_eq!(json["archived"], true);
        assert_eq!(json["properties"]["title"], "Hi");
        assert_eq!(json["accountId"], "00000000-0000-0000-0000-000000000001");
        assert!(json["metadata"]["extra"].is_object());
    }

    #[test]
    fn status_flattens_stats() {
        let status = StatusResponse {
            database: "x.redb".to_string(),
            version: "0.0.0".to_string(),
            stats: StoreStats {
                identities: 3,
                ..StoreStats::default()
            },
            config: StoreConfig::default(),
        };
        let json = serde_json::to_value(&status).expect("json");
        assert_eq!(json["identities"], 3);
        assert_eq!(json["loginCodes"], 0);
        assert_eq!(json["config"]["lock_timeout_ms"], 5000);
    }
}
