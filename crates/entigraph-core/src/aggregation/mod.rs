//! # Aggregation Engine
//!
//! Paged, filtered, sorted views over an entity collection. Evaluation is
//! always filter, then sort, then paginate.
//!
//! With no sort keys the collection's own order is kept (creation order for
//! a type, link order for a link group).
//!
//! Page size policy: `itemsPerPage` defaults to 10 and is clamped to
//! `1..=1000` (both configurable through [`PageLimits`]); a `pageNumber`
//! below 1 reads page 1; a page past the end is empty, never an error.

mod filter;
mod sort;

pub use filter::{Filter, FilterOperator, MultiFilter, MultiFilterOperator};
pub use sort::SortField;

use crate::config::PageLimits;
use crate::entity_store::EntityReader;
use crate::link_graph::LinkReader;
use crate::storage::StoreRead;
use crate::{AccountId, EntityId, EntityVersion, GraphError};
use serde::{Deserialize, Serialize};

/// What to aggregate over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    /// Latest version of every identity of one type.
    EntityType {
        account_id: AccountId,
        entity_type: String,
    },
    /// The resolved destinations of one link group, in link order.
    LinkGroup {
        source_account_id: AccountId,
        source_entity_id: EntityId,
        path: String,
    },
}

/// Caller's query. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOperation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_per_page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_sort: Option<Vec<SortField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_filter: Option<MultiFilter>,
}

impl AggregateOperation {
    #[must_use]
    pub fn page(mut self, page_number: i64, items_per_page: i64) -> Self {
        self.page_number = Some(page_number);
        self.items_per_page = Some(items_per_page);
        self
    }

    #[must_use]
    pub fn sorted_by(mut self, sorts: Vec<SortField>) -> Self {
        self.multi_sort = Some(sorts);
        self
    }

    #[must_use]
    pub fn filtered_by(mut self, filter: MultiFilter) -> Self {
        self.multi_filter = Some(filter);
        self
    }
}

/// The operation as evaluated: defaults filled in, plus `pageCount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedOperation {
    pub page_number: u64,
    pub items_per_page: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_sort: Option<Vec<SortField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_filter: Option<MultiFilter>,
    pub page_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub results: Vec<EntityVersion>,
    pub operation: ResolvedOperation,
}

/// Filter, sort and paginate an already loaded collection.
#[must_use]
pub fn aggregate_entities(
    entities: Vec<EntityVersion>,
    operation: &AggregateOperation,
    limits: PageLimits,
) -> AggregateResult {
    let mut matching: Vec<EntityVersion> = match &operation.multi_filter {
        Some(filter) => entities
            .into_iter()
            .filter(|entity| filter.matches(&entity.properties))
            .collect(),
        None => entities,
    };

    // Without sort keys the collection keeps its own order.
    if let Some(sorts) = operation.multi_sort.as_deref()
        && !sorts.is_empty()
    {
        matching.sort_by(|a, b| sort::compare_entities(sorts, a, b));
    }

    let max = limits.max_items_per_page.max(1);
    let items_per_page = operation
        .items_per_page
        .map_or(limits.default_items_per_page, |n| u64::try_from(n).unwrap_or(0))
        .clamp(1, max);
    let page_number = operation
        .page_number
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(1)
        .max(1);
    let total = matching.len() as u64;
    let page_count = total.div_ceil(items_per_page);

    let start = (page_number - 1).saturating_mul(items_per_page);
    let results = matching
        .into_iter()
        .skip(usize::try_from(start).unwrap_or(usize::MAX))
        .take(usize::try_from(items_per_page).unwrap_or(usize::MAX))
        .collect();

    AggregateResult {
        results,
        operation: ResolvedOperation {
            page_number,
            items_per_page,
            multi_sort: operation.multi_sort.clone(),
            multi_filter: operation.multi_filter.clone(),
            page_count,
        },
    }
}

/// Aggregation over any consistent read state.
pub trait Aggregator: StoreRead {
    fn aggregate(
        &self,
        collection: &Collection,
        operation: &AggregateOperation,
        limits: PageLimits,
    ) -> Result<AggregateResult, GraphError> {
        let entities = match collection {
            Collection::EntityType {
                account_id,
                entity_type,
            } => self.get_entities_by_type(*account_id, entity_type, true)?,
            Collection::LinkGroup {
                source_account_id,
                source_entity_id,
                path,
            } => self.get_linked_entities(*source_account_id, *source_entity_id, path)?,
        };
        Ok(aggregate_entities(entities, operation, limits))
    }
}

impl<T: StoreRead + ?Sized> Aggregator for T {}
