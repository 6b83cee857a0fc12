//! Filter predicates over entity properties.
//!
//! A filter reads the value at `field` (a dot-path into `properties`),
//! stringifies it and compares it with `value`. Comparisons are
//! case-sensitive.

use crate::PropertyValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Contains,
    DoesNotContain,
    Is,
    IsNot,
    StartsWith,
    EndsWith,
    /// Null, absent or zero-length. Ignores `value`.
    IsEmpty,
    /// Negation of `IsEmpty`. Ignores `value`.
    IsNotEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
}

impl Filter {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Evaluate against one entity's properties.
    ///
    /// A missing field fails every positive test and passes `DoesNotContain`
    /// and `IsNot`.
    #[must_use]
    pub fn matches(&self, properties: &PropertyValue) -> bool {
        let found = properties.get_path(&self.field);
        match self.operator {
            FilterOperator::IsEmpty => found.is_none_or(PropertyValue::is_empty_value),
            FilterOperator::IsNotEmpty => !found.is_none_or(PropertyValue::is_empty_value),
            operator => {
                let Some(text) = found.and_then(PropertyValue::to_text) else {
                    return matches!(operator, FilterOperator::DoesNotContain | FilterOperator::IsNot);
                };
                let value = self.value.as_str();
                match operator {
                    FilterOperator::Contains => text.contains(value),
                    FilterOperator::DoesNotContain => !text.contains(value),
                    FilterOperator::Is => text == value,
                    FilterOperator::IsNot => text != value,
                    FilterOperator::StartsWith => text.starts_with(value),
                    FilterOperator::EndsWith => text.ends_with(value),
                    FilterOperator::IsEmpty | FilterOperator::IsNotEmpty => false,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MultiFilterOperator {
    #[default]
    And,
    Or,
}

/// A list of filters joined by one boolean operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiFilter {
    #[serde(default)]
    pub operator: MultiFilterOperator,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl MultiFilter {
    #[must_use]
    pub fn all(filters: Vec<Filter>) -> Self {
        Self {
            operator: MultiFilterOperator::And,
            filters,
        }
    }

    #[must_use]
    pub fn any(filters: Vec<Filter>) -> Self {
        Self {
            operator: MultiFilterOperator::Or,
            filters,
        }
    }

    /// An empty filter list matches everything.
    #[must_use]
    pub fn matches(&self, properties: &PropertyValue) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        match self.operator {
            MultiFilterOperator::And => self.filters.iter().all(|f| f.matches(properties)),
            MultiFilterOperator::Or => self.filters.iter().any(|f| f.matches(properties)),
        }
    }
}
