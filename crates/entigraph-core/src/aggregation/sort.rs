//! Multi-key ordering of entities.

use crate::{EntityVersion, PropertyValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One sort key: a dot-path into `properties`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<bool>,
}

impl SortField {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: None,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: Some(true),
        }
    }

    #[must_use]
    pub fn is_desc(&self) -> bool {
        self.desc.unwrap_or(false)
    }
}

fn present(value: Option<&PropertyValue>) -> Option<&PropertyValue> {
    value.filter(|v| !matches!(v, PropertyValue::Null))
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Float(f64),
}

fn number(value: &PropertyValue) -> Option<Number> {
    match value {
        PropertyValue::Integer(i) => Some(Number::Integer(*i)),
        PropertyValue::Float(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

/// Real-number order with `-0.0 == 0.0`. NaN goes past either end by sign.
fn compare_floats(x: f64, y: f64) -> Ordering {
    x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y))
}

/// Exact comparison of an integer with a float, without widening the integer.
fn compare_integer_float(i: i64, f: f64) -> Ordering {
    const LOWER: f64 = i64::MIN as f64;
    const UPPER: f64 = (1_u64 << 63) as f64;

    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= UPPER {
        return Ordering::Less;
    }
    if f < LOWER {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    i.cmp(&(whole as i64)).then_with(|| compare_floats(whole, f))
}

fn compare_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => x.cmp(&y),
        (Number::Float(x), Number::Float(y)) => compare_floats(x, y),
        (Number::Integer(x), Number::Float(y)) => compare_integer_float(x, y),
        (Number::Float(x), Number::Integer(y)) => compare_integer_float(y, x).reverse(),
    }
}

/// Absent and null first, then numbers by value, then everything else by
/// its text form.
pub(crate) fn compare_values(a: Option<&PropertyValue>, b: Option<&PropertyValue>) -> Ordering {
    match (present(a), present(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match (number(x), number(y)) {
            (Some(m), Some(n)) => compare_numbers(m, n),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => x.to_text().cmp(&y.to_text()),
        },
    }
}

/// Lexicographic over `sorts`, then `entityId` ascending.
pub(crate) fn compare_entities(sorts: &[SortField], a: &EntityVersion, b: &EntityVersion) -> Ordering {
    for sort in sorts {
        let ordering = compare_values(
            a.properties.get_path(&sort.field),
            b.properties.get_path(&sort.field),
        );
        let ordering = if sort.is_desc() { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.entity_id.cmp(&b.entity_id)
}
