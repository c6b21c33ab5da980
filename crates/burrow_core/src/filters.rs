//! Record filtering and ordering collaborators.
//!
//! The query planner narrows candidates through an index; everything else a
//! filter map asks for is decided here, record by record. Filter values are
//! matched by equality, lists by membership, and object values act as
//! sub-object filters descending arbitrary depth. Dotted filter keys
//! (`"author.name"`) are rewritten to the nested form before evaluation.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A filter map: field name to expected scalar, list, or sub-object filter.
pub type FilterMap = Map<String, Value>;

/// Tests a record against a filter map.
///
/// Every entry must match: scalar values by equality, lists by membership,
/// object values recursively against the record's sub-object. A record
/// missing a filtered field does not match.
#[must_use]
pub fn record_matches(record: &Value, filters: &FilterMap) -> bool {
    filters.iter().all(|(field, expected)| {
        let actual = record.get(field);
        match expected {
            Value::Array(candidates) => {
                actual.is_some_and(|value| candidates.contains(value))
            }
            Value::Object(sub_filters) => match actual {
                Some(sub @ Value::Object(_)) => record_matches(sub, sub_filters),
                _ => false,
            },
            scalar => actual == Some(scalar),
        }
    })
}

/// Rewrites dotted filter keys into nested sub-object filters.
///
/// `{"author.name": "jane"}` becomes `{"author": {"name": "jane"}}`;
/// filters sharing a prefix are merged into one sub-filter.
#[must_use]
pub fn expand_dotted(filters: &FilterMap) -> FilterMap {
    let mut out = FilterMap::new();
    for (key, value) in filters {
        match key.split_once('.') {
            None => merge_into(&mut out, key, value.clone()),
            Some((head, rest)) => {
                let mut sub = FilterMap::new();
                sub.insert(rest.to_string(), value.clone());
                merge_into(&mut out, head, Value::Object(expand_dotted(&sub)));
            }
        }
    }
    out
}

fn merge_into(target: &mut FilterMap, key: &str, addition: Value) {
    if let Value::Object(add) = addition {
        if let Some(Value::Object(existing)) = target.get_mut(key) {
            for (k, v) in add {
                merge_into(existing, &k, v);
            }
            return;
        }
        target.insert(key.to_string(), Value::Object(add));
        return;
    }
    target.insert(key.to_string(), addition);
}

/// Sorts records by an order specification.
///
/// The specification is a comma-separated field list; a `-` prefix sorts
/// that field descending. Fields may be dotted paths. Records missing a
/// field sort first ascending. The sort is stable.
#[must_use]
pub fn sort_records(mut records: Vec<Value>, order: &str) -> Vec<Value> {
    let keys: Vec<(&str, bool)> = order
        .split(',')
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(|spec| match spec.strip_prefix('-') {
            Some(field) => (field, true),
            None => (spec, false),
        })
        .collect();
    if keys.is_empty() {
        return records;
    }
    records.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ord = option_cmp(value_at_path(a, field), value_at_path(b, field));
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    records
}

/// Resolves a dotted path inside a record.
#[must_use]
pub(crate) fn value_at_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn option_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => value_cmp(a, b),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                match value_cmp(ex, ey) {
                    Ordering::Equal => continue,
                    ord => return ord,
                }
            }
            x.len().cmp(&y.len())
        }
        // Objects carry no defined order; the stable sort keeps their
        // relative positions.
        (Value::Object(_), Value::Object(_)) | (Value::Null, Value::Null) => Ordering::Equal,
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
