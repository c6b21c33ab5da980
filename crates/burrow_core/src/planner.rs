//! Query planning for filtered listing.
//!
//! `plan` is a pure function from a filter map to an access strategy; it
//! never touches the store, which keeps every decision branch unit-testable
//! on its own. The partition attribute is bound later, when the strategy is
//! executed against a collection.

use crate::filters::{expand_dotted, FilterMap};
use crate::schema::{IDX_LAST_MODIFIED, IDX_STATUS};
use serde_json::Value;

/// A filterable field backed by an index.
///
/// `id` is backed by the primary key rather than a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexedField {
    /// The record id (primary key).
    Id,
    /// The sync lifecycle state.
    Status,
    /// The last-modified timestamp.
    LastModified,
}

impl IndexedField {
    /// Candidate fields in selection priority order.
    pub(crate) const PRIORITY: [IndexedField; 3] = [
        IndexedField::Id,
        IndexedField::Status,
        IndexedField::LastModified,
    ];

    /// The filter-map field name this index serves.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            IndexedField::Id => "id",
            IndexedField::Status => "_status",
            IndexedField::LastModified => "last_modified",
        }
    }

    /// The engine index name, or `None` for the primary key.
    pub(crate) fn index_name(self) -> Option<&'static str> {
        match self {
            IndexedField::Id => None,
            IndexedField::Status => Some(IDX_STATUS),
            IndexedField::LastModified => Some(IDX_LAST_MODIFIED),
        }
    }
}

/// How a filtered listing will be executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// The result is empty; the store is not touched.
    Empty,
    /// Unordered bulk fetch of the whole partition.
    FullScan,
    /// Cursor over the whole partition, every record tested by the
    /// predicate evaluator.
    Scan {
        /// Filters in the nested form the evaluator expects.
        filters: FilterMap,
    },
    /// Direct equality fetch against an index, no cursor.
    IndexEquality {
        /// The selected indexed field.
        field: IndexedField,
        /// The equality value.
        value: Value,
    },
    /// Cursor opened at an index equality bound, residual filters applied
    /// to each candidate.
    IndexRange {
        /// The selected indexed field.
        field: IndexedField,
        /// The equality value.
        value: Value,
        /// Remaining filters, in nested form.
        residual: FilterMap,
    },
    /// Merge-join of an index cursor against a sorted list of target
    /// values.
    IndexMergeJoin {
        /// The selected indexed field.
        field: IndexedField,
        /// The candidate values, as given by the caller.
        values: Vec<Value>,
        /// Remaining filters, in nested form.
        residual: FilterMap,
    },
}

/// Whether a filter value can serve as an index key.
fn is_index_scalar(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Number(n) => n.as_i64().is_some(),
        _ => false,
    }
}

/// Selects the access strategy for a filter map.
///
/// Decision rule, in priority order: no filters is a full-partition bulk
/// fetch; a filter on `id`, `_status` or `last_modified` uses that index
/// (list values merge-join, scalars fetch directly, residual filters ride
/// along for per-candidate evaluation); anything else scans the partition
/// under the predicate evaluator. Only one indexed field is honored per
/// plan. An empty list on an indexed field short-circuits to an empty
/// result.
#[must_use]
pub fn plan(filters: &FilterMap) -> Strategy {
    if filters.is_empty() {
        return Strategy::FullScan;
    }

    for field in IndexedField::PRIORITY {
        let Some(value) = filters.get(field.field_name()) else {
            continue;
        };
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Strategy::Empty;
                }
                if !items.iter().all(is_index_scalar) {
                    continue;
                }
                return Strategy::IndexMergeJoin {
                    field,
                    values: items.clone(),
                    residual: residual_filters(filters, field),
                };
            }
            scalar if is_index_scalar(scalar) => {
                let residual = residual_filters(filters, field);
                return if residual.is_empty() {
                    Strategy::IndexEquality {
                        field,
                        value: scalar.clone(),
                    }
                } else {
                    Strategy::IndexRange {
                        field,
                        value: scalar.clone(),
                        residual,
                    }
                };
            }
            // Not usable as key material; another indexed field may be.
            _ => continue,
        }
    }

    Strategy::Scan {
        filters: expand_dotted(filters),
    }
}

/// Filters left over once `field` is served by an index, in nested form.
fn residual_filters(filters: &FilterMap, field: IndexedField) -> FilterMap {
    let rest: FilterMap = filters
        .iter()
        .filter(|(name, _)| name.as_str() != field.field_name())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    expand_dotted(&rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(value: Value) -> FilterMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("filters must be an object"),
        }
    }

    #[test]
    fn no_filters_is_full_scan() {
        assert_eq!(plan(&FilterMap::new()), Strategy::FullScan);
    }

    #[test]
    fn scalar_id_is_equality_fetch() {
        let strategy = plan(&filters(json!({"id": "r1"})));
        assert_eq!(
            strategy,
            Strategy::IndexEquality {
                field: IndexedField::Id,
                value: json!("r1"),
            }
        );
    }

    #[test]
    fn scalar_with_residual_opens_a_cursor() {
        let strategy = plan(&filters(json!({"_status": "created", "done": true})));
        assert_eq!(
            strategy,
            Strategy::IndexRange {
                field: IndexedField::Status,
                value: json!("created"),
                residual: filters(json!({"done": true})),
            }
        );
    }

    #[test]
    fn list_value_is_a_merge_join() {
        let strategy = plan(&filters(json!({"id": ["a", "b"], "done": true})));
        assert_eq!(
            strategy,
            Strategy::IndexMergeJoin {
                field: IndexedField::Id,
                values: vec![json!("a"), json!("b")],
                residual: filters(json!({"done": true})),
            }
        );
    }

    #[test]
    fn empty_list_short_circuits() {
        let strategy = plan(&filters(json!({"id": [], "done": true})));
        assert_eq!(strategy, Strategy::Empty);
    }

    #[test]
    fn only_first_indexed_field_is_honored() {
        let strategy = plan(&filters(json!({"_status": "created", "last_modified": 9})));
        assert_eq!(
            strategy,
            Strategy::IndexRange {
                field: IndexedField::Status,
                value: json!("created"),
                residual: filters(json!({"last_modified": 9})),
            }
        );
    }

    #[test]
    fn unindexed_fields_scan_the_partition() {
        let strategy = plan(&filters(json!({"done": true})));
        assert_eq!(
            strategy,
            Strategy::Scan {
                filters: filters(json!({"done": true})),
            }
        );
    }

    #[test]
    fn dotted_filters_are_expanded_for_the_evaluator() {
        let strategy = plan(&filters(json!({"author.name": "jane"})));
        assert_eq!(
            strategy,
            Strategy::Scan {
                filters: filters(json!({"author": {"name": "jane"}})),
            }
        );
    }

    #[test]
    fn dotted_residual_rides_along_an_indexed_filter() {
        let strategy = plan(&filters(json!({"_status": "synced", "author.name": "jane"})));
        assert_eq!(
            strategy,
            Strategy::IndexRange {
                field: IndexedField::Status,
                value: json!("synced"),
                residual: filters(json!({"author": {"name": "jane"}})),
            }
        );
    }

    #[test]
    fn non_scalar_indexed_value_falls_through() {
        // An object under `id` is not key material; `last_modified` is.
        let strategy = plan(&filters(json!({"id": {"odd": 1}, "last_modified": 4})));
        assert_eq!(
            strategy,
            Strategy::IndexRange {
                field: IndexedField::LastModified,
                value: json!(4),
                residual: filters(json!({"id": {"odd": 1}})),
            }
        );
    }

    #[test]
    fn non_integral_timestamp_is_not_indexable() {
        let strategy = plan(&filters(json!({"last_modified": 1.5})));
        assert_eq!(
            strategy,
            Strategy::Scan {
                filters: filters(json!({"last_modified": 1.5})),
            }
        );
    }

    #[test]
    fn list_with_non_scalar_member_falls_back_to_scan() {
        let strategy = plan(&filters(json!({"id": ["a", {"b": 1}]})));
        assert_eq!(
            strategy,
            Strategy::Scan {
                filters: filters(json!({"id": ["a", {"b": 1}]})),
            }
        );
    }
}
