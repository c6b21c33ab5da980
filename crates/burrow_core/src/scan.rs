//! Strategy execution: bulk fetches, cursor scans, and the merge-join.
//!
//! Results come back in physical index order; caller-requested ordering is
//! a post-pass applied by the collection handle after the partition
//! attribute has been stripped.

use crate::error::{StoreError, StoreResult};
use crate::filters::record_matches;
use crate::planner::{IndexedField, Strategy};
use crate::schema::{IDX_COLLECTION, RECORDS};
use burrow_engine::{Cursor, Key, KeyRange, ReadTxn};
use serde_json::Value;

/// Primary key of a record: `(collection, id)`.
pub(crate) fn record_key(collection: &str, id: &str) -> Key {
    Key::Seq(vec![
        Key::Text(collection.to_string()),
        Key::Text(id.to_string()),
    ])
}

fn partition_key(collection: &str) -> Key {
    Key::Text(collection.to_string())
}

/// Composite `(collection, value)` key for an indexed-field filter value.
fn compound_key(collection: &str, value: &Value) -> StoreResult<Key> {
    let scalar = Key::from_value(value).map_err(|e| StoreError::engine("plan", e))?;
    Ok(Key::Seq(vec![Key::Text(collection.to_string()), scalar]))
}

/// Merges an ascending cursor against a sorted list of target keys.
///
/// One linear pass: the target pointer advances while the cursor key is
/// ahead of it, element-wise equality collects a candidate, and a cursor
/// key behind the current target triggers a skip-seek directly to that
/// target instead of stepping record by record. Work is O(n + m) for n
/// scanned entries and m targets, and gaps in the key space (targets with
/// no record) fall out naturally.
pub(crate) fn merge_scan<F>(cursor: &mut Cursor, targets: &[Key], mut on_match: F)
where
    F: FnMut(&Value),
{
    let mut i = 0;
    loop {
        let Some(key) = cursor.key().cloned() else {
            break;
        };
        while i < targets.len() && key > targets[i] {
            i += 1;
        }
        if i == targets.len() {
            break;
        }
        if key == targets[i] {
            if let Some(value) = cursor.value() {
                on_match(value);
            }
            cursor.advance();
        } else {
            cursor.seek(&targets[i]);
        }
    }
}

/// Runs a planned strategy against one collection partition.
///
/// Returned records still carry the partition attribute.
pub(crate) fn execute_list(
    txn: &ReadTxn<'_>,
    collection: &str,
    strategy: &Strategy,
) -> StoreResult<Vec<Value>> {
    match strategy {
        Strategy::Empty => Ok(Vec::new()),

        Strategy::FullScan => txn
            .index_get_all(
                RECORDS,
                IDX_COLLECTION,
                &KeyRange::only(partition_key(collection)),
            )
            .map_err(|e| StoreError::engine("list", e)),

        Strategy::Scan { filters } => {
            let mut cursor = txn
                .open_index_cursor(
                    RECORDS,
                    IDX_COLLECTION,
                    &KeyRange::only(partition_key(collection)),
                )
                .map_err(|e| StoreError::engine("list", e))?;
            let mut out = Vec::new();
            while let Some(value) = cursor.value() {
                if record_matches(value, filters) {
                    out.push(value.clone());
                }
                cursor.advance();
            }
            Ok(out)
        }

        Strategy::IndexEquality { field, value } => {
            let key = compound_key(collection, value)?;
            match field.index_name() {
                None => Ok(txn
                    .get(RECORDS, &key)
                    .map_err(|e| StoreError::engine("list", e))?
                    .into_iter()
                    .collect()),
                Some(index) => txn
                    .index_get_all(RECORDS, index, &KeyRange::only(key))
                    .map_err(|e| StoreError::engine("list", e)),
            }
        }

        Strategy::IndexRange {
            field,
            value,
            residual,
        } => {
            let key = compound_key(collection, value)?;
            let mut cursor = open_field_cursor(txn, *field, KeyRange::only(key))?;
            let mut out = Vec::new();
            while let Some(value) = cursor.value() {
                if record_matches(value, residual) {
                    out.push(value.clone());
                }
                cursor.advance();
            }
            Ok(out)
        }

        Strategy::IndexMergeJoin {
            field,
            values,
            residual,
        } => {
            let mut targets = values
                .iter()
                .map(|v| compound_key(collection, v))
                .collect::<StoreResult<Vec<_>>>()?;
            targets.sort();
            let (Some(first), Some(last)) = (targets.first(), targets.last()) else {
                return Ok(Vec::new());
            };
            let range = KeyRange::bound(first.clone(), last.clone());
            let mut cursor = open_field_cursor(txn, *field, range)?;
            let mut out = Vec::new();
            merge_scan(&mut cursor, &targets, |value| {
                if residual.is_empty() || record_matches(value, residual) {
                    out.push(value.clone());
                }
            });
            Ok(out)
        }
    }
}

/// Opens the cursor backing an indexed-field strategy: the primary order
/// for `id`, the field's secondary index otherwise.
fn open_field_cursor(
    txn: &ReadTxn<'_>,
    field: IndexedField,
    range: KeyRange,
) -> StoreResult<Cursor> {
    match field.index_name() {
        None => txn.open_cursor(RECORDS, &range),
        Some(index) => txn.open_index_cursor(RECORDS, index, &range),
    }
    .map_err(|e| StoreError::engine("list", e))
}
