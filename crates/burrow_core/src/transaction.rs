//! The transaction proxy: a callback-scoped unit of atomic work.
//!
//! `CollectionStore::execute_transaction` opens exactly one readwrite
//! transaction, preloads the requested records into memory, and lends the
//! callback a proxy whose operations are all synchronous. The proxy cannot
//! outlive the callback (it is lent by `&mut` for the closure's extent),
//! so the unit of work cannot suspend mid-transaction or resume after the
//! engine has finalized it; anything that still reaches a finished
//! transaction through an internal layer surfaces as a contract violation.

use crate::error::{StoreError, StoreResult};
use crate::record::{
    new_record_id, record_id, stamp_collection, strip_collection, Record, FIELD_ID,
};
use crate::scan::{merge_scan, record_key};
use crate::schema::RECORDS;
use burrow_engine::{Key, KeyRange, WriteTxn};
use serde_json::Value;
use std::collections::HashMap;

/// Operations available to a transaction callback.
///
/// Reads come exclusively from the preloaded map: writes performed earlier
/// in the same callback are not visible to `get`. Writes are buffered and
/// commit atomically when the callback returns `Ok`; none of them confirms
/// success individually.
pub struct TransactionProxy<'t, 'db> {
    txn: &'t mut WriteTxn<'db>,
    collection: &'t str,
    preloaded: HashMap<String, Value>,
}

impl<'t, 'db> TransactionProxy<'t, 'db> {
    pub(crate) fn new(
        txn: &'t mut WriteTxn<'db>,
        collection: &'t str,
        preloaded: HashMap<String, Value>,
    ) -> Self {
        Self {
            txn,
            collection,
            preloaded,
        }
    }

    /// Returns the preloaded record for `id`, if any.
    ///
    /// Only records named in the transaction's preload list are visible;
    /// the pre-transaction stored value is returned even after an `update`
    /// or `delete` of the same record earlier in the callback.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Value> {
        self.preloaded.get(id).cloned().map(strip_collection)
    }

    /// Buffers creation of a record.
    ///
    /// A missing id is assigned; a present one must be a string and must
    /// not collide with an existing record. Returns the record as it will
    /// be stored (minus the internal partition attribute).
    pub fn create(&mut self, record: Record) -> StoreResult<Record> {
        let mut record = record;
        let id = match record_id(&record) {
            Some(id) => id.to_string(),
            None if record.contains_key(FIELD_ID) => {
                return Err(StoreError::invalid_record("record id must be a string"));
            }
            None => {
                let id = new_record_id();
                record.insert(FIELD_ID.to_string(), Value::String(id.clone()));
                id
            }
        };
        let key = record_key(self.collection, &id);
        let existing = self
            .txn
            .get(RECORDS, &key)
            .map_err(|e| StoreError::engine("create", e))?;
        if existing.is_some() {
            return Err(StoreError::invalid_record(format!(
                "record `{id}` already exists"
            )));
        }
        self.put(record.clone(), "create")?;
        Ok(record)
    }

    /// Buffers an update (upsert) of a record. The record must carry a
    /// string id.
    pub fn update(&mut self, record: Record) -> StoreResult<Record> {
        if record_id(&record).is_none() {
            return Err(StoreError::invalid_record(
                "cannot update a record without a string id",
            ));
        }
        self.put(record.clone(), "update")?;
        Ok(record)
    }

    /// Buffers deletion of the record with `id`.
    ///
    /// Returns the preloaded record, if the id was preloaded.
    pub fn delete(&mut self, id: &str) -> StoreResult<Option<Value>> {
        let key = record_key(self.collection, id);
        self.txn
            .delete(RECORDS, &key)
            .map_err(|e| StoreError::engine("delete", e))?;
        Ok(self.preloaded.get(id).cloned().map(strip_collection))
    }

    fn put(&mut self, mut record: Record, operation: &'static str) -> StoreResult<()> {
        stamp_collection(&mut record, self.collection);
        self.txn
            .put(RECORDS, Value::Object(record))
            .map_err(|e| StoreError::engine(operation, e))?;
        Ok(())
    }
}

/// Fetches the records named in a preload list into an in-memory map.
///
/// A single id is an equality fetch against the primary key; several ids
/// go through the sorted-target merge over a range-bounded cursor, the same
/// machinery the listing path uses.
pub(crate) fn preload(
    txn: &WriteTxn<'_>,
    collection: &str,
    ids: &[&str],
) -> StoreResult<HashMap<String, Value>> {
    let mut out = HashMap::new();
    if ids.is_empty() {
        return Ok(out);
    }

    let mut targets: Vec<Key> = ids.iter().map(|id| record_key(collection, id)).collect();
    targets.sort();
    targets.dedup();

    if let [single] = targets.as_slice() {
        if let Some(value) = txn
            .get(RECORDS, single)
            .map_err(|e| StoreError::engine("preload", e))?
        {
            insert_by_id(&mut out, value);
        }
        return Ok(out);
    }

    let (Some(first), Some(last)) = (targets.first(), targets.last()) else {
        return Ok(out);
    };
    let range = KeyRange::bound(first.clone(), last.clone());
    let mut cursor = txn
        .open_cursor(RECORDS, &range)
        .map_err(|e| StoreError::engine("preload", e))?;
    merge_scan(&mut cursor, &targets, |value| {
        insert_by_id(&mut out, value.clone());
    });
    Ok(out)
}

fn insert_by_id(map: &mut HashMap<String, Value>, value: Value) {
    let id = value.get(FIELD_ID).and_then(Value::as_str).map(str::to_string);
    if let Some(id) = id {
        map.insert(id, value);
    }
}
