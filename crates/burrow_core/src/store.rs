//! The per-collection store handle.

use crate::error::{StoreError, StoreResult};
use crate::filters::{sort_records, FilterMap};
use crate::migration;
use crate::planner::plan;
use crate::record::{record_id, strip_collection, stamp_collection, FIELD_LAST_MODIFIED};
use crate::scan::{execute_list, record_key};
use crate::schema::{self, COLLECTIONS, RECORDS, TIMESTAMPS};
use crate::transaction::{preload, TransactionProxy};
use burrow_engine::{Database, Environment, Key, KeyRange};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for a collection store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    database: String,
    migrate_legacy: bool,
}

impl StoreOptions {
    /// Default options: the shared `burrow` database, no legacy migration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            database: "burrow".to_string(),
            migrate_legacy: false,
        }
    }

    /// Sets the name of the shared database all collections live in.
    #[must_use]
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = name.into();
        self
    }

    /// Enables one-shot migration from the legacy per-collection layout.
    #[must_use]
    pub fn migrate_legacy(mut self, enabled: bool) -> Self {
        self.migrate_legacy = enabled;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters for [`CollectionStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Filter map: field name to scalar, list, or sub-object filter.
    /// Dotted field names denote sub-object paths.
    pub filters: FilterMap,
    /// Optional order specification, e.g. `"-last_modified, id"`.
    pub order: Option<String>,
}

impl ListParams {
    /// Empty parameters: every record, physical order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one filter entry.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.insert(field.into(), value);
        self
    }

    /// Sets the order specification.
    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }
}

/// A handle on one collection of records.
///
/// All collections share one database (partitioned internally); the
/// partition attribute never appears in records returned by this handle.
/// The handle keeps an explicit connection state: `open` is idempotent,
/// `close` releases the handle, and any later operation transparently
/// re-opens.
pub struct CollectionStore {
    env: Arc<Environment>,
    collection: String,
    options: StoreOptions,
    handle: RwLock<Option<Arc<Database>>>,
    migration_checked: AtomicBool,
}

impl CollectionStore {
    /// Creates a handle with default options. No I/O happens until the
    /// first operation.
    #[must_use]
    pub fn new(env: Arc<Environment>, collection: impl Into<String>) -> Self {
        Self::with_options(env, collection, StoreOptions::new())
    }

    /// Creates a handle with explicit options.
    #[must_use]
    pub fn with_options(
        env: Arc<Environment>,
        collection: impl Into<String>,
        options: StoreOptions,
    ) -> Self {
        Self {
            env,
            collection: collection.into(),
            options,
            handle: RwLock::new(None),
            migration_checked: AtomicBool::new(false),
        }
    }

    /// The collection id this handle serves.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub(crate) fn env(&self) -> &Environment {
        &self.env
    }

    pub(crate) fn database_name(&self) -> &str {
        &self.options.database
    }

    /// Opens the store: ensures the unified schema and, when enabled, runs
    /// the one-shot legacy migration ahead of normal operation.
    ///
    /// Idempotent; a failed open surfaces to the caller and is not retried
    /// internally.
    pub fn open(&self) -> StoreResult<()> {
        self.ensure_open()?;
        // The flag flips before the migration runs: the migration itself
        // re-enters `open` through the bulk import, and must not probe
        // again. A failure resets it so a later open can retry.
        if self.options.migrate_legacy && !self.migration_checked.swap(true, Ordering::AcqRel) {
            if let Err(e) = migration::run(self) {
                self.migration_checked.store(false, Ordering::Release);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Releases the connection handle. A later operation re-opens.
    pub fn close(&self) {
        *self.handle.write() = None;
    }

    /// Deletes every record of this collection, leaving other collections
    /// in the shared store untouched.
    pub fn clear(&self) -> StoreResult<()> {
        let db = self.db()?;
        db.write_transaction(|txn| {
            txn.clear(
                RECORDS,
                KeyRange::prefix(vec![Key::Text(self.collection.clone())]),
            )
            .map_err(|e| StoreError::engine("clear", e))
        })
    }

    /// Reads one record by id.
    pub fn get(&self, id: &str) -> StoreResult<Option<Value>> {
        let db = self.db()?;
        let found = db.read_transaction(|txn| {
            txn.get(RECORDS, &record_key(&self.collection, id))
                .map_err(|e| StoreError::engine("get", e))
        })?;
        Ok(found.map(strip_collection))
    }

    /// Lists records matching the filters, optionally sorted.
    ///
    /// Index selection happens in the planner; whatever the chosen index
    /// cannot decide is evaluated per record. Without an order
    /// specification, records come back in physical index order.
    pub fn list(&self, params: &ListParams) -> StoreResult<Vec<Value>> {
        let strategy = plan(&params.filters);
        let db = self.db()?;
        let raw = db.read_transaction(|txn| execute_list(txn, &self.collection, &strategy))?;
        let records: Vec<Value> = raw.into_iter().map(strip_collection).collect();
        Ok(match &params.order {
            Some(order) => sort_records(records, order),
            None => records,
        })
    }

    /// Runs a callback as one atomic unit of work.
    ///
    /// Exactly one readwrite transaction spans the whole call. Records
    /// named in `preload` are fetched first and served to the callback's
    /// `get`. If the callback returns `Err`, every buffered operation is
    /// discarded and the error is rethrown unchanged; on `Ok`, the buffer
    /// commits as a single unit.
    pub fn execute_transaction<T, F>(&self, preload_ids: &[&str], callback: F) -> StoreResult<T>
    where
        F: FnOnce(&mut TransactionProxy<'_, '_>) -> StoreResult<T>,
    {
        let db = self.db()?;
        db.write_transaction(|txn| {
            let preloaded = preload(txn, &self.collection, preload_ids)?;
            let mut proxy = TransactionProxy::new(txn, &self.collection, preloaded);
            callback(&mut proxy)
        })
    }

    /// Stores the last-synced timestamp, overwriting any previous value.
    pub fn save_last_modified(&self, value: i64) -> StoreResult<i64> {
        let db = self.db()?;
        db.write_transaction(|txn| {
            txn.put(
                TIMESTAMPS,
                json!({"collection": self.collection.clone(), "value": value}),
            )
            .map_err(|e| StoreError::engine("save_last_modified", e))?;
            Ok(value)
        })
    }

    /// Reads the last-synced timestamp, if one was stored.
    pub fn get_last_modified(&self) -> StoreResult<Option<i64>> {
        let db = self.db()?;
        let entry = db.read_transaction(|txn| {
            txn.get(TIMESTAMPS, &Key::Text(self.collection.clone()))
                .map_err(|e| StoreError::engine("get_last_modified", e))
        })?;
        Ok(entry.and_then(|v| v.get("value").and_then(Value::as_i64)))
    }

    /// Advances the timestamp to `candidate` only if it is strictly greater
    /// than the stored value. Returns whether the timestamp moved.
    pub(crate) fn advance_last_modified(&self, candidate: i64) -> StoreResult<bool> {
        let db = self.db()?;
        db.write_transaction(|txn| {
            let current = txn
                .get(TIMESTAMPS, &Key::Text(self.collection.clone()))
                .map_err(|e| StoreError::engine("save_last_modified", e))?
                .and_then(|v| v.get("value").and_then(Value::as_i64));
            if current.is_some_and(|c| candidate <= c) {
                return Ok(false);
            }
            txn.put(
                TIMESTAMPS,
                json!({"collection": self.collection.clone(), "value": candidate}),
            )
            .map_err(|e| StoreError::engine("save_last_modified", e))?;
            Ok(true)
        })
    }

    /// Imports records in bulk, as one atomic transaction of upserts.
    ///
    /// Every record must be an object carrying a string id. After commit,
    /// the timestamp advances to the maximum `last_modified` among the
    /// imported records when that exceeds the stored value. The input is
    /// returned unchanged.
    pub fn import_bulk(&self, records: Vec<Value>) -> StoreResult<Vec<Value>> {
        for record in &records {
            match record.as_object() {
                None => {
                    return Err(StoreError::invalid_record("imported record is not an object"))
                }
                Some(obj) if record_id(obj).is_none() => {
                    return Err(StoreError::invalid_record(
                        "imported record is missing a string `id`",
                    ))
                }
                Some(_) => {}
            }
        }

        let db = self.db()?;
        db.write_transaction(|txn| {
            for record in &records {
                if let Some(obj) = record.as_object() {
                    let mut stored = obj.clone();
                    stamp_collection(&mut stored, &self.collection);
                    txn.put(RECORDS, Value::Object(stored))
                        .map_err(|e| StoreError::engine("import", e))?;
                }
            }
            Ok::<(), StoreError>(())
        })?;

        let newest = records
            .iter()
            .filter_map(|r| r.get(FIELD_LAST_MODIFIED).and_then(Value::as_i64))
            .max();
        if let Some(ts) = newest {
            self.advance_last_modified(ts)?;
        }
        Ok(records)
    }

    /// Alias of [`CollectionStore::import_bulk`].
    pub fn load_dump(&self, records: Vec<Value>) -> StoreResult<Vec<Value>> {
        self.import_bulk(records)
    }

    /// Stores the collection metadata blob, overwriting any previous one.
    pub fn save_metadata(&self, metadata: Value) -> StoreResult<Value> {
        let db = self.db()?;
        db.write_transaction(|txn| {
            txn.put(
                COLLECTIONS,
                json!({"collection": self.collection.clone(), "metadata": metadata.clone()}),
            )
            .map_err(|e| StoreError::engine("save_metadata", e))?;
            Ok::<(), StoreError>(())
        })?;
        Ok(metadata)
    }

    /// Reads the collection metadata blob, if one was stored.
    pub fn get_metadata(&self) -> StoreResult<Option<Value>> {
        let db = self.db()?;
        let entry = db.read_transaction(|txn| {
            txn.get(COLLECTIONS, &Key::Text(self.collection.clone()))
                .map_err(|e| StoreError::engine("get_metadata", e))
        })?;
        Ok(entry.map(|v| v.get("metadata").cloned().unwrap_or(Value::Null)))
    }

    /// Ensures the handle is open, without running the migration pass.
    fn ensure_open(&self) -> StoreResult<Arc<Database>> {
        if let Some(db) = self.handle.read().as_ref() {
            return Ok(Arc::clone(db));
        }
        let db = schema::open_database(&self.env, &self.options.database)?;
        *self.handle.write() = Some(Arc::clone(&db));
        Ok(db)
    }

    /// The open database handle, transparently (re)opening.
    fn db(&self) -> StoreResult<Arc<Database>> {
        self.open()?;
        self.handle
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| StoreError::connection("store is closed"))
    }
}

impl std::fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("collection", &self.collection)
            .field("open", &self.handle.read().is_some())
            .finish_non_exhaustive()
    }
}
