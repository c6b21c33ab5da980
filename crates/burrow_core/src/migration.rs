//! One-shot migration of legacy per-collection databases.
//!
//! Before the unified schema, every collection lived in its own database
//! named after the collection id: a records store of the same name plus a
//! `__meta__` store holding the last-synced timestamp. Migration probes
//! for that layout, extracts everything, re-imports it into the unified
//! schema, and permanently deletes the legacy database.
//!
//! The procedure is forward-only and idempotent. A probe must not leave a
//! database behind: opening a name that never existed creates an empty
//! shell, which is deleted on the spot and reported as not-found. Any
//! failure between extraction and import preserves the legacy database so
//! a later open can retry.

use crate::error::{StoreError, StoreResult};
use crate::store::CollectionStore;
use burrow_engine::{Environment, Key, KeyRange};
use serde_json::Value;

/// Meta store present in every legacy database.
pub(crate) const LEGACY_META_STORE: &str = "__meta__";

/// Keys the legacy timestamp may live under, in lookup order.
pub(crate) const LEGACY_TIMESTAMP_KEYS: [&str; 2] = ["lastModified", "last_modified"];

/// Outcome of a completed migration.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Number of records carried over.
    pub records: usize,
    /// The legacy timestamp, if one was stored.
    pub last_modified: Option<i64>,
}

/// Everything extracted from a legacy database.
struct LegacyDump {
    records: Vec<Value>,
    last_modified: Option<i64>,
}

/// Runs the migration for one collection, if a legacy database exists.
///
/// Returns `Ok(None)` when there is nothing to migrate.
pub(crate) fn run(store: &CollectionStore) -> StoreResult<Option<MigrationReport>> {
    let collection = store.collection();
    // A collection sharing the unified database's name cannot have a
    // legacy database of its own; probing would touch the unified store.
    if collection == store.database_name() {
        return Ok(None);
    }
    let Some(dump) = extract_legacy(store.env(), collection)? else {
        return Ok(None);
    };

    let count = dump.records.len();
    store
        .import_bulk(dump.records)
        .map_err(|e| StoreError::migration(format!("import `{collection}`: {e}")))?;
    if let Some(ts) = dump.last_modified {
        store
            .advance_last_modified(ts)
            .map_err(|e| StoreError::migration(format!("timestamp `{collection}`: {e}")))?;
    }

    // Only after the unified store holds everything.
    store
        .env()
        .delete(collection)
        .map_err(|e| StoreError::migration(format!("delete legacy `{collection}`: {e}")))?;

    tracing::info!(
        collection,
        records = count,
        last_modified = dump.last_modified,
        "legacy database migrated"
    );
    Ok(Some(MigrationReport {
        records: count,
        last_modified: dump.last_modified,
    }))
}

/// Probes for a legacy database and extracts its content.
///
/// Detection requires both the `__meta__` store and a records store named
/// after the collection. A probe that created an empty shell deletes it
/// immediately; a database that exists but does not look legacy is left
/// alone.
fn extract_legacy(env: &Environment, collection: &str) -> StoreResult<Option<LegacyDump>> {
    let db = env
        .open(collection, 1, |_| Ok(()))
        .map_err(|e| StoreError::migration(format!("probe `{collection}`: {e}")))?;

    let names = db.store_names();
    let looks_legacy = names.iter().any(|n| n == collection)
        && names.iter().any(|n| n == LEGACY_META_STORE);
    if !looks_legacy {
        if names.is_empty() {
            // The probe itself created this shell.
            env.delete(collection)
                .map_err(|e| StoreError::migration(format!("drop probe shell: {e}")))?;
        } else {
            env.close(collection);
        }
        return Ok(None);
    }

    tracing::debug!(collection, "legacy database detected");
    let dump = db.read_transaction(|txn| {
        let mut cursor = txn
            .open_cursor(collection, &KeyRange::All)
            .map_err(|e| StoreError::migration(format!("legacy scan: {e}")))?;
        let mut records = Vec::new();
        while let Some(value) = cursor.value() {
            records.push(value.clone());
            cursor.advance();
        }

        let mut last_modified = None;
        for key in LEGACY_TIMESTAMP_KEYS {
            let entry = txn
                .get(LEGACY_META_STORE, &Key::Text(key.to_string()))
                .map_err(|e| StoreError::migration(format!("legacy meta: {e}")))?;
            if let Some(value) = entry.and_then(|e| e.get("value").and_then(Value::as_i64)) {
                last_modified = Some(value);
                break;
            }
        }

        Ok::<_, StoreError>(LegacyDump {
            records,
            last_modified,
        })
    })?;

    Ok(Some(dump))
}
