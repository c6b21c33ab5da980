//! Store fixtures and legacy-layout seeding helpers.

use burrow_core::CollectionStore;
use burrow_engine::{EngineError, Environment};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Creates a collection store over a fresh in-memory environment.
#[must_use]
pub fn memory_store(collection: &str) -> CollectionStore {
    CollectionStore::new(Arc::new(Environment::memory()), collection)
}

/// Creates a collection store and also hands back its environment, for
/// tests that need to seed or inspect databases directly.
#[must_use]
pub fn memory_store_with_env(collection: &str) -> (Arc<Environment>, CollectionStore) {
    let env = Arc::new(Environment::memory());
    let store = CollectionStore::new(Arc::clone(&env), collection);
    (env, store)
}

/// Creates a collection store over a file-backed environment in a temp
/// directory. Keep the `TempDir` alive for the duration of the test.
#[must_use]
pub fn file_store(collection: &str) -> (TempDir, CollectionStore) {
    let dir = TempDir::new().expect("create temp directory");
    let env = Arc::new(Environment::at_dir(dir.path()).expect("open environment"));
    let store = CollectionStore::new(env, collection);
    (dir, store)
}

/// Builds a record with the reserved sync attributes filled in.
#[must_use]
pub fn sample_record(id: &str, status: &str, last_modified: i64) -> Value {
    json!({
        "id": id,
        "_status": status,
        "last_modified": last_modified,
        "title": format!("record {id}"),
    })
}

/// Seeds a database in the legacy per-collection layout: a records store
/// named after the collection plus a `__meta__` store carrying the
/// last-synced timestamp under `ts_key`.
pub fn seed_legacy_database(
    env: &Environment,
    collection: &str,
    records: &[Value],
    ts_key: &str,
    ts: Option<i64>,
) {
    let db = env
        .open(collection, 1, |txn| {
            txn.create_store(collection, vec!["id".into()])?;
            txn.create_store("__meta__", vec!["name".into()])
        })
        .expect("open legacy database");
    db.write_transaction::<_, EngineError, _>(|txn| {
        for record in records {
            txn.put(collection, record.clone())?;
        }
        if let Some(ts) = ts {
            txn.put("__meta__", json!({"name": ts_key, "value": ts}))?;
        }
        Ok(())
    })
    .expect("seed legacy database");
    env.close(collection);
}
