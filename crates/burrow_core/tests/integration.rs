//! Integration tests for the collection store.

use burrow_core::{
    CollectionStore, Environment, ListParams, StoreError, StoreOptions, StoreResult,
};
use burrow_testkit::{
    file_store, memory_store, memory_store_with_env, record_batch, sample_record,
    seed_legacy_database, small_ids,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("record must be an object"),
    }
}

fn ids(records: &[Value]) -> Vec<&str> {
    records
        .iter()
        .map(|r| r.get("id").and_then(Value::as_str).unwrap())
        .collect()
}

#[test]
fn list_with_unindexed_filters_matches_predicate_exactly() {
    let store = memory_store("articles");
    store
        .import_bulk(vec![
            json!({"id": "a", "_status": "synced", "last_modified": 1, "unread": true}),
            json!({"id": "b", "_status": "synced", "last_modified": 2, "unread": false}),
            json!({"id": "c", "_status": "synced", "last_modified": 3, "unread": true}),
        ])
        .unwrap();

    let unread = store
        .list(&ListParams::new().filter("unread", json!(true)))
        .unwrap();
    assert_eq!(ids(&unread), vec!["a", "c"]);
}

#[test]
fn list_strips_partition_attribute_and_sorts() {
    let store = memory_store("articles");
    store
        .import_bulk(vec![
            sample_record("a", "synced", 3),
            sample_record("b", "synced", 1),
            sample_record("c", "synced", 2),
        ])
        .unwrap();

    let records = store
        .list(&ListParams::new().order("-last_modified"))
        .unwrap();
    assert_eq!(ids(&records), vec!["a", "c", "b"]);
    for record in &records {
        assert!(record.get("_collection").is_none());
    }
}

#[test]
fn list_by_status_list_filter() {
    let store = memory_store("articles");
    store
        .import_bulk(vec![
            sample_record("a", "synced", 1),
            sample_record("b", "created", 2),
            sample_record("c", "updated", 3),
            sample_record("d", "deleted", 4),
        ])
        .unwrap();

    let dirty = store
        .list(&ListParams::new().filter("_status", json!(["created", "updated", "deleted"])))
        .unwrap();
    assert_eq!(dirty.len(), 3);
}

#[test]
fn dotted_filter_combines_with_indexed_filter() {
    let store = memory_store("articles");
    store
        .import_bulk(vec![
            json!({"id": "a", "_status": "created", "last_modified": 1,
                   "author": {"name": "jane"}}),
            json!({"id": "b", "_status": "created", "last_modified": 2,
                   "author": {"name": "joan"}}),
            json!({"id": "c", "_status": "synced", "last_modified": 3,
                   "author": {"name": "jane"}}),
        ])
        .unwrap();

    let records = store
        .list(
            &ListParams::new()
                .filter("_status", json!("created"))
                .filter("author.name", json!("jane")),
        )
        .unwrap();
    assert_eq!(ids(&records), vec!["a"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The merge-join over an id list returns exactly what naive
    /// per-record equality would, for any distribution of targets.
    #[test]
    fn merge_join_equivalent_to_naive_filtering(
        batch in record_batch(6),
        wanted in small_ids(10),
    ) {
        let store = memory_store("articles");
        store.import_bulk(batch.clone()).unwrap();

        let wanted_values: Vec<Value> =
            wanted.iter().map(|id| json!(id)).collect();
        let merged = store
            .list(&ListParams::new().filter("id", Value::Array(wanted_values)))
            .unwrap();

        let mut expected: Vec<Value> = batch
            .into_iter()
            .filter(|r| {
                let id = r.get("id").and_then(Value::as_str).unwrap();
                wanted.iter().any(|w| w == id)
            })
            .collect();
        expected.sort_by_key(|r| r.get("id").and_then(Value::as_str).map(str::to_string));

        prop_assert_eq!(merged, expected);
    }
}

#[test]
fn import_bulk_advances_timestamp_monotonically() {
    let store = memory_store("articles");
    store
        .import_bulk(vec![
            json!({"id": "a", "last_modified": 5}),
            json!({"id": "b", "last_modified": 9}),
        ])
        .unwrap();
    assert_eq!(store.get_last_modified().unwrap(), Some(9));

    // A lower batch never regresses the timestamp.
    store
        .import_bulk(vec![json!({"id": "c", "last_modified": 3})])
        .unwrap();
    assert_eq!(store.get_last_modified().unwrap(), Some(9));
}

#[test]
fn import_bulk_returns_input_unchanged() {
    let store = memory_store("articles");
    let records = vec![sample_record("a", "synced", 1), sample_record("b", "synced", 2)];
    let returned = store.import_bulk(records.clone()).unwrap();
    assert_eq!(returned, records);
}

#[test]
fn load_dump_is_an_alias_of_import_bulk() {
    let store = memory_store("articles");
    store
        .load_dump(vec![sample_record("a", "synced", 4)])
        .unwrap();
    assert!(store.get("a").unwrap().is_some());
    assert_eq!(store.get_last_modified().unwrap(), Some(4));
}

#[test]
fn transaction_commits_atomically() {
    let store = memory_store("articles");
    store
        .execute_transaction(&[], |txn| {
            txn.create(object(json!({"id": "a", "title": "one"})))?;
            txn.create(object(json!({"id": "b", "title": "two"})))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(store.list(&ListParams::new()).unwrap().len(), 2);
}

#[test]
fn failed_transaction_leaves_no_trace() {
    let store = memory_store("articles");
    let result: StoreResult<()> = store.execute_transaction(&[], |txn| {
        txn.create(object(json!({"id": "a"})))?;
        Err(StoreError::invalid_record("deliberate failure"))
    });
    assert!(result.is_err());

    // Full abort: the create never happened.
    assert!(store.list(&ListParams::new()).unwrap().is_empty());
    assert!(store.get("a").unwrap().is_none());
}

#[test]
fn preloaded_get_returns_pre_transaction_value() {
    let store = memory_store("articles");
    store
        .import_bulk(vec![json!({"id": "x", "title": "before"})])
        .unwrap();

    store
        .execute_transaction(&["x"], |txn| {
            txn.update(object(json!({"id": "x", "title": "after"})))?;
            // Reads come from the preloaded snapshot, not from earlier
            // writes in this same callback.
            let seen = txn.get("x").unwrap();
            assert_eq!(seen, json!({"id": "x", "title": "before"}));
            Ok(())
        })
        .unwrap();

    let stored = store.get("x").unwrap().unwrap();
    assert_eq!(stored, json!({"id": "x", "title": "after"}));
}

#[test]
fn transaction_delete_returns_preloaded_record() {
    let store = memory_store("articles");
    store
        .import_bulk(vec![json!({"id": "x", "title": "doomed"})])
        .unwrap();

    let removed = store
        .execute_transaction(&["x"], |txn| txn.delete("x"))
        .unwrap();
    assert_eq!(removed, Some(json!({"id": "x", "title": "doomed"})));
    assert!(store.get("x").unwrap().is_none());
}

#[test]
fn clear_leaves_other_collections_alone() {
    let env = Arc::new(Environment::memory());
    let articles = CollectionStore::new(Arc::clone(&env), "articles");
    let authors = CollectionStore::new(Arc::clone(&env), "authors");

    articles
        .import_bulk(vec![sample_record("a", "synced", 1)])
        .unwrap();
    authors
        .import_bulk(vec![sample_record("a", "synced", 1)])
        .unwrap();

    articles.clear().unwrap();

    assert!(articles.list(&ListParams::new()).unwrap().is_empty());
    assert_eq!(authors.list(&ListParams::new()).unwrap().len(), 1);
}

#[test]
fn migration_carries_records_and_timestamp() {
    let (env, _) = memory_store_with_env("articles");
    seed_legacy_database(
        &env,
        "articles",
        &[
            sample_record("a", "synced", 10),
            sample_record("b", "synced", 20),
        ],
        "lastModified",
        Some(20),
    );

    let store = CollectionStore::with_options(
        Arc::clone(&env),
        "articles",
        StoreOptions::new().migrate_legacy(true),
    );
    store.open().unwrap();

    assert_eq!(store.list(&ListParams::new()).unwrap().len(), 2);
    assert_eq!(store.get_last_modified().unwrap(), Some(20));
    // The legacy database is gone for good.
    assert!(!env.contains("articles").unwrap());
}

#[test]
fn migration_twice_is_a_no_op() {
    let (env, _) = memory_store_with_env("articles");
    seed_legacy_database(
        &env,
        "articles",
        &[sample_record("a", "synced", 10)],
        "lastModified",
        Some(10),
    );

    let store = CollectionStore::with_options(
        Arc::clone(&env),
        "articles",
        StoreOptions::new().migrate_legacy(true),
    );
    store.open().unwrap();
    store.close();
    store.open().unwrap();

    // Same single record, same timestamp, still no legacy database.
    assert_eq!(store.list(&ListParams::new()).unwrap().len(), 1);
    assert_eq!(store.get_last_modified().unwrap(), Some(10));
    assert!(!env.contains("articles").unwrap());
}

#[test]
fn migration_never_regresses_timestamp() {
    let (env, _) = memory_store_with_env("articles");
    seed_legacy_database(
        &env,
        "articles",
        &[sample_record("a", "synced", 5)],
        "lastModified",
        Some(5),
    );

    // The unified store already saw a newer timestamp.
    let plain = CollectionStore::new(Arc::clone(&env), "articles");
    plain.save_last_modified(100).unwrap();

    let store = CollectionStore::with_options(
        Arc::clone(&env),
        "articles",
        StoreOptions::new().migrate_legacy(true),
    );
    store.open().unwrap();
    assert_eq!(store.get_last_modified().unwrap(), Some(100));
}

#[test]
fn failed_migration_preserves_legacy_database() {
    let (env, _) = memory_store_with_env("articles");
    // A record without an id cannot be imported.
    seed_legacy_database(
        &env,
        "articles",
        &[json!({"title": "no id here"})],
        "lastModified",
        Some(5),
    );

    let store = CollectionStore::with_options(
        Arc::clone(&env),
        "articles",
        StoreOptions::new().migrate_legacy(true),
    );
    let err = store.open().unwrap_err();
    assert!(matches!(err, StoreError::Migration { .. }));

    // Legacy data survives for a retry on a later open.
    assert!(env.contains("articles").unwrap());
}

#[test]
fn migration_with_secondary_timestamp_key() {
    let (env, _) = memory_store_with_env("articles");
    seed_legacy_database(
        &env,
        "articles",
        &[sample_record("a", "synced", 7)],
        "last_modified",
        Some(7),
    );

    let store = CollectionStore::with_options(
        Arc::clone(&env),
        "articles",
        StoreOptions::new().migrate_legacy(true),
    );
    store.open().unwrap();
    assert_eq!(store.get_last_modified().unwrap(), Some(7));
}

#[test]
fn file_backed_store_survives_reopen() {
    let (dir, store) = file_store("articles");
    store
        .import_bulk(vec![sample_record("a", "synced", 1)])
        .unwrap();
    store.save_metadata(json!({"schema": 1})).unwrap();
    drop(store);

    let env = Arc::new(Environment::at_dir(dir.path()).unwrap());
    let store = CollectionStore::new(env, "articles");
    assert!(store.get("a").unwrap().is_some());
    assert_eq!(store.get_metadata().unwrap(), Some(json!({"schema": 1})));
}

#[test]
fn metadata_is_opaque_to_the_store() {
    let store = memory_store("articles");
    let blob = json!({"nested": {"deep": [1, 2, {"three": true}]}});
    store.save_metadata(blob.clone()).unwrap();
    assert_eq!(store.get_metadata().unwrap(), Some(blob));
}

#[test]
fn create_update_delete_roundtrip() {
    let store = memory_store("articles");

    let created = store
        .execute_transaction(&[], |txn| txn.create(object(json!({"title": "draft"}))))
        .unwrap();
    let id = created.get("id").and_then(Value::as_str).unwrap().to_string();

    store
        .execute_transaction(&[], |txn| {
            txn.update(object(json!({"id": id.clone(), "title": "final"})))
        })
        .unwrap();
    assert_eq!(
        store.get(&id).unwrap().unwrap().get("title"),
        Some(&json!("final"))
    );

    store
        .execute_transaction(&[], |txn| txn.delete(&id))
        .unwrap();
    assert!(store.get(&id).unwrap().is_none());
}
