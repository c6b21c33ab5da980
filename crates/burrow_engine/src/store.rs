//! Object stores and secondary indexes.

use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyRange};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within the store.
    pub name: String,
    /// Key path the index key is extracted from.
    pub key_path: Vec<String>,
}

/// A sorted record store with named secondary indexes.
///
/// Records are JSON objects keyed by the key extracted from the store's
/// primary key path. Index entries are derived state and are rebuilt from
/// the records after a snapshot is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStore {
    name: String,
    key_path: Vec<String>,
    #[serde(with = "entries")]
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, IndexDef>,
    #[serde(skip)]
    index_entries: BTreeMap<String, BTreeMap<Key, BTreeSet<Key>>>,
}

impl ObjectStore {
    /// Creates an empty store with the given primary key path.
    #[must_use]
    pub fn new(name: impl Into<String>, key_path: Vec<String>) -> Self {
        Self {
            name: name.into(),
            key_path,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            index_entries: BTreeMap::new(),
        }
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the primary key path.
    #[must_use]
    pub fn key_path(&self) -> &[String] {
        &self.key_path
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Extracts the primary key of a record.
    pub fn key_of(&self, value: &Value) -> EngineResult<Key> {
        Key::extract(value, &self.key_path)
    }

    /// Registers a secondary index and populates it from existing records.
    pub fn create_index(&mut self, def: IndexDef) -> EngineResult<()> {
        if self.indexes.contains_key(&def.name) {
            return Err(EngineError::data(format!(
                "index `{}` already exists on `{}`",
                def.name, self.name
            )));
        }
        let mut postings: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
        for (pk, value) in &self.records {
            if let Ok(ik) = Key::extract(value, &def.key_path) {
                postings.entry(ik).or_default().insert(pk.clone());
            }
        }
        self.index_entries.insert(def.name.clone(), postings);
        self.indexes.insert(def.name.clone(), def);
        Ok(())
    }

    /// Returns the names of the store's indexes.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Rebuilds all index entries from the records.
    ///
    /// Called after a snapshot load; index entries are not persisted.
    pub(crate) fn rebuild_indexes(&mut self) {
        self.index_entries.clear();
        for def in self.indexes.values() {
            let mut postings: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
            for (pk, value) in &self.records {
                if let Ok(ik) = Key::extract(value, &def.key_path) {
                    postings.entry(ik).or_default().insert(pk.clone());
                }
            }
            self.index_entries.insert(def.name.clone(), postings);
        }
    }

    /// Reads a record by primary key.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.records.get(key)
    }

    /// Inserts or replaces a record under the given primary key.
    ///
    /// Records that lack an index's key fields are simply absent from that
    /// index.
    pub fn put(&mut self, key: Key, value: Value) {
        let old = self.records.get(&key).cloned();
        if let Some(old) = old {
            self.unindex(&key, &old);
        }
        self.index(&key, &value);
        self.records.insert(key, value);
    }

    /// Removes a record by primary key, returning it if present.
    pub fn delete(&mut self, key: &Key) -> Option<Value> {
        let removed = self.records.remove(key)?;
        self.unindex(key, &removed);
        Some(removed)
    }

    /// Removes every record whose primary key lies in the range.
    ///
    /// Returns the number of records removed.
    pub fn clear_range(&mut self, range: &KeyRange) -> usize {
        let doomed: Vec<Key> = self
            .records
            .keys()
            .filter(|k| range.contains(k))
            .cloned()
            .collect();
        for key in &doomed {
            self.delete(key);
        }
        doomed.len()
    }

    /// Returns `(primary_key, value)` pairs in ascending key order.
    #[must_use]
    pub fn entries_in(&self, range: &KeyRange) -> Vec<(Key, Value)> {
        self.records
            .iter()
            .filter(|(k, _)| range.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns `(index_key, primary_key, value)` triples in ascending
    /// index-key order.
    pub fn index_entries_in(
        &self,
        index: &str,
        range: &KeyRange,
    ) -> EngineResult<Vec<(Key, Key, Value)>> {
        let postings = self
            .index_entries
            .get(index)
            .ok_or_else(|| EngineError::index_not_found(&self.name, index))?;
        let mut out = Vec::new();
        for (ik, pks) in postings.iter().filter(|(k, _)| range.contains(k)) {
            for pk in pks {
                if let Some(value) = self.records.get(pk) {
                    out.push((ik.clone(), pk.clone(), value.clone()));
                }
            }
        }
        Ok(out)
    }

    fn index(&mut self, pk: &Key, value: &Value) {
        for def in self.indexes.values() {
            if let Ok(ik) = Key::extract(value, &def.key_path) {
                self.index_entries
                    .entry(def.name.clone())
                    .or_default()
                    .entry(ik)
                    .or_default()
                    .insert(pk.clone());
            }
        }
    }

    fn unindex(&mut self, pk: &Key, value: &Value) {
        for def in self.indexes.values() {
            if let Ok(ik) = Key::extract(value, &def.key_path) {
                if let Some(postings) = self.index_entries.get_mut(&def.name) {
                    if let Some(set) = postings.get_mut(&ik) {
                        set.remove(pk);
                        if set.is_empty() {
                            postings.remove(&ik);
                        }
                    }
                }
            }
        }
    }
}

/// Serializes keyed records as an entry list.
///
/// JSON object keys must be strings, so the record map round-trips as
/// `[(key, value)]` pairs instead.
mod entries {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Key, Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(&Key, &Value)> = map.iter().collect();
        serde::Serialize::serialize(&pairs, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Key, Value>, D::Error> {
        let pairs: Vec<(Key, Value)> = serde::Deserialize::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records_store() -> ObjectStore {
        let mut store = ObjectStore::new("records", vec!["_collection".into(), "id".into()]);
        store
            .create_index(IndexDef {
                name: "by_collection".into(),
                key_path: vec!["_collection".into()],
            })
            .unwrap();
        store
            .create_index(IndexDef {
                name: "by_last_modified".into(),
                key_path: vec!["_collection".into(), "last_modified".into()],
            })
            .unwrap();
        store
    }

    fn record(id: &str, last_modified: i64) -> Value {
        json!({"_collection": "books", "id": id, "last_modified": last_modified})
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let mut store = records_store();
        let value = record("b1", 5);
        let key = store.key_of(&value).unwrap();

        store.put(key.clone(), value.clone());
        assert_eq!(store.get(&key), Some(&value));

        let removed = store.delete(&key).unwrap();
        assert_eq!(removed, value);
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn put_replaces_and_reindexes() {
        let mut store = records_store();
        let v1 = record("b1", 5);
        let key = store.key_of(&v1).unwrap();
        store.put(key.clone(), v1);
        store.put(key.clone(), record("b1", 9));

        let entries = store
            .index_entries_in(
                "by_last_modified",
                &KeyRange::only(Key::Seq(vec![Key::Text("books".into()), Key::Int(5)])),
            )
            .unwrap();
        assert!(entries.is_empty());

        let entries = store
            .index_entries_in(
                "by_last_modified",
                &KeyRange::only(Key::Seq(vec![Key::Text("books".into()), Key::Int(9)])),
            )
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn clear_range_only_touches_partition() {
        let mut store = records_store();
        for value in [record("b1", 1), record("b2", 2)] {
            let key = store.key_of(&value).unwrap();
            store.put(key, value);
        }
        let other = json!({"_collection": "cars", "id": "c1", "last_modified": 1});
        let other_key = store.key_of(&other).unwrap();
        store.put(other_key.clone(), other);

        let removed = store.clear_range(&KeyRange::prefix(vec![Key::Text("books".into())]));
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(&other_key).is_some());
    }

    #[test]
    fn record_without_index_field_is_unindexed() {
        let mut store = records_store();
        let value = json!({"_collection": "books", "id": "b1"});
        let key = store.key_of(&value).unwrap();
        store.put(key, value);

        let entries = store
            .index_entries_in(
                "by_last_modified",
                &KeyRange::prefix(vec![Key::Text("books".into())]),
            )
            .unwrap();
        assert!(entries.is_empty());

        let entries = store
            .index_entries_in("by_collection", &KeyRange::only(Key::Text("books".into())))
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn snapshot_roundtrip_rebuilds_indexes() {
        let mut store = records_store();
        let value = record("b1", 5);
        let key = store.key_of(&value).unwrap();
        store.put(key, value);

        let bytes = serde_json::to_vec(&store).unwrap();
        let mut loaded: ObjectStore = serde_json::from_slice(&bytes).unwrap();
        loaded.rebuild_indexes();

        let entries = loaded
            .index_entries_in("by_collection", &KeyRange::only(Key::Text("books".into())))
            .unwrap();
        assert_eq!(entries.len(), 1);
    }
}
